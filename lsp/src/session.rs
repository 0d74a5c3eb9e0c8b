//! Session client: the protocol-aware layer over the correlator.
//!
//! A [`Session`] owns one connection at a time, the mirrored document and the
//! lifecycle state. Inbound traffic is handled by a dispatch task per
//! connection; the `initialize` handshake runs as its own task so the
//! dispatch loop keeps routing while it waits.
//!
//! ```text
//! Connecting --open--> Initializing --initialize ok--> Ready
//!      \                    \                             \
//!       +--------------------+-----------------------------+--> Closed | Errored
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gosandbox_types::{EditorOffset, Position, to_editor_offset, to_protocol_position};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use crate::diagnostics::{DiagnosticsSnapshot, to_editor_diagnostics};
use crate::error::LspError;
use crate::protocol::{
    self, CompletionItem, CompletionResponse, DefinitionResponse, DocumentSymbol, Hover, Location,
    ServerNotification, methods,
};
use crate::rpc::{Correlator, Envelope, PendingRequest, Routed};
use crate::transport::{Transport, TransportEvent};
use crate::types::{LspConfig, SessionEvent, SessionState};

/// Opens a fresh connection for a session (and again on reconnect).
pub type Connector =
    Arc<dyn Fn() -> (Transport, mpsc::UnboundedReceiver<TransportEvent>) + Send + Sync>;

const METHOD_NOT_FOUND: i64 = -32601;

/// The last full text sent to the server.
struct SyncedDocument {
    text: String,
    version: i32,
}

/// State shared between the session handle and its background tasks.
struct Shared {
    config: LspConfig,
    uri: Url,
    root_uri: Url,
    document: Mutex<SyncedDocument>,
    diagnostics: Mutex<DiagnosticsSnapshot>,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

pub struct Session {
    shared: Arc<Shared>,
    connector: Connector,
    rpc: Arc<Correlator>,
    dispatch: JoinHandle<()>,
}

impl Session {
    /// Connect to `config.url` and open `text` as the session document.
    ///
    /// Returns immediately; the handshake proceeds in the background. Requests
    /// issued before [`SessionState::Ready`] are queued by the transport.
    pub fn connect(
        config: LspConfig,
        text: impl Into<String>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), LspError> {
        let url = config.url.clone();
        Self::start(config, text, move || Transport::connect(&url))
    }

    /// Like [`Session::connect`] with a caller-supplied connection factory.
    pub fn start(
        config: LspConfig,
        text: impl Into<String>,
        connector: impl Fn() -> (Transport, mpsc::UnboundedReceiver<TransportEvent>)
        + Send
        + Sync
        + 'static,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), LspError> {
        let uri = config.document_uri()?;
        let root_uri = config.root_uri()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Connecting);

        let shared = Arc::new(Shared {
            config,
            uri,
            root_uri,
            document: Mutex::new(SyncedDocument {
                text: text.into(),
                version: 1,
            }),
            diagnostics: Mutex::new(DiagnosticsSnapshot::default()),
            state,
            events: events_tx,
        });
        let connector: Connector = Arc::new(connector);
        let (rpc, dispatch) = open_connection(&shared, &connector);

        Ok((
            Self {
                shared,
                connector,
                rpc,
                dispatch,
            },
            events_rx,
        ))
    }

    #[must_use]
    pub fn config(&self) -> &LspConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Wait for the handshake to finish.
    ///
    /// Fails with [`LspError::InvalidState`] if the session closes or errors
    /// first.
    pub async fn wait_ready(&self) -> Result<(), LspError> {
        let mut rx = self.shared.state.subscribe();
        let state = rx
            .wait_for(|s| *s == SessionState::Ready || s.is_terminal())
            .await
            .map_err(|_| LspError::ConnectionClosed)?
            .clone();
        match state {
            SessionState::Ready => Ok(()),
            other => Err(LspError::InvalidState {
                state: other.to_string(),
                expected: "ready",
            }),
        }
    }

    #[must_use]
    pub fn document_uri(&self) -> &Url {
        &self.shared.uri
    }

    /// The last full text sent to the server.
    #[must_use]
    pub fn document_text(&self) -> String {
        self.shared.document().text.clone()
    }

    #[must_use]
    pub fn document_version(&self) -> i32 {
        self.shared.document().version
    }

    /// The latest diagnostics pushed for the open document.
    #[must_use]
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.shared.latest_diagnostics().clone()
    }

    /// Whether `uri` names the session's own document.
    #[must_use]
    pub fn is_own_document(&self, uri: &str) -> bool {
        self.shared.is_own_document(uri)
    }

    pub fn position_of(&self, offset: EditorOffset) -> Result<Position, LspError> {
        Ok(to_protocol_position(offset, &self.shared.document().text)?)
    }

    pub fn offset_of(&self, position: Position) -> Result<EditorOffset, LspError> {
        Ok(to_editor_offset(position, &self.shared.document().text)?)
    }

    /// Replace the document with `text` at the caller's `version`.
    ///
    /// The caller owns versioning and must supply strictly increasing values.
    pub fn did_change(&self, version: i32, text: impl Into<String>) {
        let text = text.into();
        let params = protocol::did_change_params(&self.shared.uri, version, &text);
        {
            let mut doc = self.shared.document();
            doc.text = text;
            doc.version = version;
        }
        self.rpc.notify(methods::DID_CHANGE, params);
    }

    /// Send `keepAlive` if the connection is open right now. Never queued.
    pub fn keep_alive(&self) -> bool {
        send_keep_alive(&self.rpc)
    }

    pub async fn hover(&self, offset: EditorOffset) -> Result<Option<Hover>, LspError> {
        async {
            let params = protocol::text_document_position_params(&self.shared.uri, self.position_of(offset)?);
            self.call::<Hover>(methods::HOVER, params).await
        }
        .await
        .map_err(|e| e.getting("hover info"))
    }

    pub async fn definition(&self, offset: EditorOffset) -> Result<Vec<Location>, LspError> {
        let position = self.position_of(offset).map_err(|e| e.getting("definition"))?;
        self.definition_at(position).await
    }

    /// Like [`Session::definition`] for a position the caller already
    /// translated against its own copy of the document.
    pub async fn definition_at(&self, position: Position) -> Result<Vec<Location>, LspError> {
        self.locations(methods::DEFINITION, position, "definition").await
    }

    pub async fn implementation(&self, offset: EditorOffset) -> Result<Vec<Location>, LspError> {
        let position = self.position_of(offset).map_err(|e| e.getting("implementations"))?;
        self.locations(methods::IMPLEMENTATION, position, "implementations")
            .await
    }

    /// References to the symbol at `offset`, excluding its declaration.
    pub async fn references(&self, offset: EditorOffset) -> Result<Vec<Location>, LspError> {
        async {
            let params = protocol::reference_params(&self.shared.uri, self.position_of(offset)?);
            let locations: Option<Vec<Location>> = self.call(methods::REFERENCES, params).await?;
            Ok::<_, LspError>(locations.unwrap_or_default())
        }
        .await
        .map_err(|e| e.getting("references"))
    }

    pub async fn completion(&self, offset: EditorOffset) -> Result<Vec<CompletionItem>, LspError> {
        async {
            let params = protocol::text_document_position_params(&self.shared.uri, self.position_of(offset)?);
            let response: Option<CompletionResponse> = self.call(methods::COMPLETION, params).await?;
            Ok::<_, LspError>(response.map(CompletionResponse::into_items).unwrap_or_default())
        }
        .await
        .map_err(|e| e.getting("completions"))
    }

    pub async fn document_symbols(&self) -> Result<Vec<DocumentSymbol>, LspError> {
        let params = protocol::document_symbol_params(&self.shared.uri);
        let symbols: Option<Vec<DocumentSymbol>> = self
            .call(methods::DOCUMENT_SYMBOL, params)
            .await
            .map_err(|e| e.getting("document symbols"))?;
        Ok(symbols.unwrap_or_default())
    }

    /// Close the connection. Every outstanding request fails with
    /// [`LspError::ConnectionClosed`].
    pub fn close(&self) {
        self.rpc.transport().close();
        self.rpc.reject_all();
    }

    /// Open a fresh connection and redo the handshake with the last synced
    /// text. Only allowed once the session is closed or errored.
    pub fn reconnect(&mut self) -> Result<(), LspError> {
        let state = self.state();
        if !state.is_terminal() {
            return Err(LspError::InvalidState {
                state: state.to_string(),
                expected: "closed or errored",
            });
        }

        tracing::info!("reconnecting to {}", self.shared.config.url);
        self.rpc.reset();
        self.dispatch.abort();
        self.shared.set_state(SessionState::Connecting);
        // A fresh server starts the document over at version 1.
        self.shared.document().version = 1;

        let (rpc, dispatch) = open_connection(&self.shared, &self.connector);
        self.rpc = rpc;
        self.dispatch = dispatch;
        Ok(())
    }

    async fn locations(
        &self,
        method: &'static str,
        position: Position,
        what: &'static str,
    ) -> Result<Vec<Location>, LspError> {
        let params = protocol::text_document_position_params(&self.shared.uri, position);
        let response: Option<DefinitionResponse> = self
            .call(method, params)
            .await
            .map_err(|e| e.getting(what))?;
        Ok(response.map(DefinitionResponse::into_locations).unwrap_or_default())
    }

    /// Issue a request and decode its `result`.
    ///
    /// `Ok(None)` means "no data": a null result, an error envelope (already
    /// reported on the event channel) or no answer within the request timeout.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, LspError> {
        let pending = self.rpc.request(method, params);
        let id = pending.id();
        let response = match tokio::time::timeout(self.shared.config.request_timeout(), pending).await {
            Ok(settled) => settled?,
            Err(_) => {
                tracing::debug!("{method} (id {id}) got no answer in time; treating as empty");
                return Ok(None);
            }
        };

        if let Some(error) = response.error {
            tracing::debug!("{method} (id {id}) answered with error: {}", error.message);
            return Ok(None);
        }
        protocol::decode_result(response.result).map_err(|e| LspError::Decode {
            method,
            reason: e.to_string(),
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.rpc.transport().close();
    }
}

impl Shared {
    fn document(&self) -> MutexGuard<'_, SyncedDocument> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn latest_diagnostics(&self) -> MutexGuard<'_, DiagnosticsSnapshot> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // The host may have stopped listening; that is not our failure.
        let _ = self.events.send(event);
    }

    /// Move to `next` if the lifecycle allows it.
    ///
    /// A terminal state is left only for `Connecting` (reconnect), and
    /// `Ready` is only reachable from `Initializing`.
    fn set_state(&self, next: SessionState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            let allowed = match &next {
                SessionState::Connecting => true,
                SessionState::Ready => *current == SessionState::Initializing,
                _ => !current.is_terminal(),
            };
            if !allowed || *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if changed {
            tracing::info!("session {}", next);
            self.emit(SessionEvent::StateChanged(next));
        }
        changed
    }

    fn is_own_document(&self, uri: &str) -> bool {
        match Url::parse(uri) {
            Ok(parsed) => parsed == self.uri,
            Err(_) => uri == self.uri.as_str(),
        }
    }

    fn handle_message(&self, rpc: &Correlator, text: &str) {
        let Some(routed) = rpc.route(text) else {
            return;
        };

        if let Some(error) = routed.error() {
            if self.config.is_ignored_error(&error.message) {
                tracing::trace!("suppressed server error: {}", error.message);
            } else {
                tracing::debug!("server error ({}): {}", error.code, error.message);
                self.emit(SessionEvent::Error(error.message.clone()));
            }
        }

        match routed {
            Routed::Resolved { id, .. } => tracing::trace!("resolved request {id}"),
            Routed::Dispatch(Envelope::Response { id, .. }) => {
                tracing::debug!("response for unknown request {id:?}; ignoring");
            }
            Routed::Dispatch(Envelope::Request {
                id, method, params, ..
            }) => {
                self.answer_server_request(rpc, id, &method, params.as_ref());
            }
            Routed::Dispatch(Envelope::Notification { method, params, .. }) => {
                self.handle_notification(ServerNotification::decode(method, params));
            }
        }
    }

    fn handle_notification(&self, notification: ServerNotification) {
        match notification {
            ServerNotification::PublishDiagnostics(params) => {
                if !self.is_own_document(&params.uri) {
                    tracing::debug!("ignoring diagnostics for {}", params.uri);
                    return;
                }
                let items = {
                    let doc = self.document();
                    if let Some(version) = params.version
                        && version < doc.version
                    {
                        tracing::debug!("ignoring diagnostics for stale version {version} (at {})", doc.version);
                        return;
                    }
                    to_editor_diagnostics(&params.diagnostics, &doc.text)
                };
                tracing::debug!("{} diagnostic(s) for {}", items.len(), params.uri);
                *self.latest_diagnostics() = DiagnosticsSnapshot::new(items.clone());
                self.emit(SessionEvent::Diagnostics(items));
            }
            ServerNotification::Unhandled { method, params } => {
                tracing::trace!("unhandled notification: {method}");
                self.emit(SessionEvent::Notification { method, params });
            }
        }
    }

    /// Servers block on some requests until answered; reply with neutral
    /// defaults where one exists.
    fn answer_server_request(&self, rpc: &Correlator, id: Value, method: &str, params: Option<&Value>) {
        tracing::debug!("server request: {method}");
        match method {
            "workspace/configuration" => {
                let count = params
                    .and_then(|p| p.get("items"))
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                rpc.respond(id, Value::Array(vec![Value::Null; count]));
            }
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create"
            | "window/showMessageRequest" => rpc.respond(id, Value::Null),
            _ => rpc.respond_error(id, METHOD_NOT_FOUND, &format!("Method not found: {method}")),
        }
    }

    /// Await the `initialize` reply, then send `initialized` and `didOpen`
    /// with the mirrored text and version.
    async fn initialize(&self, rpc: &Correlator, pending: PendingRequest) -> Result<(), LspError> {
        let response = tokio::time::timeout(self.config.init_timeout(), pending)
            .await
            .map_err(|_| LspError::Timeout {
                method: methods::INITIALIZE,
            })??;

        if let Some(error) = response.error {
            return Err(LspError::Server {
                method: methods::INITIALIZE,
                code: error.code,
                message: error.message,
            });
        }

        rpc.notify(methods::INITIALIZED, serde_json::json!({}));

        let params = {
            let doc = self.document();
            protocol::did_open_params(&self.uri, &self.config.language_id, doc.version, &doc.text)
        };
        rpc.notify(methods::DID_OPEN, params);
        Ok(())
    }
}

fn send_keep_alive(rpc: &Correlator) -> bool {
    rpc.notify_if_open(methods::KEEP_ALIVE, serde_json::json!({}))
}

/// Dial through `connector` and spawn the dispatch task for the new link.
///
/// `initialize` is queued before anything else can be, so it is always first
/// on the wire; the handshake task only waits for its reply.
fn open_connection(shared: &Arc<Shared>, connector: &Connector) -> (Arc<Correlator>, JoinHandle<()>) {
    let (transport, events) = connector();
    let rpc = Arc::new(Correlator::new(transport));
    let init = rpc.request(
        methods::INITIALIZE,
        protocol::initialize_params(&shared.root_uri, &shared.config.workspace),
    );
    let dispatch = tokio::spawn(run_dispatch(Arc::clone(shared), Arc::clone(&rpc), events, init));
    (rpc, dispatch)
}

async fn run_dispatch(
    shared: Arc<Shared>,
    rpc: Arc<Correlator>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    init: PendingRequest,
) {
    let mut init = Some(init);
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Open => {
                shared.set_state(SessionState::Initializing);
                if let Some(pending) = init.take() {
                    tokio::spawn(handshake(Arc::clone(&shared), Arc::clone(&rpc), pending));
                }
            }
            TransportEvent::Message(text) => shared.handle_message(&rpc, &text),
            TransportEvent::Error(reason) => {
                rpc.reject_all();
                shared.emit(SessionEvent::Error(reason.clone()));
                shared.set_state(SessionState::Errored(reason));
            }
            TransportEvent::Closed => {
                rpc.reject_all();
                shared.set_state(SessionState::Closed);
                break;
            }
        }
    }
}

async fn handshake(shared: Arc<Shared>, rpc: Arc<Correlator>, init: PendingRequest) {
    match shared.initialize(&rpc, init).await {
        Ok(()) => {
            if shared.set_state(SessionState::Ready)
                && let Some(period) = shared.config.keep_alive_interval()
            {
                tokio::spawn(keep_alive_loop(rpc, period));
            }
        }
        Err(e) => {
            tracing::warn!("language server handshake failed: {e}");
            shared.set_state(SessionState::Errored(e.to_string()));
        }
    }
}

/// Ping every `period` until the connection is gone.
async fn keep_alive_loop(rpc: Arc<Correlator>, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticker.tick().await;
        if !send_keep_alive(&rpc) {
            tracing::debug!("keep-alive stopped: connection closed");
            break;
        }
    }
}
