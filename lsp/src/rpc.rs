//! JSON-RPC 2.0 request/response correlation over a [`Transport`].
//!
//! Ids are allocated from 1 and grow strictly. Every outstanding request owns
//! exactly one slot in the pending table; a slot is removed when its response
//! arrives or when the table is rejected wholesale on close, so a request is
//! settled at most once.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::LspError;
use crate::protocol::{Notification, Request};
use crate::transport::Transport;

/// Error object carried by a response envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcError {
    /// Servers may omit the code; it reads as 0 then.
    #[serde(default)]
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A settled response: `result` and `error` exactly as the server sent them.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

/// One inbound message, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Response {
        id: Option<u64>,
        result: Option<Value>,
        error: Option<RpcError>,
    },
    /// A request the server expects us to answer.
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
        error: Option<RpcError>,
    },
    Notification {
        method: String,
        params: Option<Value>,
        error: Option<RpcError>,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawEnvelope = serde_json::from_str(text)?;
        Ok(match (raw.method, raw.id) {
            (Some(method), Some(id)) if !id.is_null() => Self::Request {
                id,
                method,
                params: raw.params,
                error: raw.error,
            },
            (Some(method), _) => Self::Notification {
                method,
                params: raw.params,
                error: raw.error,
            },
            (None, id) => Self::Response {
                id: id.as_ref().and_then(Value::as_u64),
                result: raw.result,
                error: raw.error,
            },
        })
    }

    /// Top-level error object, whatever the message kind.
    #[must_use]
    pub fn error(&self) -> Option<&RpcError> {
        match self {
            Self::Response { error, .. }
            | Self::Request { error, .. }
            | Self::Notification { error, .. } => error.as_ref(),
        }
    }
}

/// What the correlator did with an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// A pending request was settled.
    Resolved { id: u64, error: Option<RpcError> },
    /// Not ours to settle; the session handles it.
    Dispatch(Envelope),
}

impl Routed {
    /// Error object carried by the inbound message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&RpcError> {
        match self {
            Self::Resolved { error, .. } => error.as_ref(),
            Self::Dispatch(envelope) => envelope.error(),
        }
    }
}

/// Awaitable outcome of [`Correlator::request`].
///
/// Resolves with the response, or with [`LspError::ConnectionClosed`] if the
/// pending table is rejected before a response arrives.
pub struct PendingRequest {
    id: u64,
    rx: oneshot::Receiver<Response>,
}

impl PendingRequest {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for PendingRequest {
    type Output = Result<Response, LspError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.map_err(|_| LspError::ConnectionClosed))
    }
}

pub struct Correlator {
    transport: Transport,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Response>>>,
}

impl Correlator {
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Allocate the next id, register it and send the request.
    ///
    /// The request is registered before it is sent, so the response can never
    /// race ahead of its slot. Sending before the connection opens is fine:
    /// the transport buffers it.
    pub fn request(&self, method: &str, params: Value) -> PendingRequest {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id, tx);

        let request = Request::new(id, method, params);
        match serde_json::to_string(&request) {
            Ok(text) => self.transport.send(text),
            Err(e) => {
                tracing::warn!("failed to encode {method} request: {e}");
                self.lock_pending().remove(&id);
            }
        }

        PendingRequest { id, rx }
    }

    pub fn notify(&self, method: &str, params: Value) {
        self.send_message(&Notification::new(method, params), method);
    }

    /// Send a notification only if the connection is open right now.
    pub fn notify_if_open(&self, method: &str, params: Value) -> bool {
        match serde_json::to_string(&Notification::new(method, params)) {
            Ok(text) => self.transport.send_if_open(text),
            Err(e) => {
                tracing::warn!("failed to encode {method} notification: {e}");
                false
            }
        }
    }

    /// Answer a server-initiated request.
    pub fn respond(&self, id: Value, result: Value) {
        let reply = serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result });
        self.send_message(&reply, "response");
    }

    pub fn respond_error(&self, id: Value, code: i64, message: &str) {
        let reply = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message },
        });
        self.send_message(&reply, "error response");
    }

    /// Classify an inbound text and settle its pending request if it has one.
    ///
    /// A response settles its request even when it carries an error object;
    /// the caller decides what the error means. Unparseable input is logged
    /// and dropped.
    pub fn route(&self, text: &str) -> Option<Routed> {
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("dropping unparseable message: {e}");
                return None;
            }
        };

        let (id, result, error) = match envelope {
            Envelope::Response {
                id: Some(id),
                result,
                error,
            } => (id, result, error),
            other => return Some(Routed::Dispatch(other)),
        };

        let slot = self.lock_pending().remove(&id);
        match slot {
            Some(tx) => {
                let _ = tx.send(Response {
                    result,
                    error: error.clone(),
                });
                Some(Routed::Resolved { id, error })
            }
            None => Some(Routed::Dispatch(Envelope::Response {
                id: Some(id),
                result,
                error,
            })),
        }
    }

    /// Settle every outstanding request with [`LspError::ConnectionClosed`].
    pub fn reject_all(&self) -> usize {
        let drained: Vec<_> = self.lock_pending().drain().collect();
        let count = drained.len();
        if count > 0 {
            tracing::debug!("rejecting {count} pending request(s)");
        }
        count
    }

    /// Reject everything outstanding and restart ids from 1.
    pub fn reset(&self) {
        self.reject_all();
        self.next_id.store(0, Ordering::SeqCst);
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn send_message<T: Serialize>(&self, message: &T, what: &str) {
        match serde_json::to_string(message) {
            Ok(text) => self.transport.send(text),
            Err(e) => tracing::warn!("failed to encode {what}: {e}"),
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Response>>> {
        // A poisoned table still holds valid senders.
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
