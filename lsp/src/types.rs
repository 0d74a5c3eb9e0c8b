//! Public types consumed by hosts of the session client.
//!
//! A host constructs [`LspConfig`], receives [`SessionEvent`]s, and watches
//! [`SessionState`].

use std::fmt;
use std::time::Duration;

use gosandbox_types::Diagnostic;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::protocol;

/// Errors the session does not forward: they only mean "nothing here".
pub const DEFAULT_IGNORED_ERRORS: [&str; 2] = ["no identifier found", "no package metadata for file"];

/// Configuration for one language-intelligence session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LspConfig {
    /// `ws://`/`wss://` endpoint, or `tcp://host:port` for a framed stream.
    pub url: String,
    /// Workspace name in the document URI.
    pub workspace: String,
    /// Go version suffix in the document URI (`go<version>`).
    pub go_version: String,
    pub main_file: String,
    pub language_id: String,
    pub request_timeout_ms: u64,
    pub init_timeout_ms: u64,
    /// Keep-alive period; 0 disables.
    pub keep_alive_secs: u64,
    /// Error messages to suppress. An entry matches a message that equals or
    /// contains it.
    pub ignored_errors: Vec<String>,
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            workspace: "workspace".to_string(),
            go_version: "1".to_string(),
            main_file: "main.go".to_string(),
            language_id: "go".to_string(),
            request_timeout_ms: 3000,
            init_timeout_ms: 30_000,
            keep_alive_secs: 30,
            ignored_errors: DEFAULT_IGNORED_ERRORS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl LspConfig {
    pub fn document_uri(&self) -> Result<Url, url::ParseError> {
        protocol::document_uri(&self.workspace, &self.go_version, &self.main_file)
    }

    pub fn root_uri(&self) -> Result<Url, url::ParseError> {
        protocol::root_uri(&self.workspace)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    #[must_use]
    pub fn keep_alive_interval(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }

    #[must_use]
    pub fn is_ignored_error(&self, message: &str) -> bool {
        self.ignored_errors
            .iter()
            .any(|ignored| message == ignored || message.contains(ignored.as_str()))
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Initializing,
    Ready,
    Closed,
    Errored(String),
}

impl SessionState {
    /// Whether the session has stopped and may be reconnected.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Errored(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Initializing => f.write_str("initializing"),
            Self::Ready => f.write_str("ready"),
            Self::Closed => f.write_str("closed"),
            Self::Errored(reason) => write!(f, "errored: {reason}"),
        }
    }
}

/// Something the host should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// The complete diagnostics set for the open document.
    Diagnostics(Vec<Diagnostic>),
    /// Message text of an `error` object the server sent.
    Error(String),
    /// A notification with no dedicated handling.
    Notification { method: String, params: Option<Value> },
}
