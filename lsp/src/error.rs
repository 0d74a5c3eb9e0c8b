//! Error taxonomy for the session client.
//!
//! Transport and parse faults are absorbed where they happen (logged, never
//! returned). What reaches a caller is one of these.

use gosandbox_types::TranslateError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LspError {
    /// The connection closed (or was reset) before a response arrived.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("{method} timed out")]
    Timeout { method: &'static str },

    /// The server answered with an `error` envelope.
    #[error("{method} failed ({code}): {message}")]
    Server {
        method: &'static str,
        code: i64,
        message: String,
    },

    #[error("malformed {method} result: {reason}")]
    Decode {
        method: &'static str,
        reason: String,
    },

    #[error("cannot translate position: {0}")]
    Translate(#[from] TranslateError),

    #[error("invalid document URI: {0}")]
    Uri(#[from] url::ParseError),

    #[error("session is {state}; expected {expected}")]
    InvalidState {
        state: String,
        expected: &'static str,
    },

    /// Call-site context around any of the above.
    #[error("error getting {what} from language server: {source}")]
    Request {
        what: &'static str,
        #[source]
        source: Box<LspError>,
    },
}

impl LspError {
    /// Wrap with the name of what the caller was asking for.
    #[must_use]
    pub fn getting(self, what: &'static str) -> Self {
        Self::Request {
            what,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping [`LspError::Request`] wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Request { source, .. } => source.root(),
            other => other,
        }
    }
}
