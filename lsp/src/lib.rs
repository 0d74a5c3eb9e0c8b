//! Language-intelligence session client for the Go sandbox.
//!
//! Speaks JSON-RPC 2.0 to a language server over a persistent duplex
//! connection (WebSocket, or `Content-Length` framed TCP), correlates
//! responses to requests, translates between protocol and editor coordinates,
//! and turns pushed diagnostics into editor-space values.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

pub mod codec;
pub mod protocol;
pub mod rpc;
pub mod transport;
pub mod types;

mod diagnostics;
mod error;
mod navigate;
mod session;
mod symbols;

pub use diagnostics::DiagnosticsSnapshot;
pub use error::LspError;
pub use navigate::goto_definition;
pub use protocol::{
    CompletionItem, DefinitionTarget, DocumentSymbol, Hover, Location, LocationLink, MarkupContent,
    TextEdit,
};
pub use rpc::{Correlator, PendingRequest, Response, Routed, RpcError};
pub use session::{Connector, Session};
pub use symbols::SymbolStats;
pub use transport::{Transport, TransportEvent};
pub use types::{LspConfig, SessionEvent, SessionState};
