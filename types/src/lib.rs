//! Core domain types for the Go sandbox.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies:
//! protocol and editor coordinates, the translator between them, diagnostics,
//! and the symbol/completion kind tables.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod diagnostic;
mod kinds;
mod position;

pub use diagnostic::{Diagnostic, DiagnosticSeverity};
pub use kinds::{CompletionKind, SymbolKind};
pub use position::{
    EditorOffset, Position, Range, TranslateError, offset_at, row_col, to_editor_offset,
    to_protocol_position,
};
