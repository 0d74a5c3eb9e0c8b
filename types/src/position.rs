//! Protocol and editor coordinate spaces, and the translator between them.
//!
//! The language server addresses text as `(line, character)`, where `line` is
//! 0-indexed and `character` counts UTF-16 code units within that line. The
//! editor addresses text as a single character offset from the start of the
//! document.
//!
//! Every conversion is re-derived from the document passed in. Nothing is
//! cached: an edit between two calls invalidates any previously computed
//! mapping.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Linear character offset from the start of a document (editor space).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EditorOffset(usize);

impl EditorOffset {
    #[must_use]
    pub const fn new(offset: usize) -> Self {
        Self(offset)
    }

    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }
}

impl From<usize> for EditorOffset {
    fn from(offset: usize) -> Self {
        Self(offset)
    }
}

impl fmt::Display for EditorOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `(line, character)` pair in protocol space.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    /// 0-indexed line.
    pub line: u32,
    /// 0-indexed UTF-16 code unit offset within the line.
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("offset {offset} is past the end of the document ({len} chars)")]
    OffsetOutOfBounds { offset: usize, len: usize },
    #[error("line {line} is past the end of the document ({lines} lines)")]
    LineOutOfBounds { line: u32, lines: u32 },
    #[error("row {row}, column {col} is outside the document")]
    RowColOutOfBounds { row: u32, col: u32 },
}

/// Convert an editor offset into a protocol position against `doc`.
pub fn to_protocol_position(offset: EditorOffset, doc: &str) -> Result<Position, TranslateError> {
    let (line, prefix) = locate(doc, offset.value())?;
    let character = prefix.encode_utf16().count() as u32;
    Ok(Position::new(line, character))
}

/// Convert a protocol position into an editor offset against `doc`.
///
/// A `character` past the end of its line resolves to the end of that line.
/// A `character` that lands inside a surrogate pair resolves to the start of
/// that character.
pub fn to_editor_offset(position: Position, doc: &str) -> Result<EditorOffset, TranslateError> {
    let (start, text) = line_at(doc, position.line).ok_or_else(|| {
        TranslateError::LineOutOfBounds {
            line: position.line,
            lines: line_count(doc),
        }
    })?;

    let mut units = 0u32;
    let mut chars = 0usize;
    for ch in text.chars() {
        let width = ch.len_utf16() as u32;
        if units + width > position.character {
            break;
        }
        units += width;
        chars += 1;
    }

    Ok(EditorOffset::new(start + chars))
}

/// 1-based `(row, col)` of `offset` in the editor's own line table.
pub fn row_col(offset: EditorOffset, doc: &str) -> Result<(u32, u32), TranslateError> {
    let (line, prefix) = locate(doc, offset.value())?;
    Ok((line + 1, prefix.chars().count() as u32 + 1))
}

/// Editor offset of the 1-based `(row, col)`.
pub fn offset_at(row: u32, col: u32, doc: &str) -> Result<EditorOffset, TranslateError> {
    let out_of_bounds = TranslateError::RowColOutOfBounds { row, col };
    if row == 0 || col == 0 {
        return Err(out_of_bounds);
    }
    let (start, text) = line_at(doc, row - 1).ok_or(out_of_bounds.clone())?;
    let within = (col - 1) as usize;
    if within > text.chars().count() {
        return Err(out_of_bounds);
    }
    Ok(EditorOffset::new(start + within))
}

/// Find the 0-indexed line containing char offset `target`, plus the slice of
/// that line preceding it.
fn locate(doc: &str, target: usize) -> Result<(u32, &str), TranslateError> {
    let mut line = 0u32;
    let mut line_start = 0usize;
    let mut end = doc.len();
    let mut seen = 0usize;

    for (byte, ch) in doc.char_indices() {
        if seen == target {
            end = byte;
            break;
        }
        seen += 1;
        if ch == '\n' {
            line += 1;
            line_start = byte + 1;
        }
    }

    if seen < target {
        return Err(TranslateError::OffsetOutOfBounds {
            offset: target,
            len: seen,
        });
    }

    Ok((line, &doc[line_start..end]))
}

/// Char offset of the start of 0-indexed `line` and its text (without the
/// line break), or `None` past the last line.
fn line_at(doc: &str, line: u32) -> Option<(usize, &str)> {
    let mut start_byte = 0usize;
    let mut start_char = 0usize;
    for _ in 0..line {
        let rest = &doc[start_byte..];
        let newline = rest.find('\n')?;
        start_char += rest[..newline].chars().count() + 1;
        start_byte += newline + 1;
    }
    let rest = &doc[start_byte..];
    let text = rest.find('\n').map_or(rest, |newline| &rest[..newline]);
    Some((start_char, text))
}

fn line_count(doc: &str) -> u32 {
    doc.split('\n').count() as u32
}
