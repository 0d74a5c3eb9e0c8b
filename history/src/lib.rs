//! Navigation history for cursor and document positions.
//!
//! Records `(document, cursor, scroll, file)` snapshots independent of the
//! editor's own undo stack and supports linear back/forward traversal.
//!
//! # Navigation Behavior
//!
//! - Recording after a rewind discards every "forward" entry before appending.
//! - Back/forward move the pointer without touching the stack.
//! - Restoring an entry swaps the document only when it differs from the
//!   live one, so a pure cursor/scroll move never forces a full re-render.
//!
//! Every operation takes the view as `Option`: `None` means the editor is not
//! mounted and the call is a no-op.

mod view;

pub use view::{EditorView, MemoryView, ViewChange};

use gosandbox_types::EditorOffset;
use serde::Serialize;

/// A recorded navigation point. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pos: EditorOffset,
    /// Vertical scroll offset in pixels.
    scroll: u32,
    doc: String,
    file_path: String,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(
        pos: EditorOffset,
        scroll: u32,
        doc: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            pos,
            scroll,
            doc: doc.into(),
            file_path: file_path.into(),
        }
    }

    /// Snapshot the current state of `view`.
    #[must_use]
    pub fn capture(view: &impl EditorView, file_path: impl Into<String>) -> Self {
        Self::new(view.head(), view.scroll(), view.doc(), file_path)
    }

    #[must_use]
    pub fn pos(&self) -> EditorOffset {
        self.pos
    }

    #[must_use]
    pub fn scroll(&self) -> u32 {
        self.scroll
    }

    #[must_use]
    pub fn doc(&self) -> &str {
        &self.doc
    }

    #[must_use]
    pub fn file_path(&self) -> &str {
        &self.file_path
    }
}

/// The stack plus a pointer into it.
///
/// Invariant: `index` is `None` iff `stack` is empty, otherwise it is a valid
/// index into `stack`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryState {
    stack: Vec<HistoryEntry>,
    index: Option<usize>,
}

impl HistoryState {
    /// Truncate to `[0, index]`, append, point at the new entry.
    fn push(&mut self, entry: HistoryEntry) {
        let keep = self.index.map_or(0, |index| index + 1);
        self.stack.truncate(keep);
        self.stack.push(entry);
        self.index = Some(self.stack.len() - 1);
    }

    /// Drop the oldest entries beyond `max`, keeping the pointer on the same entry.
    fn enforce_capacity(&mut self, max: usize) {
        if max == 0 || self.stack.len() <= max {
            return;
        }
        let excess = self.stack.len() - max;
        self.stack.drain(..excess);
        self.index = self.index.map(|index| index.saturating_sub(excess));
    }

    fn clear(&mut self) {
        self.stack.clear();
        self.index = None;
    }

    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.stack
    }

    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    #[must_use]
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.index.and_then(|index| self.stack.get(index))
    }

    #[must_use]
    pub fn can_go_back(&self) -> bool {
        self.index.is_some_and(|index| index > 0)
    }

    #[must_use]
    pub fn can_go_forward(&self) -> bool {
        self.index.is_some_and(|index| index + 1 < self.stack.len())
    }
}

/// Back/forward navigation over recorded positions, owned by one editing session.
#[derive(Debug, Clone, Default)]
pub struct NavigationHistory {
    state: HistoryState,
    /// 0 means unbounded.
    max_entries: usize,
}

impl NavigationHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_entries` entries, dropping the oldest first. 0 means unbounded.
    #[must_use]
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            state: HistoryState::default(),
            max_entries,
        }
    }

    #[must_use]
    pub fn state(&self) -> &HistoryState {
        &self.state
    }

    /// Record the view's current cursor, scroll and document.
    pub fn record(&mut self, view: Option<&impl EditorView>, file_path: &str) -> bool {
        let Some(view) = view else {
            return false;
        };
        self.push(HistoryEntry::capture(view, file_path));
        true
    }

    /// Record an explicit entry, bypassing the mounted-view check.
    #[cfg(test)]
    pub(crate) fn record_at(
        &mut self,
        pos: EditorOffset,
        scroll: u32,
        doc: impl Into<String>,
        file_path: impl Into<String>,
    ) {
        self.push(HistoryEntry::new(pos, scroll, doc, file_path));
    }

    /// Jump to `index`, restoring its document, cursor and scroll.
    pub fn goto(&mut self, view: Option<&mut impl EditorView>, index: usize) -> bool {
        let Some(view) = view else {
            return false;
        };
        view.focus();
        let Some(entry) = self.state.stack.get(index) else {
            return false;
        };
        restore(view, entry);
        self.state.index = Some(index);
        true
    }

    pub fn back(&mut self, view: Option<&mut impl EditorView>) -> bool {
        let Some(view) = view else {
            return false;
        };
        view.focus();
        if !self.state.can_go_back() {
            tracing::trace!("history back at boundary");
            return false;
        }
        let Some(target) = self.state.index.map(|index| index - 1) else {
            return false;
        };
        restore(view, &self.state.stack[target]);
        self.state.index = Some(target);
        true
    }

    pub fn forward(&mut self, view: Option<&mut impl EditorView>) -> bool {
        let Some(view) = view else {
            return false;
        };
        view.focus();
        if !self.state.can_go_forward() {
            tracing::trace!("history forward at boundary");
            return false;
        }
        let Some(target) = self.state.index.map(|index| index + 1) else {
            return false;
        };
        restore(view, &self.state.stack[target]);
        self.state.index = Some(target);
        true
    }

    /// Clear history and record a fresh baseline at position 0 with the view's
    /// current scroll. Used when switching files or sandboxes.
    pub fn reset(&mut self, view: Option<&impl EditorView>, doc: &str, file_path: &str) -> bool {
        let Some(view) = view else {
            return false;
        };
        self.state.clear();
        self.push(HistoryEntry::new(
            EditorOffset::new(0),
            view.scroll(),
            doc,
            file_path,
        ));
        true
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.state.push(entry);
        self.state.enforce_capacity(self.max_entries);
    }
}

fn restore(view: &mut impl EditorView, entry: &HistoryEntry) {
    let replace_doc = (view.doc() != entry.doc()).then(|| entry.doc().to_string());
    view.dispatch(ViewChange {
        replace_doc,
        selection: Some(entry.pos()),
        scroll: Some(entry.scroll()),
    });
}
