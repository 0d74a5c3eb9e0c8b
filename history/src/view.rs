//! The editor capability surface consumed by navigation.
//!
//! The text-editing widget is opaque here: navigation only needs to read the
//! current document, cursor head and scroll offset, and to dispatch one atomic
//! change combining a document replacement, a selection and a scroll offset.

use gosandbox_types::EditorOffset;

/// One atomic change to dispatch to the editor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewChange {
    /// Replace the whole document with this text.
    pub replace_doc: Option<String>,
    /// Move the cursor (collapsed selection) here.
    pub selection: Option<EditorOffset>,
    /// Restore the vertical scroll offset, in pixels.
    pub scroll: Option<u32>,
}

/// What navigation needs from a mounted editor view.
pub trait EditorView {
    /// Current document text.
    fn doc(&self) -> &str;

    /// Cursor head of the main selection.
    fn head(&self) -> EditorOffset;

    /// Vertical scroll offset in pixels.
    fn scroll(&self) -> u32;

    /// Apply a change atomically.
    fn dispatch(&mut self, change: ViewChange);

    /// Give the view input focus before navigating.
    fn focus(&mut self) {}
}

/// In-memory [`EditorView`] for headless hosts and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryView {
    doc: String,
    head: EditorOffset,
    scroll: u32,
    focused: bool,
    /// Number of whole-document replacements dispatched so far.
    replacements: usize,
}

impl MemoryView {
    #[must_use]
    pub fn new(doc: impl Into<String>) -> Self {
        Self {
            doc: doc.into(),
            ..Self::default()
        }
    }

    /// Edit the document the way typing would: no history side effects.
    pub fn set_doc(&mut self, doc: impl Into<String>) {
        self.doc = doc.into();
        self.head = self.clamp(self.head);
    }

    pub fn set_head(&mut self, head: EditorOffset) {
        self.head = self.clamp(head);
    }

    pub fn set_scroll(&mut self, scroll: u32) {
        self.scroll = scroll;
    }

    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    #[must_use]
    pub fn replacements(&self) -> usize {
        self.replacements
    }

    fn clamp(&self, offset: EditorOffset) -> EditorOffset {
        EditorOffset::new(offset.value().min(self.doc.chars().count()))
    }
}

impl EditorView for MemoryView {
    fn doc(&self) -> &str {
        &self.doc
    }

    fn head(&self) -> EditorOffset {
        self.head
    }

    fn scroll(&self) -> u32 {
        self.scroll
    }

    fn dispatch(&mut self, change: ViewChange) {
        if let Some(doc) = change.replace_doc {
            self.doc = doc;
            self.replacements += 1;
            self.head = self.clamp(self.head);
        }
        if let Some(selection) = change.selection {
            self.head = self.clamp(selection);
        }
        if let Some(scroll) = change.scroll {
            self.scroll = scroll;
        }
    }

    fn focus(&mut self) {
        self.focused = true;
    }
}
