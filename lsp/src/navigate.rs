//! Go-to-definition, tying the session to navigation history.

use gosandbox_history::{EditorView, NavigationHistory, ViewChange};
use gosandbox_types::{to_editor_offset, to_protocol_position};

use crate::protocol::DefinitionTarget;
use crate::session::Session;

/// Jump to the definition of the symbol under the cursor.
///
/// The position before the jump is recorded so `back` returns to it. A
/// definition in the open document moves the cursor and records the new
/// position too; one elsewhere is handed back for the caller to open.
/// Failures are logged and reported as [`DefinitionTarget::None`].
pub async fn goto_definition<V: EditorView>(
    session: &Session,
    view: &mut V,
    history: &mut NavigationHistory,
    file_path: &str,
) -> DefinitionTarget {
    history.record(Some(&*view), file_path);

    // The view may hold edits not yet synced to the server; translate both
    // ways against the same text.
    let position = match to_protocol_position(view.head(), view.doc()) {
        Ok(position) => position,
        Err(e) => {
            tracing::warn!("cursor outside the current document: {e}");
            return DefinitionTarget::None;
        }
    };
    let locations = match session.definition_at(position).await {
        Ok(locations) => locations,
        Err(e) => {
            tracing::warn!("{e}");
            return DefinitionTarget::None;
        }
    };
    let Some(location) = locations.into_iter().next() else {
        return DefinitionTarget::None;
    };

    if !session.is_own_document(&location.uri) {
        return DefinitionTarget::External(location);
    }

    let offset = match to_editor_offset(location.range.start, view.doc()) {
        Ok(offset) => offset,
        Err(e) => {
            tracing::warn!("definition outside the current document: {e}");
            return DefinitionTarget::None;
        }
    };

    view.focus();
    view.dispatch(ViewChange {
        selection: Some(offset),
        ..ViewChange::default()
    });
    history.record(Some(&*view), file_path);
    DefinitionTarget::Local(offset)
}
