//! Mapping of pushed diagnostics into editor space.
//!
//! Every push carries the complete set for the document. The previous set is
//! replaced, never merged.

use gosandbox_types::{Diagnostic, DiagnosticSeverity, to_editor_offset};

use crate::protocol::LspDiagnostic;

/// Translate protocol diagnostics against `doc`.
///
/// An entry whose range no longer fits the document (the server answered
/// for an older version) is dropped with a warning.
pub(crate) fn to_editor_diagnostics(items: &[LspDiagnostic], doc: &str) -> Vec<Diagnostic> {
    items
        .iter()
        .filter_map(|item| match convert(item, doc) {
            Ok(diagnostic) => Some(diagnostic),
            Err(e) => {
                tracing::warn!("dropping diagnostic {:?}: {e}", item.message);
                None
            }
        })
        .collect()
}

fn convert(item: &LspDiagnostic, doc: &str) -> Result<Diagnostic, gosandbox_types::TranslateError> {
    let from = to_editor_offset(item.range.start, doc)?;
    let to = to_editor_offset(item.range.end, doc)?;
    Ok(Diagnostic::new(
        from,
        to.max(from),
        item.severity.and_then(DiagnosticSeverity::from_lsp),
        item.message.clone(),
        item.source
            .clone()
            .unwrap_or_else(|| String::from("unknown")),
    ))
}

/// The latest full diagnostics set for the open document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    items: Vec<Diagnostic>,
}

impl DiagnosticsSnapshot {
    #[must_use]
    pub fn new(mut items: Vec<Diagnostic>) -> Self {
        // Errors first, then by position.
        items.sort_by(|a, b| {
            let a_err = a.severity().is_some_and(DiagnosticSeverity::is_error);
            let b_err = b.severity().is_some_and(DiagnosticSeverity::is_error);
            b_err.cmp(&a_err).then_with(|| a.from().cmp(&b.from()))
        });
        Self { items }
    }

    #[must_use]
    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count(DiagnosticSeverity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count(DiagnosticSeverity::Warning)
    }

    /// Compact status like "E:3 W:5", empty when there is nothing to report.
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }

    fn count(&self, severity: DiagnosticSeverity) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity() == Some(severity))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gosandbox_types::{EditorOffset, Position, Range};

    fn lsp_diag(start: (u32, u32), end: (u32, u32), severity: Option<u64>, msg: &str) -> LspDiagnostic {
        LspDiagnostic {
            range: Range::new(Position::new(start.0, start.1), Position::new(end.0, end.1)),
            severity,
            source: Some("compiler".to_string()),
            message: msg.to_string(),
        }
    }

    #[test]
    fn test_start_and_end_are_translated() {
        let doc = "package main\n\nfunc main() {}\n";
        let items = [lsp_diag((2, 5), (2, 9), Some(1), "unused")];
        let out = to_editor_diagnostics(&items, doc);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].from(), EditorOffset::new(19));
        assert_eq!(out[0].to(), EditorOffset::new(23));
        assert_eq!(out[0].severity(), Some(DiagnosticSeverity::Error));
        assert_eq!(out[0].source(), "compiler");
    }

    #[test]
    fn test_severity_table() {
        let doc = "x";
        let items: Vec<_> = (1..=4).map(|s| lsp_diag((0, 0), (0, 1), Some(s), "m")).collect();
        let severities: Vec<_> = to_editor_diagnostics(&items, doc)
            .iter()
            .map(Diagnostic::severity)
            .collect();
        assert_eq!(
            severities,
            vec![
                Some(DiagnosticSeverity::Error),
                Some(DiagnosticSeverity::Warning),
                Some(DiagnosticSeverity::Information),
                Some(DiagnosticSeverity::Hint),
            ]
        );
    }

    #[test]
    fn test_unmapped_severity_passes_through_as_none() {
        let out = to_editor_diagnostics(&[lsp_diag((0, 0), (0, 1), Some(9), "odd")], "x");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity(), None);

        let out = to_editor_diagnostics(&[lsp_diag((0, 0), (0, 1), None, "bare")], "x");
        assert_eq!(out[0].severity(), None);
    }

    #[test]
    fn test_missing_source_defaults_to_unknown() {
        let mut item = lsp_diag((0, 0), (0, 1), Some(2), "m");
        item.source = None;
        assert_eq!(to_editor_diagnostics(&[item], "x")[0].source(), "unknown");
    }

    #[test]
    fn test_out_of_range_entry_is_dropped() {
        let items = [
            lsp_diag((0, 0), (0, 1), Some(1), "kept"),
            lsp_diag((7, 0), (7, 1), Some(1), "stale"),
        ];
        let out = to_editor_diagnostics(&items, "one line");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message(), "kept");
    }

    #[test]
    fn test_snapshot_orders_errors_first_and_counts() {
        let doc = "abc\ndef\n";
        let items = [
            lsp_diag((0, 0), (0, 1), Some(2), "warn"),
            lsp_diag((1, 0), (1, 1), Some(1), "err"),
            lsp_diag((0, 1), (0, 2), Some(4), "hint"),
        ];
        let snapshot = DiagnosticsSnapshot::new(to_editor_diagnostics(&items, doc));
        assert_eq!(snapshot.items()[0].message(), "err");
        assert_eq!(snapshot.error_count(), 1);
        assert_eq!(snapshot.warning_count(), 1);
        assert!(!snapshot.is_empty());
        assert_eq!(snapshot.status_string(), "E:1 W:1");
        assert!(DiagnosticsSnapshot::default().is_empty());
        assert_eq!(DiagnosticsSnapshot::default().status_string(), "");
    }
}
