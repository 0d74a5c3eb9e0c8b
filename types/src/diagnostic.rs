use serde::Serialize;

use crate::position::EditorOffset;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    #[serde(rename = "info")]
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from protocol numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    ///
    /// Returns `None` for values outside the protocol-defined range.
    /// Callers (boundary code) decide the fallback policy.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// A diagnostic positioned in editor space.
///
/// Fields are private; external consumers read via accessors. A `None`
/// severity means the server sent a value outside 1..=4.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    from: EditorOffset,
    to: EditorOffset,
    severity: Option<DiagnosticSeverity>,
    message: String,
    /// Producer of the diagnostic (e.g. "compiler").
    source: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        from: EditorOffset,
        to: EditorOffset,
        severity: Option<DiagnosticSeverity>,
        message: String,
        source: String,
    ) -> Self {
        Self {
            from,
            to,
            severity,
            message,
            source,
        }
    }

    #[must_use]
    pub fn from(&self) -> EditorOffset {
        self.from
    }

    #[must_use]
    pub fn to(&self) -> EditorOffset {
        self.to
    }

    #[must_use]
    pub fn severity(&self) -> Option<DiagnosticSeverity> {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Format as `severity: [source] message (from..to)`.
    #[must_use]
    pub fn display(&self) -> String {
        format!(
            "{}: [{}] {} ({}..{})",
            self.severity.map_or("unknown", DiagnosticSeverity::label),
            self.source,
            self.message,
            self.from,
            self.to,
        )
    }
}
