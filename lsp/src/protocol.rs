//! Wire payloads: outgoing envelopes, parameter builders and typed results.

use gosandbox_types::{CompletionKind, EditorOffset, Position, Range, SymbolKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "initialized";
    pub const DID_OPEN: &str = "textDocument/didOpen";
    pub const DID_CHANGE: &str = "textDocument/didChange";
    pub const HOVER: &str = "textDocument/hover";
    pub const DEFINITION: &str = "textDocument/definition";
    pub const COMPLETION: &str = "textDocument/completion";
    pub const REFERENCES: &str = "textDocument/references";
    pub const IMPLEMENTATION: &str = "textDocument/implementation";
    pub const DOCUMENT_SYMBOL: &str = "textDocument/documentSymbol";
    pub const PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";
    pub const KEEP_ALIVE: &str = "keepAlive";
}

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> Notification<'a> {
    pub fn new(method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// `file:///<workspace>/go<go_version>/<main_file>`.
pub fn document_uri(workspace: &str, go_version: &str, main_file: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("file:///{workspace}/go{go_version}/{main_file}"))
}

/// `file:///<workspace>`.
pub fn root_uri(workspace: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("file:///{workspace}"))
}

pub(crate) fn initialize_params(root_uri: &Url, workspace: &str) -> Value {
    serde_json::json!({
        "processId": Value::Null,
        "rootUri": root_uri.as_str(),
        "capabilities": {
            "textDocument": {
                "synchronization": {
                    "dynamicRegistration": false,
                    "willSave": false,
                    "willSaveWaitUntil": false,
                    "didSave": false
                },
                "hover": {
                    "contentFormat": ["markdown", "plaintext"]
                },
                "completion": {
                    "completionItem": {
                        "snippetSupport": true,
                        "documentationFormat": ["markdown", "plaintext"]
                    }
                },
                "definition": { "linkSupport": true },
                "documentSymbol": { "hierarchicalDocumentSymbolSupport": true },
                "publishDiagnostics": {
                    "relatedInformation": false
                }
            },
            "workspace": {
                "configuration": true,
                "workspaceFolders": true
            }
        },
        "workspaceFolders": [{
            "uri": root_uri.as_str(),
            "name": workspace
        }]
    })
}

pub(crate) fn did_open_params(uri: &Url, language_id: &str, version: i32, text: &str) -> Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri.as_str(),
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

pub(crate) fn did_change_params(uri: &Url, version: i32, text: &str) -> Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri.as_str(),
            "version": version
        },
        "contentChanges": [{
            "text": text
        }]
    })
}

pub(crate) fn text_document_position_params(uri: &Url, position: Position) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri.as_str() },
        "position": position
    })
}

pub(crate) fn reference_params(uri: &Url, position: Position) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri.as_str() },
        "position": position,
        "context": { "includeDeclaration": false }
    })
}

pub(crate) fn document_symbol_params(uri: &Url) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri.as_str() }
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationLink {
    #[serde(default)]
    pub origin_selection_range: Option<Range>,
    pub target_uri: String,
    pub target_range: Range,
    pub target_selection_range: Range,
}

impl From<LocationLink> for Location {
    fn from(link: LocationLink) -> Self {
        Self {
            uri: link.target_uri,
            range: link.target_selection_range,
        }
    }
}

/// Every shape a definition-like request may answer with.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum DefinitionResponse {
    One(Location),
    Many(Vec<Location>),
    Links(Vec<LocationLink>),
}

impl DefinitionResponse {
    pub fn into_locations(self) -> Vec<Location> {
        match self {
            Self::One(location) => vec![location],
            Self::Many(locations) => locations,
            Self::Links(links) => links.into_iter().map(Location::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupContent {
    /// `markdown` or `plaintext`.
    pub kind: String,
    pub value: String,
}

impl MarkupContent {
    fn plaintext(value: String) -> Self {
        Self {
            kind: "plaintext".to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawHover")]
pub struct Hover {
    pub contents: Vec<MarkupContent>,
    pub range: Option<Range>,
}

impl Hover {
    /// All content blocks joined by blank lines.
    #[must_use]
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .map(|c| c.value.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Deserialize)]
struct RawHover {
    contents: HoverContents,
    #[serde(default)]
    range: Option<Range>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HoverContents {
    Markup(MarkupContent),
    Marked(MarkedString),
    List(Vec<MarkedString>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MarkedString {
    Plain(String),
    Code { language: String, value: String },
    Markup(MarkupContent),
}

impl From<MarkedString> for MarkupContent {
    fn from(marked: MarkedString) -> Self {
        match marked {
            MarkedString::Plain(value) => Self::plaintext(value),
            MarkedString::Code { language, value } => Self {
                kind: "markdown".to_string(),
                value: format!("```{language}\n{value}\n```"),
            },
            MarkedString::Markup(markup) => markup,
        }
    }
}

impl From<RawHover> for Hover {
    fn from(raw: RawHover) -> Self {
        let contents = match raw.contents {
            HoverContents::Markup(markup) => vec![markup],
            HoverContents::Marked(marked) => vec![marked.into()],
            HoverContents::List(list) => list.into_iter().map(MarkupContent::from).collect(),
        };
        Self {
            contents,
            range: raw.range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    pub label: String,
    #[serde(default)]
    pub kind: Option<u64>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub documentation: Option<Value>,
    #[serde(default)]
    pub insert_text: Option<String>,
    /// 1 = plain text, 2 = snippet.
    #[serde(default)]
    pub insert_text_format: Option<u8>,
    #[serde(default)]
    pub filter_text: Option<String>,
    #[serde(default)]
    pub sort_text: Option<String>,
    #[serde(default)]
    pub preselect: Option<bool>,
    #[serde(default)]
    pub text_edit: Option<TextEdit>,
    #[serde(default)]
    pub additional_text_edits: Vec<TextEdit>,
}

impl CompletionItem {
    #[must_use]
    pub fn completion_kind(&self) -> Option<CompletionKind> {
        self.kind.and_then(CompletionKind::from_lsp)
    }

    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        self.completion_kind().map_or("Unknown", CompletionKind::label)
    }

    /// Text to insert: explicit edit, then insert text, then the label.
    #[must_use]
    pub fn text_to_insert(&self) -> &str {
        self.text_edit
            .as_ref()
            .map(|edit| edit.new_text.as_str())
            .or(self.insert_text.as_deref())
            .unwrap_or(&self.label)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum CompletionResponse {
    List(Vec<CompletionItem>),
    #[serde(rename_all = "camelCase")]
    Object {
        #[serde(default)]
        items: Vec<CompletionItem>,
        #[serde(default)]
        #[allow(dead_code)]
        is_incomplete: bool,
    },
}

impl CompletionResponse {
    pub fn into_items(self) -> Vec<CompletionItem> {
        match self {
            Self::List(items) | Self::Object { items, .. } => items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: u64,
    #[serde(default)]
    pub detail: Option<String>,
    /// Absent on the flat `SymbolInformation` shape.
    #[serde(default)]
    pub range: Option<Range>,
    #[serde(default)]
    pub selection_range: Option<Range>,
    #[serde(default)]
    pub children: Vec<DocumentSymbol>,
}

impl DocumentSymbol {
    #[must_use]
    pub fn symbol_kind(&self) -> Option<SymbolKind> {
        SymbolKind::from_lsp(self.kind)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PublishDiagnosticsParams {
    pub uri: String,
    /// Document version the diagnostics were computed for, when the server says.
    #[serde(default)]
    pub version: Option<i32>,
    pub diagnostics: Vec<LspDiagnostic>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LspDiagnostic {
    pub range: Range,
    pub severity: Option<u64>,
    pub source: Option<String>,
    pub message: String,
}

/// Server-pushed notifications the session understands.
#[derive(Debug, Clone)]
pub(crate) enum ServerNotification {
    PublishDiagnostics(PublishDiagnosticsParams),
    Unhandled { method: String, params: Option<Value> },
}

impl ServerNotification {
    pub fn decode(method: String, params: Option<Value>) -> Self {
        if method == methods::PUBLISH_DIAGNOSTICS
            && let Some(raw) = params.clone()
        {
            match serde_json::from_value(raw) {
                Ok(parsed) => return Self::PublishDiagnostics(parsed),
                Err(e) => tracing::warn!("malformed {method} params: {e}"),
            }
        }
        Self::Unhandled { method, params }
    }
}

/// Decode a `result` value, treating `null`/absent as "no data".
pub(crate) fn decode_result<T: serde::de::DeserializeOwned>(
    result: Option<Value>,
) -> Result<Option<T>, serde_json::Error> {
    match result {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value).map(Some),
    }
}

/// A definition result resolved against the open document or a foreign one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionTarget {
    /// The cursor moved within the open document.
    Local(EditorOffset),
    /// The definition lives in another file.
    External(Location),
    None,
}
