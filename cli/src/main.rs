//! Go sandbox CLI - headless language-intelligence session for one Go file.
//!
//! ```text
//! main() -> Session::connect() -> wait_ready() -> queries -> drain diagnostics
//! ```
//!
//! Results go to stdout; logs go to `~/.gosandbox/logs/gosandbox.log`.

use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use gosandbox_config::SandboxConfig;
use gosandbox_history::{MemoryView, NavigationHistory};
use gosandbox_lsp::{
    DefinitionTarget, DiagnosticsSnapshot, Session, SessionEvent, SymbolStats, goto_definition,
};
use gosandbox_types::{Diagnostic, EditorOffset, offset_at, row_col};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Ask a Go language server about one file
#[derive(Parser, Debug)]
#[command(name = "gosandbox")]
#[command(about = "Open a Go file against a language server and query it", long_about = None)]
#[command(version)]
struct Args {
    /// Go source file to open
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Server endpoint (ws://, wss:// or tcp://); overrides the config file
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Go version suffix used in the document URI
    #[arg(long, value_name = "VERSION")]
    go_version: Option<String>,

    /// Show hover information at 1-based ROW:COL
    #[arg(long, value_name = "ROW:COL")]
    hover: Option<RowCol>,

    /// Go to the definition at 1-based ROW:COL
    #[arg(long, value_name = "ROW:COL")]
    definition: Option<RowCol>,

    /// List completions at 1-based ROW:COL
    #[arg(long, value_name = "ROW:COL")]
    complete: Option<RowCol>,

    /// List document symbols with per-kind counts
    #[arg(long)]
    symbols: bool,

    /// How long to collect pushed diagnostics before exiting
    #[arg(long, value_name = "MS", default_value_t = 1500)]
    wait_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RowCol {
    row: u32,
    col: u32,
}

impl FromStr for RowCol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (row, col) = s
            .split_once(':')
            .ok_or_else(|| format!("expected ROW:COL, got {s:?}"))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid number {part:?}: {e}"))
        };
        Ok(Self {
            row: parse(row)?,
            col: parse(col)?,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Results own stdout, so logs fall back to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: next to the config file, normally ~/.gosandbox/logs/gosandbox.log
    if let Some(config_path) = SandboxConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("gosandbox.log"));
    }

    // Fallback: ./.gosandbox/logs/gosandbox.log
    candidates.push(PathBuf::from(".gosandbox").join("logs").join("gosandbox.log"));

    candidates
}

fn offset_of(at: RowCol, doc: &str) -> Result<EditorOffset> {
    offset_at(at.row, at.col, doc).with_context(|| format!("{}:{} is not in the file", at.row, at.col))
}

fn format_diagnostic(path: &Path, diagnostic: &Diagnostic, doc: &str) -> String {
    let (row, col) = row_col(diagnostic.from(), doc).unwrap_or((0, 0));
    format!(
        "{}:{row}:{col}: {}: {} [{}]",
        path.display(),
        diagnostic.severity().map_or("unknown", |s| s.label()),
        diagnostic.message(),
        diagnostic.source(),
    )
}

/// Collect pushed diagnostics until `wait` elapses or the session stops.
async fn drain_events(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    wait: Duration,
) -> Option<Vec<Diagnostic>> {
    let deadline = tokio::time::Instant::now() + wait;
    let mut latest = None;

    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(SessionEvent::Diagnostics(items))) => latest = Some(items),
            Ok(Some(SessionEvent::Error(message))) => eprintln!("server error: {message}"),
            Ok(Some(SessionEvent::StateChanged(state))) if state.is_terminal() => {
                eprintln!("session {state}");
                break;
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }

    latest
}

async fn run(args: Args) -> Result<()> {
    let mut config = SandboxConfig::load();
    if let Some(url) = args.url {
        config.lsp.url = url;
    }
    if let Some(go_version) = args.go_version {
        config.lsp.go_version = go_version;
    }

    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let file_path = args.file.display().to_string();

    let init_timeout = config.lsp.init_timeout();
    let (session, mut events) = Session::connect(config.lsp.clone(), text.clone())?;
    tracing::info!(uri = %session.document_uri(), url = %config.lsp.url, "session started");

    match tokio::time::timeout(init_timeout, session.wait_ready()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => bail!("language server unavailable: {e}"),
        Err(_) => bail!("timed out waiting for the language server at {}", config.lsp.url),
    }

    let mut view = MemoryView::new(text.as_str());
    let mut history = NavigationHistory::with_capacity(config.history.max_entries);
    history.reset(Some(&view), &text, &file_path);

    if let Some(at) = args.hover {
        match session.hover(offset_of(at, &text)?).await {
            Ok(Some(hover)) => println!("{}", hover.text()),
            Ok(None) => println!("no hover information"),
            Err(e) => eprintln!("{e}"),
        }
    }

    if let Some(at) = args.definition {
        view.set_head(offset_of(at, &text)?);
        match goto_definition(&session, &mut view, &mut history, &file_path).await {
            DefinitionTarget::Local(offset) => {
                let (row, col) = row_col(offset, &text)?;
                println!("{file_path}:{row}:{col}");
            }
            DefinitionTarget::External(location) => println!(
                "{}:{}:{}",
                location.uri,
                location.range.start.line + 1,
                location.range.start.character + 1
            ),
            DefinitionTarget::None => println!("no definition found"),
        }
    }

    if let Some(at) = args.complete {
        match session.completion(offset_of(at, &text)?).await {
            Ok(items) if items.is_empty() => println!("no completions"),
            Ok(items) => {
                for item in items {
                    println!(
                        "{:<14} {}  {}",
                        item.kind_label(),
                        item.label,
                        item.detail.as_deref().unwrap_or_default()
                    );
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    if args.symbols {
        match session.document_symbols().await {
            Ok(symbols) => {
                for symbol in &symbols {
                    let kind = symbol.symbol_kind().map_or("Unknown", |k| k.label());
                    println!("{kind:<14} {}", symbol.name);
                }
                let stats = SymbolStats::count(&symbols);
                let summary: Vec<String> = stats
                    .iter()
                    .map(|(kind, count)| format!("{}: {count}", kind.label()))
                    .collect();
                println!("{} symbol(s) ({})", stats.total(), summary.join(", "));
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    let pushed = drain_events(&mut events, Duration::from_millis(args.wait_ms)).await;
    let snapshot = pushed.map_or_else(|| session.diagnostics(), DiagnosticsSnapshot::new);
    for diagnostic in snapshot.items() {
        println!("{}", format_diagnostic(&args.file, diagnostic, &text));
    }
    if !snapshot.is_empty() {
        println!("{}", snapshot.status_string());
    }

    session.close();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();
    run(args).await
}
