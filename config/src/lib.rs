//! Configuration file for the Go sandbox.
//!
//! Read from `$GOSANDBOX_CONFIG` or `~/.gosandbox/config.toml`. A missing
//! file means defaults; an unreadable or invalid one is logged and also means
//! defaults. String values may reference environment variables as `${VAR}`.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gosandbox_lsp::LspConfig;
use serde::Deserialize;

pub const CONFIG_ENV: &str = "GOSANDBOX_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub lsp: LspConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum recorded navigation entries; 0 means unbounded.
    pub max_entries: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Replace every `${VAR}` with the variable's value (empty if unset).
///
/// An unterminated `${` is kept verbatim.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn expand_strings(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => *s = expand_env_vars(s),
        toml::Value::Array(items) => items.iter_mut().for_each(expand_strings),
        toml::Value::Table(table) => table.iter_mut().for_each(|(_, v)| expand_strings(v)),
        _ => {}
    }
}

impl SandboxConfig {
    /// Load from the default location, falling back to defaults on any problem.
    #[must_use]
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("{err}; using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut raw: toml::Table = toml::from_str(content)?;
        raw.iter_mut().for_each(|(_, v)| expand_strings(v));
        toml::Value::Table(raw).try_into()
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

fn config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(".gosandbox").join("config.toml"))
}
