//! Server configuration: defaults, JSON file, environment, command line.
//!
//! Each source produces a [`ConfigOverlay`] whose set fields replace the
//! current value; overlays are applied in order defaults < file < env < CLI.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filesystem::config::{SandboxConfig, SandboxConfigPatch, TemplateConfig};

pub const ENV_PREFIX: &str = "MCP_FILE_FORGE_";
pub const CONFIG_FILE_NAMES: [&str; 2] = ["mcp-file-forge.json", ".mcp-file-forge.json"];
pub const LOG_LEVELS: [&str; 4] = ["error", "warn", "info", "debug"];

/// Directories inspected by [`find_config_file`], starting directory included
const CONFIG_SEARCH_LEVELS: usize = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub sandbox: SandboxConfig,
    pub templates: TemplateConfig,
    pub logging: LogConfig,
    pub read_only: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig {
                denied_paths: Some(vec![
                    "**/node_modules/**".to_string(),
                    "**/.git/**".to_string(),
                ]),
                ..Default::default()
            },
            templates: TemplateConfig::default(),
            logging: LogConfig::default(),
            read_only: false,
        }
    }
}

impl ServerConfig {
    pub fn apply(&mut self, overlay: ConfigOverlay) {
        self.sandbox.apply(overlay.sandbox);
        if let Some(paths) = overlay.templates.paths {
            self.templates.paths = paths;
        }
        if let Some(level) = overlay.logging.level {
            let level = level.to_ascii_lowercase();
            if LOG_LEVELS.contains(&level.as_str()) {
                self.logging.level = level;
            }
        }
        if let Some(file) = overlay.logging.file {
            self.logging.file = Some(file);
        }
        if let Some(read_only) = overlay.read_only {
            self.read_only = read_only;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TemplatePatch {
    pub paths: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogPatch {
    pub level: Option<String>,
    pub file: Option<String>,
}

/// One configuration source; unset fields leave the current value alone
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigOverlay {
    pub sandbox: SandboxConfigPatch,
    pub templates: TemplatePatch,
    pub logging: LogPatch,
    pub read_only: Option<bool>,
}

impl ConfigOverlay {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build an overlay from `MCP_FILE_FORGE_*` variables fetched through `lookup`
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        Self {
            sandbox: SandboxConfigPatch {
                allowed_paths: var("ALLOWED_PATHS").map(|v| parse_csv(&v)),
                denied_paths: var("DENIED_PATHS").map(|v| parse_csv(&v)),
                follow_symlinks: var("FOLLOW_SYMLINKS").map(|v| parse_flag(&v)),
                max_file_size: var("MAX_FILE_SIZE").and_then(|v| v.trim().parse().ok()),
                max_depth: var("MAX_DEPTH").and_then(|v| v.trim().parse().ok()),
            },
            templates: TemplatePatch {
                paths: var("TEMPLATE_PATHS").map(|v| parse_csv(&v)),
            },
            logging: LogPatch {
                level: var("LOG_LEVEL"),
                file: var("LOG_FILE"),
            },
            read_only: var("READ_ONLY").map(|v| parse_flag(&v)),
        }
    }
}

fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Look for a config file in `start` and its ancestors
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .take(CONFIG_SEARCH_LEVELS)
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// Outcome of [`load_config`]. A file that failed to load is reported
/// here so it can be logged once tracing is up.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: ServerConfig,
    pub file: Option<PathBuf>,
    pub file_error: Option<ConfigError>,
}

/// Defaults, then the config file (explicit or discovered), then environment
pub fn load_config(explicit: Option<&Path>) -> LoadedConfig {
    load_config_with(explicit, |key| std::env::var(key).ok())
}

pub fn load_config_with<F>(explicit: Option<&Path>, lookup: F) -> LoadedConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ServerConfig::default();

    let file = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| find_config_file(&cwd)),
    };

    let mut file_error = None;
    if let Some(path) = &file {
        match ConfigOverlay::from_file(path) {
            Ok(overlay) => config.apply(overlay),
            Err(e) => file_error = Some(e),
        }
    }

    config.apply(ConfigOverlay::from_env_with(lookup));

    LoadedConfig {
        config,
        file,
        file_error,
    }
}
