use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding `warehouse.path`.
pub const DB_ENV_VAR: &str = "PLAYMART_DB";

const PROJECT_CONFIG_FILE: &str = "playmart.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub queries: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_path")]
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Readiness probes before giving up on the warehouse.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_interval_ms")]
    pub connect_interval_ms: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: default_warehouse_path(),
            create_if_missing: default_true(),
            busy_timeout_ms: default_busy_timeout_ms(),
            connect_attempts: default_connect_attempts(),
            connect_interval_ms: default_connect_interval_ms(),
        }
    }
}

/// Where the two staging relations are loaded from.
///
/// Locations are URIs: plain local paths or `file://` URIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_log_data")]
    pub log_data: String,
    /// Positional JSONPaths mapping for the event logs. Without it keys are
    /// matched to column names.
    #[serde(default)]
    pub log_jsonpath: Option<PathBuf>,
    #[serde(default = "default_song_data")]
    pub song_data: String,
    #[serde(default)]
    pub credential_ref: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            log_data: default_log_data(),
            log_jsonpath: None,
            song_data: default_song_data(),
            credential_ref: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

/// Resolve the pipeline configuration.
///
/// Order: `explicit` path (must exist), `./playmart.toml`,
/// `<config_dir>/playmart/config.toml`, built-in defaults. `PLAYMART_DB`
/// overrides the warehouse path afterwards.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be read or parsed, or
/// if `explicit` points at a missing file.
pub fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = match explicit {
        Some(path) => read_config_file(path)?,
        None => match discover_config_file() {
            Some(path) => read_config_file(&path)?,
            None => PipelineConfig::default(),
        },
    };

    apply_db_override(&mut config, env::var(DB_ENV_VAR).ok());
    Ok(config)
}

/// Parse a TOML config document. `origin` is only used in error context.
///
/// # Errors
///
/// Returns an error if the document is not valid TOML for [`PipelineConfig`].
pub fn parse_config(content: &str, origin: &Path) -> Result<PipelineConfig> {
    toml::from_str::<PipelineConfig>(content)
        .with_context(|| format!("Failed to parse {}", origin.display()))
}

fn read_config_file(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = parse_config(&content, path)?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(PROJECT_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    let user = dirs::config_dir()?.join("playmart/config.toml");
    user.is_file().then_some(user)
}

fn apply_db_override(config: &mut PipelineConfig, value: Option<String>) {
    if let Some(path) = value.filter(|raw| !raw.trim().is_empty()) {
        config.warehouse.path = PathBuf::from(path);
    }
}

fn default_true() -> bool {
    true
}

fn default_warehouse_path() -> PathBuf {
    PathBuf::from("playmart.db")
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_connect_attempts() -> u32 {
    5
}

const fn default_connect_interval_ms() -> u64 {
    500
}

fn default_log_data() -> String {
    "data/log_data".to_string()
}

fn default_song_data() -> String {
    "data/song_data".to_string()
}

const fn default_top_n() -> usize {
    5
}
