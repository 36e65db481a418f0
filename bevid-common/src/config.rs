//! Configuration loading and root folder resolution

use crate::policy::Thresholds;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "BEVID_ROOT_FOLDER";

/// Environment variable holding the enrichment API key
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Default HTTP port of bevid-id
pub const DEFAULT_PORT: u16 = 5780;

/// Bootstrap configuration loaded from TOML
///
/// Every field has a built-in default, so an absent or partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the key-value store
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Tier breakpoints
    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Enrichment endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Messages endpoint every model is tried against
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifiers, tried in order
    #[serde(default = "default_models")]
    pub models: Vec<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Value of the `anthropic-version` header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// API key; the environment variable takes precedence
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            models: default_models(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_version: default_api_version(),
            api_key: None,
        }
    }
}

fn default_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_models() -> Vec<String> {
    vec![
        "claude-3-5-sonnet-latest".to_string(),
        "claude-3-5-haiku-latest".to_string(),
        "claude-3-haiku-20240307".to_string(),
    ]
}

fn default_max_tokens() -> u32 {
    512
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

impl TomlConfig {
    /// Parse TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        if self.enrichment.models.iter().any(|m| m.trim().is_empty()) {
            return Err(Error::Config(
                "enrichment.models must not contain empty names".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from `path`
///
/// A missing file is not an error: a warning is logged and defaults are used.
/// A file that exists but cannot be read, parsed or validated is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = TomlConfig::from_toml_str(&content)?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Platform config file location (`~/.config/bevid/bevid-id.toml` on Linux)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("bevid").join("bevid-id.toml"))
        .unwrap_or_else(|| PathBuf::from("bevid-id.toml"))
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    // ~/.local/share/bevid, ~/Library/Application Support/bevid, %LOCALAPPDATA%\bevid
    dirs::data_local_dir()
        .map(|d| d.join("bevid"))
        .unwrap_or_else(|| PathBuf::from("./bevid_data"))
}

/// Create the root folder if missing
pub fn ensure_directory_exists(root_folder: &Path) -> Result<()> {
    if !root_folder.exists() {
        std::fs::create_dir_all(root_folder)?;
        info!("Created root folder: {}", root_folder.display());
    }
    Ok(())
}

/// Path of the key-value store inside `root_folder`
pub fn store_path(root_folder: &Path) -> PathBuf {
    root_folder.join(crate::store::STORE_FILE_NAME)
}

/// Resolve the enrichment API key
///
/// **Priority:** ENV → TOML. Returns `None` when neither holds a valid key.
pub fn resolve_api_key(env_var_name: &str, toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(env_var_name).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .enrichment
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("Enrichment API key found in environment and TOML. Using environment.");
    }

    match (env_key, toml_key) {
        (Some(key), _) => {
            info!("Enrichment API key loaded from environment variable");
            Some(key)
        }
        (None, Some(key)) => {
            info!("Enrichment API key loaded from TOML config");
            Some(key)
        }
        (None, None) => None,
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
