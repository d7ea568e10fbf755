//! Bootstrap configuration loading and root folder resolution
//!
//! Two configuration tiers:
//! 1. **TOML bootstrap**: port, root folder, logging, webhook secret, LLM backend,
//!    parsing defaults. Read once at startup.
//! 2. **Database settings**: secrets may also live in the `settings` table and
//!    take priority over ENV and TOML (resolved by the service crate).
//!
//! Missing or unreadable TOML files never abort startup: a warning is logged
//! and compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "PRDESK_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "prdesk.db";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Inbound webhook settings
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// LLM extraction backend
    #[serde(default)]
    pub llm: LlmConfig,

    /// Parser defaults
    #[serde(default)]
    pub parsing: ParsingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Inbound webhook configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret compared against the payload `api_key`
    #[serde(default)]
    pub shared_secret: Option<String>,
}

/// LLM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai", "anthropic" or "none"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Override for the provider API base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Hard upper bound for one extraction call
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

/// Parser defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// IANA zone used when an email states a time without a zone
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

fn default_port() -> u16 {
    5740
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_llm_provider() -> String {
    "none".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    20
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            bind_address: default_bind_address(),
            logging: LoggingConfig::default(),
            webhook: WebhookConfig::default(),
            llm: LlmConfig::default(),
            parsing: ParsingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            model: None,
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
        }
    }
}

/// Load TOML config, falling back to defaults when the file is missing
///
/// A file that exists but fails to parse is an error: silently ignoring a
/// typo in the webhook secret section would disable authentication.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using compiled defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Default configuration file path for the platform
///
/// `~/.config/prdesk/<module>.toml` on Linux, the platform config dir elsewhere.
pub fn default_config_path(module_name: &str) -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("prdesk").join(format!("{}.toml", module_name)))
        .unwrap_or_else(|| PathBuf::from(format!("./{}.toml", module_name)))
}

/// Root folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `PRDESK_ROOT_FOLDER`
/// 3. TOML config `root_folder`
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
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
    if cfg!(target_os = "linux") {
        // ~/.local/share/prdesk (or /var/lib/prdesk for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("prdesk"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/prdesk"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("prdesk"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/prdesk"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("prdesk"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\prdesk"))
    } else {
        PathBuf::from("./prdesk_data")
    }
}

/// Create the root folder if missing and return the database path inside it
pub fn prepare_root_folder(root_folder: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root_folder).map_err(|e| {
        Error::Config(format!(
            "Failed to create root folder {}: {}",
            root_folder.display(),
            e
        ))
    })?;
    Ok(root_folder.join(DATABASE_FILE))
}
