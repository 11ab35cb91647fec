//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILHARVEST_CONFIG` (environment variable)
//! 2. `~/.config/mailharvest/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailharvest\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MailError, Result};
use crate::search::criteria::DateRange;
use crate::search::request::SearchRequest;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mailbox login.
    pub account: AccountConfig,
    /// Default search parameters.
    pub search: SearchConfig,
    /// Attachment download settings.
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Mailbox login settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Login address.
    pub address: String,
    /// Credential stored in the file. Prefer `credential_env`.
    pub credential: String,
    /// Name of an environment variable holding the credential.
    pub credential_env: String,
    /// Directory served as the mailbox (`<root>/<folder>/<id>.eml`).
    pub mailbox_root: Option<PathBuf>,
}

/// Defaults for every field of a search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub folder: String,
    pub keywords: Vec<String>,
    pub search_subject: bool,
    pub search_body: bool,
    pub search_attachment_name: bool,
    /// Extensions with the dot (".csv"), or "*" for everything.
    pub attachment_file_types: Vec<String>,
    /// 0 = unlimited.
    pub max_results: usize,
    pub include_attachmentless: bool,
    pub sender_filter: Vec<String>,
    pub accurate_search: bool,
    /// "recent_first" or "recent_last".
    pub sort_direction: String,
    pub connection_timeout_secs: u64,
}

/// Attachment download settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root of `<root>/<folder>/<message_id>/<file>`.
    pub root: Option<PathBuf>,
    /// Delete each attachment file once parsed into a table.
    pub discard_after_parse: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            folder: "inbox".to_string(),
            keywords: Vec::new(),
            search_subject: true,
            search_body: false,
            search_attachment_name: false,
            attachment_file_types: vec!["*".to_string()],
            max_results: 0,
            include_attachmentless: false,
            sender_filter: Vec::new(),
            accurate_search: true,
            sort_direction: "recent_first".to_string(),
            connection_timeout_secs: 60,
        }
    }
}

impl SearchConfig {
    /// Build a request from these defaults. Dates are per-call and start open.
    ///
    /// Fails on an unrecognized `sort_direction`.
    pub fn to_request(&self) -> Result<SearchRequest> {
        Ok(SearchRequest {
            keywords: self.keywords.clone(),
            folder: self.folder.clone(),
            date_range: DateRange::default(),
            search_body: self.search_body,
            search_subject: self.search_subject,
            search_attachment_name: self.search_attachment_name,
            attachment_file_types: self.attachment_file_types.clone(),
            max_results: self.max_results,
            include_attachmentless: self.include_attachmentless,
            sender_filter: self.sender_filter.clone(),
            accurate_search: self.accurate_search,
            sort_direction: self.sort_direction.parse()?,
            connection_timeout: Duration::from_secs(self.connection_timeout_secs),
        })
    }
}

impl AccountConfig {
    /// The credential to log in with: `$credential_env` when set, else the
    /// inline value.
    pub fn resolve_credential(&self) -> Result<String> {
        if self.credential_env.is_empty() {
            return Ok(self.credential.clone());
        }
        std::env::var(&self.credential_env).map_err(|_| {
            MailError::config(format!(
                "environment variable {} is not set",
                self.credential_env
            ))
        })
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILHARVEST_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailharvest").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailharvest")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailharvest.log")
}

/// Where attachments are written when `[download] root` is unset.
pub fn download_root(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.download.root {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailharvest")
        .join("downloads")
}

/// The mailbox directory when `[account] mailbox_root` is unset.
pub fn mailbox_root(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.account.mailbox_root {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailharvest")
        .join("mailbox")
}
