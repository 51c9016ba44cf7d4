//! Configuration management for the clipper.
//!
//! Loads configuration from TOML files and provides runtime defaults. The
//! `[preferences]` table is the same record the browser extension stores,
//! so its keys also accept the extension's camelCase spelling.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::chunker::ChunkerConfig;
use crate::types::CaptureMode;

/// Why a config file could not be used
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0:?}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0:?}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

/// Template used when the user has not set one
pub const DEFAULT_TEMPLATE: &str = "{url}\n\n{content}";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub preferences: Preferences,

    #[serde(default)]
    pub vault: VaultConfig,

    #[serde(default)]
    pub split: SplitConfig,

    #[serde(default)]
    pub markdown: MarkdownConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// User preferences shared with the extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Note template with `{url}`, `{title}`, `{content}`, `{date}`, `{service}`
    #[serde(default = "default_template")]
    pub template: String,

    /// Capture mode used when a request does not name one
    #[serde(default = "default_mode", alias = "defaultMode")]
    pub default_mode: CaptureMode,

    /// How many messages `lastN` captures
    #[serde(default = "default_message_count", alias = "messageCount")]
    pub message_count: usize,

    /// Add a `tags:` line to the frontmatter
    #[serde(default = "default_true", alias = "autoTagging")]
    pub auto_tagging: bool,

    /// Prepend frontmatter (default template only)
    #[serde(default = "default_true", alias = "includeMetadata")]
    pub include_metadata: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            template: default_template(),
            default_mode: default_mode(),
            message_count: default_message_count(),
            auto_tagging: true,
            include_metadata: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault root directory for direct file writes
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Vault name for `obsidian://` URIs
    #[serde(default)]
    pub name: Option<String>,

    /// Folder inside the vault that receives notes
    #[serde(default = "default_folder")]
    pub folder: String,

    /// Longest `obsidian://new` URI the opener accepts
    #[serde(default = "default_uri_max_length")]
    pub uri_max_length: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: None,
            name: None,
            folder: default_folder(),
            uri_max_length: default_uri_max_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Messages longer than this (HTML chars) are split into parts
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Trailing content repeated at the start of the next part
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

impl SplitConfig {
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_chars: self.max_chars,
            overlap_chars: self.overlap_chars.min(self.max_chars),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkdownConfig {
    /// Emit each message's extraction time under its header
    #[serde(default)]
    pub include_timestamp: bool,

    #[serde(default = "default_user_label")]
    pub user_label: String,

    /// Assistant header; the service name when unset
    #[serde(default)]
    pub assistant_label: Option<String>,

    /// Text placed between messages
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            include_timestamp: false,
            user_label: default_user_label(),
            assistant_label: None,
            separator: default_separator(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_mode() -> CaptureMode {
    CaptureMode::Full
}

fn default_message_count() -> usize {
    30
}

fn default_folder() -> String {
    "AI Chats".to_string()
}

fn default_uri_max_length() -> usize {
    8000
}

fn default_max_chars() -> usize {
    50_000
}

fn default_overlap_chars() -> usize {
    500
}

fn default_user_label() -> String {
    "User".to_string()
}

fn default_separator() -> String {
    "\n\n---\n\n".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match Self::read_from_path(&path) {
            Ok(Some(config)) => {
                info!("Loaded configuration from {:?}", path);
                config
            }
            Ok(None) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Read and parse a config file. `Ok(None)` when the file does not exist.
    pub fn read_from_path(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfigError::Read(path.to_path_buf(), e)),
        };
        toml::from_str(&contents)
            .map(Some)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chat-clipper")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
