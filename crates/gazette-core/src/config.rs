use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::feed::{parse_opml_file, SourceDescriptor};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Feed sources to ingest, in the order they appear in the file
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path (database and daemon socket)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Ingestion interval in seconds (0 = recurring ingestion disabled)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Run one batch as soon as the daemon starts
    #[serde(default = "default_true")]
    pub run_on_start: bool,
    /// Per-source request timeout in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// HTTP proxy URL for feed fetching (e.g., "http://127.0.0.1:7890" or "socks5://127.0.0.1:1080")
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// What to do when an ingested link is already stored
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
    /// Optional OPML file whose outlines are appended to `sources`
    #[serde(default)]
    pub sources_opml: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            run_on_start: default_true(),
            request_timeout_secs: default_timeout(),
            proxy_url: None,
            on_duplicate: DuplicatePolicy::default(),
            sources_opml: None,
        }
    }
}

/// Behavior of the persist gateway when an article's link is already stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Leave the stored row untouched
    #[default]
    Skip,
    /// Update mutable fields in place; `link` and `created_at` are never changed
    Refresh,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gazette")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_refresh_interval() -> u64 {
    3600 // hourly
}

fn default_timeout() -> u64 {
    30
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from the default location or return defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Get the configuration file path
    /// Always uses ~/.config/gazette/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("gazette")
            .join("config.toml")
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("gazette.db")
    }

    /// Get the Unix socket path for IPC
    pub fn socket_path(&self) -> PathBuf {
        self.data_dir().join("gazette.sock")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }

    /// Build the Source Descriptor Set: configured sources followed by OPML outlines.
    ///
    /// Blank names or URLs are a configuration error. Descriptors are identified by
    /// their feed URL, so a repeated URL keeps its first occurrence. Names key the
    /// batch report, so two different URLs sharing a name are a configuration error.
    pub fn source_descriptors(&self) -> crate::Result<Vec<SourceDescriptor>> {
        let mut candidates = self.sources.clone();

        if let Some(ref opml_path) = self.sync.sources_opml {
            let path = expand_tilde(opml_path);
            let imported = parse_opml_file(&path)?;
            tracing::info!(
                "Loaded {} sources from OPML file {}",
                imported.len(),
                path.display()
            );
            candidates.extend(imported);
        }

        let mut seen = HashSet::new();
        let mut names = HashSet::new();
        let mut descriptors = Vec::with_capacity(candidates.len());

        for descriptor in candidates {
            let descriptor = descriptor.trimmed();
            if descriptor.name.is_empty() {
                return Err(crate::Error::Config(format!(
                    "source with feed_url '{}' has an empty name",
                    descriptor.feed_url
                )));
            }
            if descriptor.feed_url.is_empty() {
                return Err(crate::Error::Config(format!(
                    "source '{}' has an empty feed_url",
                    descriptor.name
                )));
            }
            if !seen.insert(descriptor.feed_url.clone()) {
                tracing::warn!(
                    "Ignoring duplicate source '{}' for {}",
                    descriptor.name,
                    descriptor.feed_url
                );
                continue;
            }
            if !names.insert(descriptor.name.clone()) {
                return Err(crate::Error::Config(format!(
                    "source name '{}' is used by more than one feed_url",
                    descriptor.name
                )));
            }
            descriptors.push(descriptor);
        }

        Ok(descriptors)
    }
}
