use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub origin: OriginConfig,
  #[serde(default)]
  pub relay: RelayConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
  /// Base URL every relayed request is forwarded to
  pub url: String,
  /// Optional path fragment; when set, only POSTs whose path contains it
  /// get offline-queue handling
  pub write_filter: Option<String>,
}

impl OriginConfig {
  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.url).map_err(|e| eyre!("Invalid origin URL {}: {}", self.url, e))
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
  /// Address the relay listens on
  #[serde(default = "default_listen")]
  pub listen: String,
}

impl Default for RelayConfig {
  fn default() -> Self {
    Self {
      listen: default_listen(),
    }
  }
}

fn default_listen() -> String {
  "127.0.0.1:8970".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Version tag baked into partition names; bump it to roll the shell
  #[serde(default = "default_version")]
  pub version: String,
  /// Root-relative paths precached into the shell partition at install
  #[serde(default)]
  pub manifest: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: default_version(),
      manifest: Vec::new(),
    }
  }
}

fn default_version() -> String {
  "v1".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Database location (default: $XDG_DATA_HOME/offsync/relay.db)
  pub path: Option<PathBuf>,
}

impl StorageConfig {
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offsync").join("relay.db"))
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Origin path that queued records are replayed to
  pub endpoint: String,
  /// Tag carried by sync triggers for the write queue
  #[serde(default = "default_tag")]
  pub tag: String,
  /// Seconds between connectivity probes
  #[serde(default = "default_probe_interval")]
  pub probe_interval_secs: u64,
}

fn default_tag() -> String {
  "sync-pending-writes".to_string()
}

fn default_probe_interval() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/offsync/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Absolute URL of the fixed write endpoint queued records replay to.
  pub fn sync_endpoint(&self) -> Result<Url> {
    self
      .origin
      .base_url()?
      .join(&self.sync.endpoint)
      .map_err(|e| eyre!("Invalid sync endpoint {}: {}", self.sync.endpoint, e))
  }
}
