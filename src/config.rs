use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::{CacheGeneration, Role};

const NO_CONFIG: &str = "No configuration file found. Create one at \
  ~/.config/offline-worker/config.yaml (see config.example.yaml for the format)";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the app is served from (scheme + host), e.g. https://user.github.io
  pub origin: Url,
  /// Path prefix the app lives under, without trailing slash (e.g. "/coba-web-app")
  #[serde(default, deserialize_with = "deserialize_base_path")]
  pub base_path: String,
  /// Version tag appended to cache generation names
  #[serde(default = "default_version")]
  pub version: String,
  /// Display name used in notifications and the offline message
  #[serde(default = "default_app_name")]
  pub app_name: String,
  /// Application shell, relative to `base_path`
  #[serde(default = "default_assets")]
  pub assets: Vec<String>,
  /// Activate immediately after install instead of waiting
  #[serde(default = "default_true")]
  pub skip_waiting: bool,
  /// Database location (defaults to $XDG_DATA_HOME/offline-worker/cache.db)
  pub database: Option<PathBuf>,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub notifications: NotificationConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  #[serde(default = "default_background_tag")]
  pub background_tag: String,
  #[serde(default = "default_periodic_tag")]
  pub periodic_tag: String,
  /// Period used by `run` mode to fire periodic sync
  #[serde(default = "default_periodic_interval")]
  pub periodic_interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      background_tag: default_background_tag(),
      periodic_tag: default_periodic_tag(),
      periodic_interval_secs: default_periodic_interval(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
  /// Relative to `base_path`
  #[serde(default = "default_icon")]
  pub icon: String,
  /// Relative to `base_path`
  #[serde(default = "default_badge")]
  pub badge: String,
  #[serde(default = "default_tag")]
  pub tag: String,
  #[serde(default)]
  pub require_interaction: bool,
  /// Body shown when a push carries none (defaults to an update notice)
  pub default_body: Option<String>,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      icon: default_icon(),
      badge: default_badge(),
      tag: default_tag(),
      require_interaction: false,
      default_body: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// Filter directive, overridden by RUST_LOG
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Optional log file (rotated daily)
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_app_name() -> String {
  "Web App".to_string()
}

fn default_assets() -> Vec<String> {
  ["/", "/index.html", "/style.css", "/app.js", "/manifest.json"]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_true() -> bool {
  true
}

fn default_background_tag() -> String {
  "background-sync".to_string()
}

fn default_periodic_tag() -> String {
  "content-sync".to_string()
}

fn default_periodic_interval() -> u64 {
  12 * 60 * 60
}

fn default_icon() -> String {
  "/icon-192x192.png".to_string()
}

fn default_badge() -> String {
  "/badge-72x72.png".to_string()
}

fn default_tag() -> String {
  "app-notification".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn deserialize_base_path<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let s = String::deserialize(deserializer)?;
  Ok(normalize_base_path(&s))
}

/// "/app/" and "app" both become "/app"; "/" becomes "".
fn normalize_base_path(s: &str) -> String {
  let trimmed = s.trim().trim_matches('/');
  if trimmed.is_empty() {
    String::new()
  } else {
    format!("/{}", trimmed)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-worker/config.yaml
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
      None => Err(eyre!(NO_CONFIG)),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offline-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-worker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Prefix `path` (root-relative) with the base path.
  pub fn scoped(&self, path: &str) -> String {
    if path.starts_with('/') {
      format!("{}{}", self.base_path, path)
    } else {
      format!("{}/{}", self.base_path, path)
    }
  }

  pub fn static_generation(&self) -> CacheGeneration {
    CacheGeneration::new(Role::Static, &self.version)
  }

  pub fn dynamic_generation(&self) -> CacheGeneration {
    CacheGeneration::new(Role::Dynamic, &self.version)
  }

  /// Static asset manifest as absolute paths, in declaration order.
  pub fn manifest(&self) -> Vec<String> {
    self.assets.iter().map(|a| self.scoped(a)).collect()
  }

  /// The app root, `<base>/`.
  pub fn app_root(&self) -> String {
    self.scoped("/")
  }

  /// Fallback document for offline navigations.
  pub fn index_path(&self) -> String {
    self.scoped("/index.html")
  }

  pub fn api_prefix(&self) -> String {
    self.scoped("/api/")
  }

  /// Background-sync delivery target.
  pub fn analytics_path(&self) -> String {
    self.scoped("/api/analytics")
  }

  /// Periodic-sync refresh target.
  pub fn latest_content_path(&self) -> String {
    self.scoped("/api/content/latest")
  }

  pub fn offline_message(&self) -> String {
    format!("{} is offline", self.app_name)
  }

  /// Resolve a root-relative path against the origin.
  pub fn url_for(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path {}: {}", path, e))
  }
}
