use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Agent configuration. Every field has a default, so an empty file (or no
/// file at all) yields the stock StoryApp agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Version tag; also the name of the cache store for this generation
  pub version: String,
  /// Origin of the application; requests elsewhere are cross-origin
  pub origin: String,
  /// Paths that must be cached at install time
  pub precache: Vec<String>,
  /// Page served to navigations when the network is down
  pub offline_page: String,
  /// Body of the synthesized 503 response
  pub offline_message: String,
  pub notifications: NotificationConfig,
  pub storage: StorageConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  /// Title when the payload carries none
  pub title: String,
  /// Body when the payload carries none
  pub body: String,
  /// Title used when the payload is not JSON
  pub fallback_title: String,
  /// Body used when the push carried no payload at all
  pub empty_body: String,
  /// Target URL when the payload carries none
  pub url: String,
  pub icon: String,
  pub badge: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// SQLite database path (default: $XDG_DATA_HOME/offline-agent/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Default filter directive; `RUST_LOG` takes precedence
  pub level: String,
  /// Directory for daily rolling log files; stderr only when unset
  pub dir: Option<PathBuf>,
}

const ICON_SIZES: [u32; 8] = [72, 96, 128, 144, 152, 192, 384, 512];

impl Default for Config {
  fn default() -> Self {
    let mut precache: Vec<String> = [
      "/",
      "/index.html",
      "/offline.html",
      "/app.bundle.js",
      "/app.webmanifest",
      "/manifest.json",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    precache.extend(ICON_SIZES.iter().map(|n| icon_path(*n)));

    Self {
      version: "storyapp-v1.0.1".to_string(),
      origin: "http://localhost:8080".to_string(),
      precache,
      offline_page: "/offline.html".to_string(),
      offline_message: "Tidak dapat terhubung ke internet".to_string(),
      notifications: NotificationConfig::default(),
      storage: StorageConfig::default(),
      logging: LoggingConfig::default(),
    }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "StoryApp".to_string(),
      body: "Ada pembaruan baru di StoryApp".to_string(),
      fallback_title: "Notifikasi Baru".to_string(),
      empty_body: "Tidak ada detail".to_string(),
      url: "/".to_string(),
      icon: icon_path(192),
      badge: icon_path(72),
    }
  }
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
    }
  }
}

fn icon_path(size: u32) -> String {
  format!("/icons/icon-{size}x{size}.png")
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-agent.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-agent/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offline-agent.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-agent").join("config.yaml");
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

  /// Parse configuration from YAML text.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    // An empty document deserializes to null, not to an empty mapping
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }

    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Check the values the agent cannot run without.
  pub fn validate(&self) -> Result<()> {
    if self.version.trim().is_empty() {
      return Err(eyre!("Config: version must not be empty"));
    }

    let origin = self.origin_url()?;
    for path in &self.precache {
      origin
        .join(path)
        .map_err(|e| eyre!("Config: invalid precache entry '{}': {}", path, e))?;
    }
    origin
      .join(&self.offline_page)
      .map_err(|e| eyre!("Config: invalid offline_page '{}': {}", self.offline_page, e))?;

    Ok(())
  }

  /// The configured origin as a URL.
  pub fn origin_url(&self) -> Result<Url> {
    let url = Url::parse(&self.origin)
      .map_err(|e| eyre!("Config: invalid origin '{}': {}", self.origin, e))?;

    if !url.has_host() {
      return Err(eyre!("Config: origin '{}' has no host", self.origin));
    }

    Ok(url)
  }
}
