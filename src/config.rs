use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  /// Project opened when the shell starts
  pub default_project: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
  /// The REST service at `api.url`
  Remote,
  /// In-memory demo data, no network
  #[default]
  Mock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_api_url")]
  pub url: String,
  #[serde(default)]
  pub backend: Backend,
  /// Per-request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
      backend: Backend::default(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_api_url() -> String {
  "http://localhost:3000/api".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Seconds before a cached query is refetched on read
  #[serde(default = "default_stale_time_secs")]
  pub stale_time_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time_secs: default_stale_time_secs(),
    }
  }
}

impl CacheConfig {
  pub fn stale_time(&self) -> chrono::Duration {
    let secs = self.stale_time_secs.min(i64::MAX as u64 / 1000);
    chrono::Duration::seconds(secs as i64)
  }
}

fn default_stale_time_secs() -> u64 {
  300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Filter used when TASKBOARD_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Log file path (defaults to the data directory)
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      file: None,
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./taskboard.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/taskboard/config.yaml
  ///
  /// Without any file the defaults apply, which use the mock backend.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("taskboard.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("taskboard").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get an API token from the environment, overriding the stored session.
  pub fn get_api_token() -> Option<String> {
    std::env::var("TASKBOARD_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }

  /// Get the login password from the environment.
  ///
  /// Checks TASKBOARD_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("TASKBOARD_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set TASKBOARD_PASSWORD environment variable."))
  }

  /// Where the log file goes unless configured.
  pub fn log_file(&self) -> Result<PathBuf> {
    if let Some(file) = &self.log.file {
      return Ok(file.clone());
    }
    let data_dir = dirs::data_dir().ok_or_else(|| eyre!("Could not determine data directory"))?;
    Ok(data_dir.join("taskboard").join("taskboard.log"))
  }
}
