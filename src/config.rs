use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub tracker: TrackerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
  /// Base URL of the tracker API, e.g. "https://tracker.example.com/api/v1"
  pub url: String,
  /// Seconds allowed for the whole request (connect + read)
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
  /// Base spacing between outbound requests, in milliseconds
  #[serde(default = "default_min_interval_ms")]
  pub min_interval_ms: u64,
  /// Remaining-quota level at which the spacing doubles
  #[serde(default = "default_low_water_mark")]
  pub low_water_mark: u64,
  /// Retries for connection/timeout failures before giving up
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// TTL for the workspace project list
  pub project_ttl_secs: u64,
  /// TTL for per-project members and workflow states
  pub metadata_ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      project_ttl_secs: 4 * 3600,
      metadata_ttl_secs: 3600,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Overall deadline for one sync pass
  pub deadline_secs: u64,
  /// Age after which an in-progress row from a dead process is reset
  pub stale_sync_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      deadline_secs: 300,
      stale_sync_secs: 900,
    }
  }
}

fn default_request_timeout_secs() -> u64 {
  30
}

fn default_min_interval_ms() -> u64 {
  1000
}

fn default_low_water_mark() -> u64 {
  5
}

fn default_max_retries() -> u32 {
  2
}

impl TrackerConfig {
  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  pub fn min_interval(&self) -> Duration {
    Duration::from_millis(self.min_interval_ms)
  }
}

impl CacheConfig {
  pub fn project_ttl(&self) -> Duration {
    Duration::from_secs(self.project_ttl_secs)
  }

  pub fn metadata_ttl(&self) -> Duration {
    Duration::from_secs(self.metadata_ttl_secs)
  }
}

impl SyncConfig {
  pub fn deadline(&self) -> Duration {
    Duration::from_secs(self.deadline_secs)
  }

  pub fn stale_sync(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.stale_sync_secs as i64)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tasksync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tasksync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self, SyncError> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(SyncError::Config(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(SyncError::Config(
        "no configuration file found; create one at ~/.config/tasksync/config.yaml".to_string(),
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("tasksync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tasksync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self, SyncError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      SyncError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config: Config = serde_yaml::from_str(&contents).map_err(|e| {
      SyncError::Config(format!(
        "failed to parse config file {}: {}",
        path.display(),
        e
      ))
    })?;

    Ok(config)
  }

  /// Get the tracker API token from environment variables.
  ///
  /// Checks TASKSYNC_TRACKER_TOKEN first, then TRACKER_API_TOKEN as fallback.
  /// The token never lives in the config file.
  pub fn get_api_token() -> Result<String, SyncError> {
    std::env::var("TASKSYNC_TRACKER_TOKEN")
      .or_else(|_| std::env::var("TRACKER_API_TOKEN"))
      .map_err(|_| {
        SyncError::Config(
          "tracker API token not found; set TASKSYNC_TRACKER_TOKEN or TRACKER_API_TOKEN"
            .to_string(),
        )
      })
  }
}
