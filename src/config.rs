use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::DEFAULT_TTL_HOURS;
use crate::error::FeedError;
use crate::feed::ContextName;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Named list scopes and the query parameters that select them,
  /// e.g. `brides: { gender: FEMALE }`
  #[serde(default)]
  pub contexts: BTreeMap<String, BTreeMap<String, String>>,
  pub default_context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub url: String,
  /// Applied to every fetch and favorite request
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_page_size")]
  pub page_size: u32,
  /// Relative to `url`
  #[serde(default = "default_browse_path")]
  pub browse_path: String,
  /// Relative to `url`; `{id}` is replaced with the profile id
  #[serde(default = "default_favorite_path")]
  pub favorite_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// When false, nothing is persisted and failures have no fallback
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_ttl_hours")]
  pub ttl_hours: i64,
  /// Database location (default: $XDG_DATA_HOME/profile-feed/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      ttl_hours: DEFAULT_TTL_HOURS,
      path: None,
    }
  }
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_page_size() -> u32 {
  10
}

fn default_browse_path() -> String {
  "profiles/browse".to_string()
}

fn default_favorite_path() -> String {
  "favorites/{id}".to_string()
}

fn default_true() -> bool {
  true
}

fn default_ttl_hours() -> i64 {
  DEFAULT_TTL_HOURS
}

/// Application data directory, holding the cache database and log file.
fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
  candidates.iter().find(|p| p.is_file()).cloned()
}

pub fn data_dir() -> Option<PathBuf> {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|p| p.join("profile-feed"))
}

impl Config {
  /// Load the config file.
  ///
  /// An explicit `--config` path must exist. Otherwise the first of
  /// `./profile-feed.yaml` and `$XDG_CONFIG_HOME/profile-feed/config.yaml`
  /// that exists is used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = match explicit_path {
      Some(p) if p.is_file() => p.to_path_buf(),
      Some(p) => return Err(eyre!("--config {} does not exist", p.display())),
      None => {
        let candidates = Self::search_paths();
        first_existing(&candidates).ok_or_else(|| {
          let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
          eyre!(
            "profile-feed needs a config file with at least api.url; looked in: {}",
            searched.join(", ")
          )
        })?
      }
    };

    let contents = std::fs::read_to_string(&path)
      .map_err(|e| eyre!("cannot read {}: {}", path.display(), e))?;
    Self::from_yaml(&contents).map_err(|e| eyre!("{}: {}", path.display(), e))
  }

  fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("profile-feed.yaml")];
    if let Some(config_dir) = dirs::config_dir() {
      paths.push(config_dir.join("profile-feed").join("config.yaml"));
    }
    paths
  }

  pub fn from_yaml(contents: &str) -> std::result::Result<Self, FeedError> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| FeedError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> std::result::Result<(), FeedError> {
    if self.api.page_size == 0 {
      return Err(FeedError::Config("api.page_size must be positive".to_string()));
    }
    if self.cache.ttl_hours <= 0 {
      return Err(FeedError::Config("cache.ttl_hours must be positive".to_string()));
    }
    for name in self.contexts.keys() {
      ContextName::new(name)?;
    }
    Ok(())
  }

  /// Resolve the list context to use: the explicit one, else the configured
  /// default. There is no implicit fallback to "any" context.
  pub fn resolve_context(&self, explicit: Option<&str>) -> std::result::Result<ContextName, FeedError> {
    let name = explicit
      .or(self.default_context.as_deref())
      .ok_or(FeedError::MissingContext)?;
    let context = ContextName::new(name)?;

    if !self.contexts.contains_key(context.as_str()) {
      return Err(FeedError::UnknownContext(context.to_string()));
    }
    Ok(context)
  }

  pub fn ttl(&self) -> chrono::Duration {
    chrono::Duration::hours(self.cache.ttl_hours)
  }

  pub fn timeout(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.api.timeout_secs)
  }
}
