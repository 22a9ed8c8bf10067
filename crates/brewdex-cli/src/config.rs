//! Configuration file and environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use brewdex_sync::{MapConfig, QueueConfig};
use serde::Deserialize;

/// Deserialised from `brewdex.toml`, overridden by `BREWDEX_*` variables
/// (`BREWDEX_STORE_PATH`, `BREWDEX_QUEUE__BATCH_SIZE`, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub store_path: PathBuf,
  pub queue:      QueueConfig,
  pub map:        MapConfig,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("brewdex.sqlite3"),
      queue:      QueueConfig::default(),
      map:        MapConfig::default(),
    }
  }
}

impl AppConfig {
  /// Read `path` if it exists, then apply the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.to_path_buf()).required(false))
      .add_source(
        config::Environment::with_prefix("BREWDEX")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise AppConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = AppConfig::load(Path::new("/nonexistent/brewdex.toml")).unwrap();
    assert_eq!(cfg.queue, QueueConfig::default());
    assert_eq!(cfg.map.max_points, 100);
  }

  #[test]
  fn partial_tables_keep_remaining_defaults() {
    let cfg: AppConfig = config::Config::builder()
      .add_source(config::File::from_str(
        "store_path = \"catalog.db\"\n[queue]\nbatch_size = 8\n",
        config::FileFormat::Toml,
      ))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("catalog.db"));
    assert_eq!(cfg.queue.batch_size, 8);
    assert_eq!(cfg.queue.max_commit_attempts, 3);
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(
      expand_tilde(Path::new("~/brewdex.sqlite3")),
      PathBuf::from(home).join("brewdex.sqlite3")
    );
    assert_eq!(expand_tilde(Path::new("/abs/path")), PathBuf::from("/abs/path"));
  }
}
