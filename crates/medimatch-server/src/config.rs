//! Runtime configuration, layered from an optional TOML file and
//! `MEDIMATCH_*` environment variables.
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `MEDIMATCH_AUDIT__QUEUE_CAPACITY=4096`.

use std::path::{Path, PathBuf};

use medimatch_api::QueryLimits;
use medimatch_engine::AuditConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:              String,
  pub port:              u16,
  pub store_path:        PathBuf,
  /// Build the correlation index in the background right after startup.
  pub rebuild_on_start:  bool,
  /// Rows per ingestion transaction for `medimatch import`.
  pub import_batch_size: usize,
  pub limits:            QueryLimits,
  pub audit:             AuditConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:              "127.0.0.1".into(),
      port:              8080,
      store_path:        PathBuf::from("medimatch.db"),
      rebuild_on_start:  true,
      import_batch_size: 5000,
      limits:            QueryLimits::default(),
      audit:             AuditConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Read `path` (if it exists) and the environment on top of the defaults.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("MEDIMATCH")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  /// `store_path` with a leading `~` expanded to the home directory.
  pub fn resolved_store_path(&self) -> PathBuf {
    let s = self.store_path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.store_path.clone()
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ServerConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(cfg.port, 8080);
    assert!(cfg.rebuild_on_start);
    assert_eq!(cfg.audit.queue_capacity, AuditConfig::default().queue_capacity);
  }

  #[test]
  fn file_overrides_nested_sections() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
      file,
      r#"
port = 9090
store_path = "/var/lib/medimatch/catalog.db"
rebuild_on_start = false

[audit]
queue_capacity = 16

[limits]
correlations = 25
"#
    )
    .unwrap();

    let cfg = ServerConfig::load(file.path()).unwrap();
    assert_eq!(cfg.port, 9090);
    assert!(!cfg.rebuild_on_start);
    assert_eq!(cfg.store_path, PathBuf::from("/var/lib/medimatch/catalog.db"));
    assert_eq!(cfg.audit.queue_capacity, 16);
    assert_eq!(cfg.audit.append_timeout_ms, AuditConfig::default().append_timeout_ms);
    assert_eq!(cfg.limits.correlations, 25);
    assert_eq!(cfg.limits.max_rows, QueryLimits::default().max_rows);
  }
}
