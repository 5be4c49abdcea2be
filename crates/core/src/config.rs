//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Core services never read process-wide environment variables while
//! handling a call; the binary resolves them and hands the result over as a [`CoreConfig`].

use crate::constants::{DEFAULT_BUSY_TIMEOUT, DEFAULT_DATABASE_PATH};
use crate::error::{ClinicError, ClinicResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_path: PathBuf,
    busy_timeout: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ClinicError::InvalidConfig`] if `database_path` is empty.
    pub fn new(database_path: PathBuf, busy_timeout: Duration) -> ClinicResult<Self> {
        if database_path.as_os_str().is_empty() {
            return Err(ClinicError::InvalidConfig(
                "database path cannot be empty".into(),
            ));
        }

        Ok(Self {
            database_path,
            busy_timeout,
        })
    }

    /// Configuration pointing at `database_path` with the default busy timeout.
    pub fn with_database_path(database_path: impl Into<PathBuf>) -> ClinicResult<Self> {
        Self::new(database_path.into(), DEFAULT_BUSY_TIMEOUT)
    }

    /// Loads configuration from a YAML settings file.
    ///
    /// The file has the shape:
    ///
    /// ```yaml
    /// database:
    ///   path: clinic.db
    ///   busy_timeout_ms: 5000   # optional
    /// ```
    ///
    /// A relative `path` is resolved against the directory holding the settings file.
    pub fn from_yaml_file(path: &Path) -> ClinicResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(ClinicError::ConfigRead)?;
        let settings: SettingsFile =
            serde_yaml::from_str(&contents).map_err(ClinicError::ConfigParse)?;

        let database_path = match settings.database.path {
            Some(p) if p.is_relative() => path
                .parent()
                .map(|dir| dir.join(&p))
                .unwrap_or(p),
            Some(p) => p,
            None => PathBuf::from(DEFAULT_DATABASE_PATH),
        };
        let busy_timeout = settings
            .database
            .busy_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BUSY_TIMEOUT);

        Self::new(database_path, busy_timeout)
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    database: DatabaseSettings,
}

#[derive(Debug, Deserialize)]
struct DatabaseSettings {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    busy_timeout_ms: Option<u64>,
}

/// Resolve the database path without reading environment variables.
///
/// The first non-blank candidate wins; otherwise [`DEFAULT_DATABASE_PATH`] is used.
pub fn resolve_database_path(candidates: &[Option<String>]) -> PathBuf {
    candidates
        .iter()
        .flatten()
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_rejects_empty_database_path() {
        let err = CoreConfig::new(PathBuf::new(), DEFAULT_BUSY_TIMEOUT)
            .expect_err("empty path should be rejected");
        assert!(matches!(err, ClinicError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_yaml_file_resolves_relative_path_against_file_dir() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let settings = temp_dir.path().join("clinic.yaml");
        std::fs::write(
            &settings,
            "database:\n  path: data/records.db\n  busy_timeout_ms: 250\n",
        )
        .expect("should write settings");

        let cfg = CoreConfig::from_yaml_file(&settings).expect("settings should load");
        assert_eq!(
            cfg.database_path(),
            temp_dir.path().join("data/records.db")
        );
        assert_eq!(cfg.busy_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_from_yaml_file_defaults_missing_fields() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let settings = temp_dir.path().join("clinic.yaml");
        std::fs::write(&settings, "database: {}\n").expect("should write settings");

        let cfg = CoreConfig::from_yaml_file(&settings).expect("settings should load");
        assert_eq!(cfg.database_path(), Path::new(DEFAULT_DATABASE_PATH));
        assert_eq!(cfg.busy_timeout(), DEFAULT_BUSY_TIMEOUT);
    }

    #[test]
    fn test_from_yaml_file_reports_read_and_parse_failures() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let missing = CoreConfig::from_yaml_file(&temp_dir.path().join("absent.yaml"))
            .expect_err("missing file should fail");
        assert!(matches!(missing, ClinicError::ConfigRead(_)));

        let broken = temp_dir.path().join("broken.yaml");
        std::fs::write(&broken, "database: [[[").expect("should write settings");
        let parse = CoreConfig::from_yaml_file(&broken).expect_err("broken yaml should fail");
        assert!(matches!(parse, ClinicError::ConfigParse(_)));
    }

    #[test]
    fn test_resolve_database_path_takes_first_non_blank_candidate() {
        let path = resolve_database_path(&[None, Some("  ".into()), Some("a.db".into())]);
        assert_eq!(path, PathBuf::from("a.db"));
        assert_eq!(
            resolve_database_path(&[None]),
            PathBuf::from(DEFAULT_DATABASE_PATH)
        );
    }
}
