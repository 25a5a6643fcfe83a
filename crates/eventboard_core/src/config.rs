//! Core configuration.
//!
//! # Responsibility
//! - Load JSON configuration for storage, logging and geocoding.
//! - Turn configuration into ready-to-use collaborators.
//!
//! # Invariants
//! - A loaded config has passed [`CoreConfig::validate`].
//! - Relative paths in a config file resolve against the file's directory.
//!
//! Example:
//!
//! ```json
//! {
//!   "db_path": "events.db",
//!   "log_level": "info",
//!   "log_dir": "/var/log/eventboard",
//!   "geocoder": { "tables": ["addresses.json"] }
//! }
//! ```

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::geocode::{GeocoderChainError, MultiGeocoder, TableError, TableGeocoder};
use crate::logging::{default_log_level, normalize_level};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Configuration loading/usage errors.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Json(serde_json::Error),
    Invalid(String),
    GeocoderTable { path: PathBuf, source: TableError },
    GeocoderChain(GeocoderChainError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Json(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
            Self::GeocoderTable { path, source } => {
                write!(f, "geocoder table `{}`: {source}", path.display())
            }
            Self::GeocoderChain(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(err) => Some(err),
            Self::Invalid(_) => None,
            Self::GeocoderTable { source, .. } => Some(source),
            Self::GeocoderChain(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<GeocoderChainError> for ConfigError {
    fn from(value: GeocoderChainError) -> Self {
        Self::GeocoderChain(value)
    }
}

/// Geocoding section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeocoderConfig {
    /// Address tables tried in order; see [`TableGeocoder`].
    pub tables: Vec<PathBuf>,
}

/// Top-level core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Database file; `None` keeps the store in memory.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    /// Log directory; `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    pub geocoder: GeocoderConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            geocoder: GeocoderConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Reads, parses and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_json_str(&json)?;
        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        let base = if parent.is_absolute() {
            parent.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?
                .join(parent)
        };
        config.resolve_relative_to(&base);
        Ok(config)
    }

    /// Parses and validates a config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value-level rules serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_level(&self.log_level).map_err(|err| ConfigError::Invalid(err.to_string()))?;

        if let Some(log_dir) = &self.log_dir {
            if log_dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("log_dir cannot be empty".to_string()));
            }
        }
        if let Some(db_path) = &self.db_path {
            if db_path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("db_path cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Makes relative paths absolute against `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        if let Some(db_path) = self.db_path.as_mut() {
            resolve(db_path);
        }
        if let Some(log_dir) = self.log_dir.as_mut() {
            resolve(log_dir);
        }
        self.geocoder.tables.iter_mut().for_each(resolve);
    }

    /// Opens the configured store with migrations applied.
    pub fn open_database(&self) -> DbResult<Connection> {
        match &self.db_path {
            Some(path) => open_db(path),
            None => open_db_in_memory(),
        }
    }

    /// Builds the geocoder chain from the configured tables.
    ///
    /// Tables are registered as `table_0`, `table_1`, ... in file order.
    pub fn build_geocoder(&self) -> Result<MultiGeocoder, ConfigError> {
        let mut chain = MultiGeocoder::new();
        for (index, path) in self.geocoder.tables.iter().enumerate() {
            let table = TableGeocoder::from_path(path)
                .and_then(|table| table.with_provider_id(format!("table_{index}")))
                .map_err(|source| ConfigError::GeocoderTable {
                    path: path.clone(),
                    source,
                })?;
            chain.register(Arc::new(table))?;
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use crate::geocode::Geocoder;
    use std::path::{Path, PathBuf};

    #[test]
    fn empty_document_uses_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert!(config.build_geocoder().unwrap().is_empty());
    }

    #[test]
    fn unknown_fields_and_bad_levels_are_rejected() {
        assert!(matches!(
            CoreConfig::from_json_str(r#"{ "dbpath": "x.db" }"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            CoreConfig::from_json_str(r#"{ "log_level": "loud" }"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let mut config = CoreConfig::from_json_str(
            r#"{ "db_path": "events.db", "log_dir": "/abs/logs", "geocoder": { "tables": ["a.json"] } }"#,
        )
        .unwrap();
        config.resolve_relative_to(Path::new("/etc/eventboard"));

        assert_eq!(
            config.db_path,
            Some(PathBuf::from("/etc/eventboard/events.db"))
        );
        assert_eq!(config.log_dir, Some(PathBuf::from("/abs/logs")));
        assert_eq!(
            config.geocoder.tables,
            vec![PathBuf::from("/etc/eventboard/a.json")]
        );
    }

    #[test]
    fn load_builds_geocoder_from_tables_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("addresses.json"),
            r#"[{ "address": "Boston, MA, 02114", "lat": 42.356004, "lng": -71.061619 }]"#,
        )
        .unwrap();
        let config_path = dir.path().join("eventboard.json");
        std::fs::write(
            &config_path,
            r#"{ "geocoder": { "tables": ["addresses.json"] } }"#,
        )
        .unwrap();

        let config = CoreConfig::load(&config_path).unwrap();
        let geocoder = config.build_geocoder().unwrap();

        assert_eq!(geocoder.provider_ids(), vec!["table_0".to_string()]);
        let location = geocoder.geocode("Boston, MA, 02114").unwrap();
        assert_eq!(location.coordinates(), Some((42.356004, -71.061619)));
    }

    #[test]
    fn missing_table_reports_its_path() {
        let config = CoreConfig {
            geocoder: super::GeocoderConfig {
                tables: vec![PathBuf::from("/definitely/missing.json")],
            },
            ..CoreConfig::default()
        };

        match config.build_geocoder() {
            Err(ConfigError::GeocoderTable { path, .. }) => {
                assert_eq!(path, PathBuf::from("/definitely/missing.json"))
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected missing table error"),
        }
    }
}
