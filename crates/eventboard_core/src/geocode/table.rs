//! Offline geocoder backed by a JSON address table.
//!
//! Table file format:
//!
//! ```json
//! [
//!   { "address": "Boston, MA, 02114", "lat": 42.356004, "lng": -71.061619 }
//! ]
//! ```
//!
//! Keys are matched case-insensitively with runs of whitespace collapsed.

use super::{is_valid_provider_id, GeoLocation, GeocodeResult, Geocoder};
use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const DEFAULT_TABLE_PROVIDER_ID: &str = "table";

/// Table loading errors.
#[derive(Debug)]
pub enum TableError {
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidProviderId(String),
    InvalidEntry { address: String, reason: String },
}

impl Display for TableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read geocoder table: {err}"),
            Self::Json(err) => write!(f, "invalid geocoder table json: {err}"),
            Self::InvalidProviderId(value) => write!(f, "geocoder id is invalid: {value}"),
            Self::InvalidEntry { address, reason } => {
                write!(f, "invalid geocoder table entry `{address}`: {reason}")
            }
        }
    }
}

impl Error for TableError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::InvalidProviderId(_) | Self::InvalidEntry { .. } => None,
        }
    }
}

impl From<std::io::Error> for TableError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TableError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableEntry {
    address: String,
    lat: f64,
    lng: f64,
}

/// In-memory address table.
#[derive(Debug, Clone)]
pub struct TableGeocoder {
    provider_id: String,
    entries: HashMap<String, (f64, f64)>,
}

impl TableGeocoder {
    /// Creates an empty table with the default provider id.
    pub fn new() -> Self {
        Self {
            provider_id: DEFAULT_TABLE_PROVIDER_ID.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Renames the provider, used when several tables share one chain.
    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Result<Self, TableError> {
        let provider_id = provider_id.into();
        if !is_valid_provider_id(&provider_id) {
            return Err(TableError::InvalidProviderId(provider_id));
        }
        self.provider_id = provider_id;
        Ok(self)
    }

    /// Adds or replaces one address.
    ///
    /// # Errors
    /// - Rejects blank addresses and coordinates outside WGS84 bounds.
    pub fn insert(
        &mut self,
        address: impl Into<String>,
        lat: f64,
        lng: f64,
    ) -> Result<(), TableError> {
        let address = address.into();
        let key = normalize_address(&address);
        if key.is_empty() {
            return Err(TableError::InvalidEntry {
                address,
                reason: "address is blank".to_string(),
            });
        }
        if GeoLocation::found(lat, lng).coordinates().is_none() {
            return Err(TableError::InvalidEntry {
                address,
                reason: format!("coordinates ({lat}, {lng}) are out of range"),
            });
        }

        self.entries.insert(key, (lat, lng));
        Ok(())
    }

    /// Parses a JSON table.
    pub fn from_json_str(json: &str) -> Result<Self, TableError> {
        let entries: Vec<TableEntry> = serde_json::from_str(json)?;
        let mut table = Self::new();
        for entry in entries {
            table.insert(entry.address, entry.lat, entry.lng)?;
        }
        Ok(table)
    }

    /// Reads and parses a JSON table file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TableGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Geocoder for TableGeocoder {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn geocode(&self, address: &str) -> GeocodeResult<GeoLocation> {
        let location = self
            .entries
            .get(&normalize_address(address))
            .map_or_else(GeoLocation::not_found, |&(lat, lng)| {
                GeoLocation::found(lat, lng)
            });
        Ok(location)
    }
}

fn normalize_address(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{TableError, TableGeocoder};
    use crate::geocode::{GeoLocation, Geocoder};

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        let table = TableGeocoder::from_json_str(
            r#"[{ "address": "Boston, MA, 02114", "lat": 42.356004, "lng": -71.061619 }]"#,
        )
        .unwrap();

        let location = table.geocode("  boston,   MA, 02114 ").unwrap();
        assert_eq!(location.coordinates(), Some((42.356004, -71.061619)));
        assert_eq!(
            table.geocode("Non existent place").unwrap(),
            GeoLocation::not_found()
        );
    }

    #[test]
    fn insert_rejects_blank_and_out_of_range_entries() {
        let mut table = TableGeocoder::new();
        assert!(matches!(
            table.insert("  ", 1.0, 1.0),
            Err(TableError::InvalidEntry { .. })
        ));
        assert!(matches!(
            table.insert("Pole", 95.0, 0.0),
            Err(TableError::InvalidEntry { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn from_json_str_rejects_unknown_fields() {
        let err = TableGeocoder::from_json_str(r#"[{ "address": "x", "lat": 1, "lng": 2, "zip": "0" }]"#)
            .unwrap_err();
        assert!(matches!(err, TableError::Json(_)));
    }

    #[test]
    fn with_provider_id_validates_slug() {
        let table = TableGeocoder::new().with_provider_id("table_1").unwrap();
        assert_eq!(table.provider_id(), "table_1");
        assert!(TableGeocoder::new().with_provider_id("Table 1").is_err());
    }
}
