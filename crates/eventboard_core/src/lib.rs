//! Core domain logic for eventboard.
//! This crate is the single source of truth for event invariants.

pub mod config;
pub mod db;
pub mod geocode;
pub mod logging;
pub mod markup;
pub mod model;
pub mod repo;
pub mod scope;
pub mod service;

pub use config::{ConfigError, CoreConfig, GeocoderConfig};
pub use geocode::{
    GeoLocation, GeocodeError, GeocodeResult, Geocoder, GeocoderChainError, MultiGeocoder,
    TableError, TableGeocoder,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use markup::MarkupError;
pub use model::event::{
    Event, EventField, EventId, EventValidationError, FieldError, FieldErrorKind, Recurrence,
};
pub use repo::event_repo::{EventRepository, RepoError, RepoResult, SqliteEventRepository};
pub use scope::{EventQuery, ScopeStep, SortOrder, DEFAULT_NEXT_LIMIT};
pub use service::event_service::{
    Clock, EventService, EventServiceError, FixedClock, GeocodeStatus, SaveReport, SystemClock,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
