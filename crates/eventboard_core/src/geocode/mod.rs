//! Geocoding provider contracts.
//!
//! # Responsibility
//! - Define the provider SPI used to resolve addresses into coordinates.
//! - Normalize provider answers so callers never trust a bare invocation.
//!
//! # Invariants
//! - A lookup only counts as resolved when `success` is set and both
//!   coordinates are finite and inside WGS84 bounds.
//! - Providers are `Send + Sync` so chains can be shared behind `Arc`.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod multi;
pub mod table;

pub use multi::{GeocoderChainError, MultiGeocoder};
pub use table::{TableError, TableGeocoder};

pub type GeocodeResult<T> = Result<T, GeocodeError>;

/// Provider transport or runtime failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeocodeError {
    /// Provider could not be reached.
    Unavailable { provider: String, message: String },
    /// Provider answered with something that is not a location.
    InvalidResponse { provider: String, message: String },
}

impl GeocodeError {
    pub fn provider(&self) -> &str {
        match self {
            Self::Unavailable { provider, .. } | Self::InvalidResponse { provider, .. } => provider,
        }
    }

    /// Stable machine-readable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "provider_unavailable",
            Self::InvalidResponse { .. } => "provider_invalid_response",
        }
    }
}

impl Display for GeocodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { provider, message } => {
                write!(f, "geocoder `{provider}` unavailable: {message}")
            }
            Self::InvalidResponse { provider, message } => {
                write!(f, "geocoder `{provider}` returned an invalid response: {message}")
            }
        }
    }
}

impl Error for GeocodeError {}

/// Provider answer for one address.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeoLocation {
    pub success: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl GeoLocation {
    /// Successful lookup.
    pub fn found(lat: f64, lng: f64) -> Self {
        Self {
            success: true,
            lat: Some(lat),
            lng: Some(lng),
        }
    }

    /// Unresolvable address.
    pub fn not_found() -> Self {
        Self::default()
    }

    /// Returns `(lat, lng)` only for a trustworthy successful answer.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        if !self.success {
            return None;
        }
        let (lat, lng) = (self.lat?, self.lng?);
        let in_bounds = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        in_bounds.then_some((lat, lng))
    }
}

/// Geocoding provider SPI.
pub trait Geocoder: Send + Sync {
    /// Stable provider id (`[a-z0-9_-]+`).
    fn provider_id(&self) -> &str;

    /// Resolves one free-text address.
    fn geocode(&self, address: &str) -> GeocodeResult<GeoLocation>;
}

impl<G: Geocoder + ?Sized> Geocoder for Arc<G> {
    fn provider_id(&self) -> &str {
        (**self).provider_id()
    }

    fn geocode(&self, address: &str) -> GeocodeResult<GeoLocation> {
        (**self).geocode(address)
    }
}

impl<G: Geocoder + ?Sized> Geocoder for Box<G> {
    fn provider_id(&self) -> &str {
        (**self).provider_id()
    }

    fn geocode(&self, address: &str) -> GeocodeResult<GeoLocation> {
        (**self).geocode(address)
    }
}

pub(crate) fn is_valid_provider_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
