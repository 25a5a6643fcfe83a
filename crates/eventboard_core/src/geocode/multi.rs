//! Ordered fallback chain over several geocoding providers.

use super::{is_valid_provider_id, GeoLocation, GeocodeError, GeocodeResult, Geocoder};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

const CHAIN_PROVIDER_ID: &str = "multi";

/// Provider registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeocoderChainError {
    InvalidProviderId(String),
    DuplicateProviderId(String),
}

impl Display for GeocoderChainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidProviderId(value) => write!(f, "geocoder id is invalid: {value}"),
            Self::DuplicateProviderId(value) => {
                write!(f, "geocoder id already registered: {value}")
            }
        }
    }
}

impl Error for GeocoderChainError {}

/// Tries providers in registration order until one resolves the address.
///
/// - First resolved answer wins.
/// - With no resolved answer, the last unsuccessful answer is returned.
/// - When every provider failed with an error, the last error is returned.
/// - An empty chain answers "not found".
#[derive(Default, Clone)]
pub struct MultiGeocoder {
    providers: Vec<Arc<dyn Geocoder>>,
    ids: BTreeSet<String>,
}

impl MultiGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one provider to the end of the chain.
    pub fn register(&mut self, provider: Arc<dyn Geocoder>) -> Result<(), GeocoderChainError> {
        let provider_id = provider.provider_id().trim().to_string();
        if !is_valid_provider_id(&provider_id) {
            return Err(GeocoderChainError::InvalidProviderId(provider_id));
        }
        if !self.ids.insert(provider_id.clone()) {
            return Err(GeocoderChainError::DuplicateProviderId(provider_id));
        }

        self.providers.push(provider);
        Ok(())
    }

    /// Builder form of [`MultiGeocoder::register`].
    pub fn with_provider(
        mut self,
        provider: impl Geocoder + 'static,
    ) -> Result<Self, GeocoderChainError> {
        self.register(Arc::new(provider))?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Returns provider ids in chain order.
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|provider| provider.provider_id().to_string())
            .collect()
    }
}

impl Geocoder for MultiGeocoder {
    fn provider_id(&self) -> &str {
        CHAIN_PROVIDER_ID
    }

    fn geocode(&self, address: &str) -> GeocodeResult<GeoLocation> {
        if address.trim().is_empty() {
            return Ok(GeoLocation::not_found());
        }

        let mut last_miss: Option<GeoLocation> = None;
        let mut last_error: Option<GeocodeError> = None;

        for provider in &self.providers {
            match provider.geocode(address) {
                Ok(location) if location.coordinates().is_some() => {
                    debug!(
                        "event=geocode_chain module=geocode status=ok provider={}",
                        provider.provider_id()
                    );
                    return Ok(location);
                }
                Ok(location) => {
                    debug!(
                        "event=geocode_chain module=geocode status=miss provider={}",
                        provider.provider_id()
                    );
                    last_miss = Some(location);
                }
                Err(err) => {
                    warn!(
                        "event=geocode_chain module=geocode status=error provider={} error_code={}",
                        provider.provider_id(),
                        err.code()
                    );
                    last_error = Some(err);
                }
            }
        }

        match (last_miss, last_error) {
            (Some(miss), _) => Ok(miss),
            (None, Some(err)) => Err(err),
            (None, None) => Ok(GeoLocation::not_found()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GeocoderChainError, MultiGeocoder};
    use crate::geocode::{GeoLocation, GeocodeError, GeocodeResult, Geocoder};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedProvider {
        id: &'static str,
        answer: GeocodeResult<GeoLocation>,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn new(id: &'static str, answer: GeocodeResult<GeoLocation>) -> Arc<Self> {
            Arc::new(Self {
                id,
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Geocoder for FixedProvider {
        fn provider_id(&self) -> &str {
            self.id
        }

        fn geocode(&self, _address: &str) -> GeocodeResult<GeoLocation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn unavailable(provider: &str) -> GeocodeError {
        GeocodeError::Unavailable {
            provider: provider.to_string(),
            message: "timeout".to_string(),
        }
    }

    #[test]
    fn first_resolved_answer_wins_and_stops_the_chain() {
        let first = FixedProvider::new("first", Err(unavailable("first")));
        let second = FixedProvider::new("second", Ok(GeoLocation::found(1.0, 2.0)));
        let third = FixedProvider::new("third", Ok(GeoLocation::found(3.0, 4.0)));

        let mut chain = MultiGeocoder::new();
        chain.register(first.clone()).unwrap();
        chain.register(second.clone()).unwrap();
        chain.register(third.clone()).unwrap();

        let location = chain.geocode("Boston").unwrap();
        assert_eq!(location.coordinates(), Some((1.0, 2.0)));
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn miss_is_preferred_over_error_when_nothing_resolves() {
        let mut chain = MultiGeocoder::new();
        chain
            .register(FixedProvider::new("miss", Ok(GeoLocation::not_found())))
            .unwrap();
        chain
            .register(FixedProvider::new("down", Err(unavailable("down"))))
            .unwrap();

        assert_eq!(chain.geocode("nowhere").unwrap(), GeoLocation::not_found());
    }

    #[test]
    fn all_errors_return_last_error() {
        let mut chain = MultiGeocoder::new();
        chain
            .register(FixedProvider::new("a", Err(unavailable("a"))))
            .unwrap();
        chain
            .register(FixedProvider::new("b", Err(unavailable("b"))))
            .unwrap();

        let err = chain.geocode("Boston").unwrap_err();
        assert_eq!(err.provider(), "b");
    }

    #[test]
    fn empty_chain_and_blank_address_are_not_found() {
        let chain = MultiGeocoder::new();
        assert!(chain.is_empty());
        assert_eq!(chain.geocode("Boston").unwrap(), GeoLocation::not_found());

        let probe = FixedProvider::new("probe", Ok(GeoLocation::found(1.0, 1.0)));
        let mut chain = MultiGeocoder::new();
        chain.register(probe.clone()).unwrap();
        assert_eq!(chain.geocode("   ").unwrap(), GeoLocation::not_found());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn register_rejects_invalid_and_duplicate_ids() {
        let mut chain = MultiGeocoder::new();
        let err = chain
            .register(FixedProvider::new("Bad Id", Ok(GeoLocation::not_found())))
            .unwrap_err();
        assert_eq!(err, GeocoderChainError::InvalidProviderId("Bad Id".to_string()));

        chain
            .register(FixedProvider::new("dup", Ok(GeoLocation::not_found())))
            .unwrap();
        let err = chain
            .register(FixedProvider::new("dup", Ok(GeoLocation::not_found())))
            .unwrap_err();
        assert_eq!(err, GeocoderChainError::DuplicateProviderId("dup".to_string()));
        assert_eq!(chain.provider_ids(), vec!["dup".to_string()]);
    }
}
