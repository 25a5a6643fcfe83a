//! Event use-case service.
//!
//! # Responsibility
//! - Provide save/get/delete entry points and the named scopes.
//! - Run geocoding as an explicit step after every successful write.
//!
//! # Invariants
//! - Save outcome depends only on validation and persistence; geocoding
//!   misses and provider errors are absorbed and only reported.
//! - Geocoding runs at most once per save; the coordinate write that
//!   follows it never triggers another lookup.
//! - Stored coordinates always belong to the stored location: when a save
//!   changes the location and the new lookup fails, the pair is cleared.
//! - Scopes read "now" from the injected [`Clock`] once per call.

use crate::geocode::{GeocodeError, Geocoder};
use crate::model::event::{Event, EventId, EventValidationError};
use crate::repo::event_repo::{EventRepository, RepoError};
use crate::scope::EventQuery;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of the current time in epoch milliseconds.
pub trait Clock {
    fn now_epoch_ms(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
            })
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_epoch_ms(&self) -> i64 {
        self.0
    }
}

/// Service error for event use-cases.
#[derive(Debug)]
pub enum EventServiceError {
    /// Field validation failed; nothing was written.
    Validation(EventValidationError),
    /// Target event does not exist.
    NotFound(EventId),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for EventServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "event not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EventServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<RepoError> for EventServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<EventValidationError> for EventServiceError {
    fn from(value: EventValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Outcome of the geocoding step of one save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocodeStatus {
    /// Provider resolved the location; coordinates were stored.
    Resolved,
    /// Provider could not resolve the location.
    Unresolved,
    /// Provider failed; treated like `Unresolved` for the save.
    ProviderError,
}

impl GeocodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Unresolved => "unresolved",
            Self::ProviderError => "provider_error",
        }
    }
}

/// Result of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    pub id: EventId,
    /// `true` for an insert, `false` for an update.
    pub created: bool,
    pub geocode: GeocodeStatus,
}

/// Event service facade over a repository and a geocoder.
pub struct EventService<R: EventRepository, G: Geocoder, C: Clock = SystemClock> {
    repo: R,
    geocoder: G,
    clock: C,
}

impl<R: EventRepository, G: Geocoder> EventService<R, G, SystemClock> {
    /// Creates a service reading the wall clock.
    pub fn new(repo: R, geocoder: G) -> Self {
        Self::with_clock(repo, geocoder, SystemClock)
    }
}

impl<R: EventRepository, G: Geocoder, C: Clock> EventService<R, G, C> {
    /// Creates a service with an explicit clock.
    pub fn with_clock(repo: R, geocoder: G, clock: C) -> Self {
        Self {
            repo,
            geocoder,
            clock,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Validates, writes and then geocodes one event.
    ///
    /// Inserts unknown ids and updates known ones. On success `event`
    /// carries the refreshed description cache and, when resolved, the new
    /// coordinates. A failed lookup keeps existing coordinates only if the
    /// location is unchanged since the last save.
    ///
    /// # Errors
    /// - `Validation` when a required field is blank or the description is
    ///   not valid markup; nothing is written.
    /// - `Repo` when the store rejects the write.
    pub fn save(&self, event: &mut Event) -> Result<SaveReport, EventServiceError> {
        let started_at = Instant::now();

        if let Err(err) = event.validate() {
            info!(
                "event=event_save module=service status=invalid error_count={}",
                err.errors().len()
            );
            return Err(err.into());
        }
        event.refresh_description_html().map_err(|_| {
            // validate() already accepted the description.
            RepoError::InvalidData("description failed to render after validation".to_string())
        })?;

        let stored_location = self
            .repo
            .get_event(event.id)?
            .map(|stored| stored.location);
        let created = match &stored_location {
            Some(_) => {
                self.repo.update_event(event)?;
                false
            }
            None => {
                self.repo.create_event(event)?;
                true
            }
        };
        let location_changed = stored_location.as_deref() != Some(event.location.as_str());

        let geocode = self.geocode_after_save(event, location_changed)?;

        info!(
            "event=event_save module=service status=ok created={} geocode={} duration_ms={}",
            created,
            geocode.as_str(),
            started_at.elapsed().as_millis()
        );

        Ok(SaveReport {
            id: event.id,
            created,
            geocode,
        })
    }

    /// Gets one event by id.
    pub fn get(&self, id: EventId) -> Result<Option<Event>, EventServiceError> {
        Ok(self.repo.get_event(id)?)
    }

    /// Deletes one event by id.
    pub fn delete(&self, id: EventId) -> Result<(), EventServiceError> {
        self.repo.delete_event(id)?;
        info!("event=event_delete module=service status=ok");
        Ok(())
    }

    /// Runs an arbitrary scope chain.
    pub fn query(&self, query: &EventQuery) -> Result<Vec<Event>, EventServiceError> {
        Ok(self.repo.query_events(query)?)
    }

    /// Events strictly after now.
    pub fn future(&self) -> Result<Vec<Event>, EventServiceError> {
        self.query(&EventQuery::future(self.now()))
    }

    /// Events at or before now, most recent first.
    pub fn past(&self) -> Result<Vec<Event>, EventServiceError> {
        self.query(&EventQuery::past(self.now()))
    }

    /// Up to `limit` future events, soonest first.
    pub fn next(&self, limit: u32) -> Result<Vec<Event>, EventServiceError> {
        self.query(&EventQuery::next(self.now(), limit))
    }

    /// The soonest future event, as a zero- or one-element list.
    pub fn next_default(&self) -> Result<Vec<Event>, EventServiceError> {
        self.query(&EventQuery::next_default(self.now()))
    }

    pub fn recurring(&self) -> Result<Vec<Event>, EventServiceError> {
        self.query(&EventQuery::all().recurring())
    }

    pub fn special(&self) -> Result<Vec<Event>, EventServiceError> {
        self.query(&EventQuery::all().special())
    }

    pub fn next_five_special(&self) -> Result<Vec<Event>, EventServiceError> {
        self.query(&EventQuery::next_five_special(self.now()))
    }

    pub fn next_four_recurring(&self) -> Result<Vec<Event>, EventServiceError> {
        self.query(&EventQuery::next_four_recurring(self.now()))
    }

    fn now(&self) -> i64 {
        self.clock.now_epoch_ms()
    }

    fn geocode_after_save(
        &self,
        event: &mut Event,
        location_changed: bool,
    ) -> Result<GeocodeStatus, EventServiceError> {
        let status = match self.geocoder.geocode(&event.location) {
            Ok(location) => match location.coordinates() {
                Some((lat, lng)) => {
                    self.repo.update_coordinates(event.id, Some((lat, lng)))?;
                    event.set_coordinates(lat, lng);
                    return Ok(GeocodeStatus::Resolved);
                }
                None => GeocodeStatus::Unresolved,
            },
            Err(err) => {
                log_geocode_error(self.geocoder.provider_id(), &err);
                GeocodeStatus::ProviderError
            }
        };

        if location_changed && event.geocoded() {
            self.repo.update_coordinates(event.id, None)?;
            event.clear_coordinates();
            info!(
                "event=geocode module=service status=cleared reason={}",
                status.as_str()
            );
        }
        Ok(status)
    }
}

fn log_geocode_error(provider: &str, err: &GeocodeError) {
    warn!(
        "event=geocode module=service status=error provider={} error_code={}",
        provider,
        err.code()
    );
}
