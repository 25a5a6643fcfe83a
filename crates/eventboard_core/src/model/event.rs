//! Event domain model.
//!
//! # Responsibility
//! - Define the canonical calendar event record.
//! - Own presence validation and the coordinate pair lifecycle.
//! - Hold the cached HTML rendering of the description markup.
//!
//! # Invariants
//! - `id` is stable and never nil.
//! - `title`, `date` and `location` must be present before persistence.
//! - `lat` and `lng` are either both `Some` or both `None`.
//!
//! # See also
//! - crate::markup for the description dialect.

use crate::markup::{self, CachedHtml, MarkupError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for one event.
pub type EventId = Uuid;

/// Event category.
///
/// Every event is exactly one of the two variants, so the `recurring` and
/// `special` scopes partition any event set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// Repeating event (weekly meetup, monthly social, ...).
    Recurring,
    /// One-off event.
    #[default]
    Special,
}

impl Recurrence {
    /// Storage/wire name of this category.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recurring => "recurring",
            Self::Special => "special",
        }
    }

    /// Parses a storage/wire name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "recurring" => Some(Self::Recurring),
            "special" => Some(Self::Special),
            _ => None,
        }
    }

    pub fn is_recurring(self) -> bool {
        matches!(self, Self::Recurring)
    }
}

impl Display for Recurrence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventField {
    Id,
    Title,
    Date,
    Location,
    Description,
}

impl EventField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Date => "date",
            Self::Location => "location",
            Self::Description => "description",
        }
    }
}

/// Reason one field failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// Missing, empty or whitespace-only value.
    Blank,
    /// Nil identifier.
    Nil,
    /// Description markup could not be parsed.
    InvalidMarkup(MarkupError),
}

/// One failing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: EventField,
    pub kind: FieldErrorKind,
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            FieldErrorKind::Blank => write!(f, "{} can't be blank", self.field.as_str()),
            FieldErrorKind::Nil => write!(f, "{} must not be nil", self.field.as_str()),
            FieldErrorKind::InvalidMarkup(err) => {
                write!(f, "{} is not valid markup: {err}", self.field.as_str())
            }
        }
    }
}

/// Collection of field errors produced by [`Event::validate`].
///
/// Always lists every failing field, never just the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventValidationError {
    errors: Vec<FieldError>,
}

impl EventValidationError {
    fn single(field: EventField, kind: FieldErrorKind) -> Self {
        Self {
            errors: vec![FieldError { field, kind }],
        }
    }

    /// Returns all field errors in validation order.
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Returns whether `field` failed with [`FieldErrorKind::Blank`].
    pub fn is_blank(&self, field: EventField) -> bool {
        self.errors
            .iter()
            .any(|error| error.field == field && error.kind == FieldErrorKind::Blank)
    }

    /// Returns whether any error targets `field`.
    pub fn has_field(&self, field: EventField) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }
}

impl Display for EventValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let messages = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        write!(f, "invalid event: {}", messages.join("; "))
    }
}

impl Error for EventValidationError {}

/// Canonical calendar event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventWire", into = "EventWire")]
pub struct Event {
    /// Stable ID used for persistence and lookups.
    pub id: EventId,
    pub title: String,
    /// Unix epoch milliseconds. `None` only on records that fail validation.
    pub date: Option<i64>,
    /// Free-text address, also the geocoding input.
    pub location: String,
    /// Optional description markup.
    pub description: Option<String>,
    pub recurrence: Recurrence,
    lat: Option<f64>,
    lng: Option<f64>,
    description_html: Option<CachedHtml>,
}

impl Event {
    /// Creates a special event with a generated ID and no coordinates.
    pub fn new(title: impl Into<String>, date: i64, location: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            date: Some(date),
            location: location.into(),
            description: None,
            recurrence: Recurrence::Special,
            lat: None,
            lng: None,
            description_html: None,
        }
    }

    /// Creates an event with a caller-provided ID.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(
        id: EventId,
        title: impl Into<String>,
        date: i64,
        location: impl Into<String>,
    ) -> Result<Self, EventValidationError> {
        if id.is_nil() {
            return Err(EventValidationError::single(
                EventField::Id,
                FieldErrorKind::Nil,
            ));
        }
        let mut event = Self::new(title, date, location);
        event.id = id;
        Ok(event)
    }

    /// Sets the description markup.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = recurrence;
        self
    }

    /// Validates presence and markup rules.
    ///
    /// # Errors
    /// - Returns every failing field in one [`EventValidationError`].
    pub fn validate(&self) -> Result<(), EventValidationError> {
        let mut errors = Vec::new();

        if self.id.is_nil() {
            errors.push(FieldError {
                field: EventField::Id,
                kind: FieldErrorKind::Nil,
            });
        }
        if is_blank(&self.title) {
            errors.push(FieldError {
                field: EventField::Title,
                kind: FieldErrorKind::Blank,
            });
        }
        if self.date.is_none() {
            errors.push(FieldError {
                field: EventField::Date,
                kind: FieldErrorKind::Blank,
            });
        }
        if is_blank(&self.location) {
            errors.push(FieldError {
                field: EventField::Location,
                kind: FieldErrorKind::Blank,
            });
        }
        if let Some(description) = self.description.as_deref() {
            if let Err(err) = markup::validate(description) {
                errors.push(FieldError {
                    field: EventField::Description,
                    kind: FieldErrorKind::InvalidMarkup(err),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EventValidationError { errors })
        }
    }

    /// Returns whether the event starts strictly after `now` (epoch ms).
    pub fn is_after(&self, now: i64) -> bool {
        self.date.is_some_and(|date| date > now)
    }

    pub fn lat(&self) -> Option<f64> {
        self.lat
    }

    pub fn lng(&self) -> Option<f64> {
        self.lng
    }

    /// Returns whether both coordinates are present.
    pub fn geocoded(&self) -> bool {
        self.lat.is_some() && self.lng.is_some()
    }

    /// Returns `[lat, lng]` when the event is geocoded.
    pub fn lat_lng_pair(&self) -> Option<[f64; 2]> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some([lat, lng]),
            _ => None,
        }
    }

    /// Stores a resolved coordinate pair.
    pub fn set_coordinates(&mut self, lat: f64, lng: f64) {
        self.lat = Some(lat);
        self.lng = Some(lng);
    }

    pub fn clear_coordinates(&mut self) {
        self.lat = None;
        self.lng = None;
    }

    /// Returns cached description HTML if it was rendered from the current
    /// description text.
    pub fn description_html(&self) -> Option<&str> {
        let source = self.description.as_deref()?;
        self.description_html
            .as_ref()
            .filter(|cache| cache.is_fresh_for(source))
            .map(CachedHtml::html)
    }

    /// Renders the description into the cache unless the cache is fresh.
    ///
    /// Clears the cache when the description was removed.
    ///
    /// # Errors
    /// - Returns [`MarkupError`] when the description is not valid markup;
    ///   the previous cache is dropped in that case.
    pub fn refresh_description_html(&mut self) -> Result<Option<&str>, MarkupError> {
        let Some(source) = self.description.as_deref() else {
            self.description_html = None;
            return Ok(None);
        };

        let fresh = self
            .description_html
            .as_ref()
            .is_some_and(|cache| cache.is_fresh_for(source));
        if !fresh {
            self.description_html = None;
            self.description_html = Some(CachedHtml::render(source)?);
        }

        Ok(self.description_html.as_ref().map(CachedHtml::html))
    }

    /// Rebuilds coordinate and cache state from persisted columns.
    pub(crate) fn restore_persisted(
        &mut self,
        coordinates: Option<(f64, f64)>,
        description_html: Option<String>,
    ) {
        match coordinates {
            Some((lat, lng)) => self.set_coordinates(lat, lng),
            None => self.clear_coordinates(),
        }
        self.description_html = match (self.description.as_deref(), description_html) {
            (Some(source), Some(html)) => Some(CachedHtml::from_parts(source, html)),
            _ => None,
        };
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Serialized shape of [`Event`].
///
/// Deserialization goes through this type so a partial coordinate pair is
/// rejected instead of silently accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventWire {
    id: EventId,
    title: String,
    date: Option<i64>,
    location: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    recurrence: Recurrence,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
}

impl TryFrom<EventWire> for Event {
    type Error = String;

    fn try_from(wire: EventWire) -> Result<Self, Self::Error> {
        let coordinates = match (wire.lat, wire.lng) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            (None, None) => None,
            (lat, lng) => {
                return Err(format!(
                    "lat ({lat:?}) and lng ({lng:?}) must be both set or both null"
                ));
            }
        };

        let mut event = Event {
            id: wire.id,
            title: wire.title,
            date: wire.date,
            location: wire.location,
            description: wire.description,
            recurrence: wire.recurrence,
            lat: None,
            lng: None,
            description_html: None,
        };
        event.restore_persisted(coordinates, None);
        Ok(event)
    }
}

impl From<Event> for EventWire {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            title: event.title,
            date: event.date,
            location: event.location,
            description: event.description,
            recurrence: event.recurrence,
            lat: event.lat,
            lng: event.lng,
        }
    }
}
