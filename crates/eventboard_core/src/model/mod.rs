//! Domain model for calendar events.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep validation rules next to the data they constrain.
//!
//! # Invariants
//! - Every event is identified by a stable `EventId`.
//! - Coordinates are never stored as a partial pair.

pub mod event;
