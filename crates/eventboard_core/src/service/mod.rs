//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and geocoder calls into use-case level APIs.
//! - Keep CLI callers decoupled from storage details.

pub mod event_service;
