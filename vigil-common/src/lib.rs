//! Shared types for the Vigil situational awareness system
//!
//! Provides the domain model, error type, event bus, and configuration
//! resolution used by the vigil-sa service.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
