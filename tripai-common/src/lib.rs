//! # TripAI Common Library
//!
//! Shared code for the TripAI client-side services including:
//! - Landmark journal and pending-queue data model
//! - Event types (SyncEvent) and the EventBus
//! - Configuration loading and root folder resolution
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use models::{LandmarkDetails, LandmarkRecord, PendingItem, RecordState};
