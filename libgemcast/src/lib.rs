//! Gemcast - scheduled social posting for AI personas
//!
//! This library provides the core of Gemcast: Gems (personas) and their
//! schedules, the due-ness evaluator, the caption/image generation pipeline,
//! multi-platform publication and the poll loop that ties them together.

pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod logging;
pub mod platforms;
pub mod poll;
pub mod poster;
pub mod scheduling;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{GemcastError, Result};
pub use store::{GemStore, JobStore, MemoryStore};
pub use types::{
    Gem, GemFile, GeneratedArtifact, JobUpdate, PublicationResult, Recurrence, ScheduledJob,
};
