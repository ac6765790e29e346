//! # Configuration Module
//!
//! Holds the [`EngineConfig`] consumed by the upstream client and the poller.
//! Loading it from files, environment or CLI flags is the job of the binaries;
//! this module only defines the shape, the defaults and validation.

/// Engine configuration with defaults for every field.
pub mod engine_config;

pub use engine_config::{ConfigError, EngineConfig};
