//! # lib_eventstream
//!
//! Polling, caching and filtered fan-out engine for upstream event feeds.
//!
//! The crate is organised in folder modules:
//!
//! - **`configs`**: the engine configuration with its defaults.
//! - **`core`**: the building blocks shared by everything else (event model,
//!   TTL cache, event buffer, filters, sinks and the subscriber registry).
//! - **`retrieve`**: the resilient HTTP client (retry, backoff, response cache).
//! - **`sources`**: provider-specific clients and their transform functions.
//! - **`ingestors`**: the poller that drives refresh and fan-out.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod configs;
pub mod core;
pub mod ingestors;
pub mod retrieve;
pub mod sources;

// Re-export the types most callers need.
pub use crate::configs::{ConfigError, EngineConfig};
pub use crate::core::{
    ClientId, EventFilter, EventKind, EventSink, NormalizedEvent, Severity, SinkError,
    SubscriberRegistry, TtlCache,
};
pub use crate::ingestors::{ConfiguredFeed, EventSource, EventsPoller, PollerNotice, PollerState};
pub use crate::retrieve::ky_http::{ApiClient, ClientOptions, RetryPolicy, UpstreamError};
pub use crate::sources::newscatcher::{NewscatcherClient, TransformFn};
