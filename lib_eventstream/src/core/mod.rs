//! # Core Engine Module
//!
//! The fundamental pieces every other module builds on. They are synchronous,
//! thread-safe and free of network I/O so they can be shared between the poll
//! task and the connection handlers.
//!
//! ## Core Components:
//!
//! - **`model`**: the tagged [`NormalizedEvent`] every feed produces.
//! - **`ttl_cache`**: a generic key/value store whose entries expire, with a
//!   background sweep that reclaims keys nobody reads again.
//! - **`event_buffer`**: the bounded, newest-first buffer owned by the poller.
//! - **`filter`**: the per-subscriber [`EventFilter`] predicate.
//! - **`sink`**: wire framing and the [`EventSink`] write contract.
//! - **`registry`**: the [`SubscriberRegistry`] doing filtered broadcasts.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Bounded newest-first event store.
pub mod event_buffer;
/// Per-subscriber filter predicate.
pub mod filter;
/// Normalized event model.
pub mod model;
/// Connected subscribers and filtered broadcast.
pub mod registry;
/// Record framing and the sink write contract.
pub mod sink;
/// Generic key/value cache with expiry.
pub mod ttl_cache;

// --- Public API Re-exports ---
pub use event_buffer::EventBuffer;
pub use filter::{filter_events, AmountBucket, EventFilter};
pub use model::{EventKind, Fundraising, NormalizedEvent, Severity};
pub use registry::{ClientId, SubscriberRegistry};
pub use sink::{connection_frame, event_frame, EventSink, SinkError};
pub use ttl_cache::{CacheStats, TtlCache};
