//! # Data Ingestors Module
//!
//! The feeds that produce normalized events and the poller that drives them.
//!
//! ## Contained Modules:
//! - **`feed`**: the [`EventSource`] seam, the live Newscatcher feed and the
//!   configuration-selected [`ConfiguredFeed`].
//! - **`sample_feed`**: offline fixtures replayed when no API key is set.
//! - **`events_poller`**: the [`EventsPoller`] owning the event buffer, the
//!   subscriber registry and the polling task.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Feed abstraction and the live API feed.
pub mod feed;
/// Fixture-backed feed.
pub mod sample_feed;
/// Poll loop, delta computation and subscriber fan-out.
pub mod events_poller;

// --- Public API Re-exports ---
pub use events_poller::{EventsPoller, PollerNotice, PollerSettings, PollerState};
pub use feed::{ConfiguredFeed, EventSource, NewscatcherFeed};
pub use sample_feed::SampleFeed;
