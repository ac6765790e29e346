//! Server-side glue for the event stream binaries.

pub mod events_logic;
