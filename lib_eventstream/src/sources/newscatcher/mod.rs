//! # Newscatcher Events API Integration Module
//!
//! ## Contained Modules:
//!
//! - **`apicall`**: the typed client (search, lookup by id, health).
//! - **`transform`**: the default raw item to [`NormalizedEvent`](crate::core::NormalizedEvent)
//!   mapping for fundraising events.

pub mod apicall;
pub mod transform;

pub use apicall::{NewscatcherClient, TransformFn};
pub use transform::transform_fundraising;
