//! # Event Provider Sources
//!
//! Provider-specific clients. Each one wraps the generic
//! [`ApiClient`](crate::retrieve::ky_http::ApiClient), knows the provider's
//! endpoints and response envelope, and turns raw items into
//! [`NormalizedEvent`](crate::core::NormalizedEvent)s through a transform
//! function.
//!
//! ## Contained Modules:
//!
//! - **`newscatcher`**: the Newscatcher Events API (fundraising events).

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Client and default transform for the Newscatcher Events API.
pub mod newscatcher;
