//! # Data Retrieval Module
//!
//! Generic HTTP plumbing shared by every provider client: request building,
//! per-endpoint timeouts, retry with capped exponential backoff, error
//! classification and the response cache.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: the [`ApiClient`](ky_http::ApiClient) built on `reqwest`.
//!   Provider clients (see `sources`) wrap it and only deal with payloads.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Resilient HTTP client with retry, backoff and response caching.
pub mod ky_http;
