//! Jikan API v4 client implementation.
//!
//! This module provides a rate-limited client for the manga endpoints of
//! the Jikan API (MyAnimeList unofficial API), plus the request and
//! response types it speaks.

pub mod client;
pub mod error;
pub mod query;
pub mod rate_limiter;
pub mod types;

pub use client::JikanClient;
pub use error::ApiError;
pub use query::*;
pub use rate_limiter::RateLimiter;
pub use types::*;
