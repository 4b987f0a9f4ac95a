//! Manga Finder library for browsing manga metadata from MyAnimeList.
//!
//! This library provides a cached, rate-limited client for the Jikan API v4,
//! a sequential genre preview loader, debounced search input and the text
//! renderers used by the `manga-finder` CLI.

pub mod api;
pub mod cache;
pub mod finder;
pub mod loader;
pub mod search;
pub mod view;

pub use api::{ApiError, JikanClient, RateLimiter};
pub use cache::{QueryCache, QueryState, RetryPolicy};
pub use finder::{FinderSettings, Freshness, GenreFilters, MangaFinder};
pub use loader::{GenreLoadState, GenreLoader, LoadEvent, LoaderStats};
pub use search::Debouncer;
