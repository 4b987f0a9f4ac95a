//! Jikan API client with client-side rate limiting.
//!
//! A request is attempted once. Retrying is the query cache's job.

use super::error::ApiError;
use super::query::{Endpoint, SearchParams};
use super::rate_limiter::RateLimiter;
use super::types::*;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Jikan API v4 client
///
/// Cheap to clone; clones share the HTTP connection pool and rate limiter.
#[derive(Clone)]
pub struct JikanClient {
    /// HTTP client
    client: Client,
    /// Base URL for Jikan API
    base_url: String,
    /// Rate limiter
    rate_limiter: Arc<RateLimiter>,
}

impl JikanClient {
    /// Create a new Jikan client
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
        rate_limiter: RateLimiter,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(rate_limiter),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a GET request for an endpoint and decode the body
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint.path_and_query());

        self.rate_limiter.acquire().await;

        debug!(url = %url, "Making API request");

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Request error");
            ApiError::from(e)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to read response body");
            ApiError::from(e)
        })?;

        if !status.is_success() {
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!(url = %url, "Rate limited by server");
            } else {
                warn!(url = %url, status = %status, error = %body, "Request failed");
            }
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!(url = %url, error = %e, "Failed to parse response");
            ApiError::Parse(e.to_string())
        })
    }

    /// Search or filter the manga catalogue
    pub async fn search_manga(&self, params: &SearchParams) -> Result<MangaPage, ApiError> {
        info!(query = ?params.query_text(), genres = ?params.genres, "Searching manga");
        self.get(&Endpoint::SearchManga(params.clone())).await
    }

    /// Fetch full manga details by MAL ID
    pub async fn manga_details(&self, mal_id: u32) -> Result<MangaDetails, ApiError> {
        info!(mal_id = mal_id, "Fetching manga details");
        let response: DataResponse<MangaDetails> = self.get(&Endpoint::MangaFull(mal_id)).await?;
        Ok(response.data)
    }

    /// Fetch the top manga list
    pub async fn top_manga(&self, limit: Option<u32>) -> Result<MangaPage, ApiError> {
        info!(limit = ?limit, "Fetching top manga");
        self.get(&Endpoint::TopManga { limit }).await
    }

    /// Fetch all manga genres
    pub async fn manga_genres(&self) -> Result<Vec<Genre>, ApiError> {
        info!("Fetching manga genres");
        let response: DataResponse<Vec<Genre>> = self.get(&Endpoint::MangaGenres).await?;
        Ok(response.data)
    }

    /// Requests made in the last minute
    pub async fn rate_limit_stats(&self) -> usize {
        self.rate_limiter.current_minute_count().await
    }
}

/// Jikan error bodies carry a `message` field; fall back to the status text
fn error_message(body: &str, status: StatusCode) -> String {
    #[derive(serde::Deserialize)]
    struct JikanErrorBody {
        message: Option<String>,
    }

    serde_json::from_str::<JikanErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        })
}
