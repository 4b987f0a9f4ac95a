//! Data layer behind the screens.
//!
//! Binds each endpoint to its freshness window and routes every read
//! through the injected [`QueryCache`].

use crate::api::{
    ApiError, CategoryId, Endpoint, Genre, JikanClient, MangaDetails, MangaPage, MangaType,
    OrderBy, PublishingStatus, SearchParams, SortDirection,
};
use crate::cache::QueryCache;
use crate::loader::{GenreLoader, LoaderStats};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Titles shown in the home screen preview
pub const HOME_PREVIEW_LIMIT: u32 = 4;

/// Freshness windows per kind of data
#[derive(Debug, Clone, Copy)]
pub struct Freshness {
    /// Genre list, rarely changes
    pub genres: Duration,
    /// Search, detail and top lists
    pub default: Duration,
}

impl Default for Freshness {
    fn default() -> Self {
        Self {
            genres: Duration::from_secs(24 * 60 * 60),
            default: Duration::from_secs(5 * 60),
        }
    }
}

/// Filters on a genre listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenreFilters {
    pub status: Option<PublishingStatus>,
    pub manga_type: Option<MangaType>,
    pub order_by: OrderBy,
    pub sort: SortDirection,
}

/// Settings for [`MangaFinder`]
#[derive(Debug, Clone)]
pub struct FinderSettings {
    pub freshness: Freshness,
    /// Titles per page on genre listings
    pub page_size: u32,
    /// Delay between genre preview requests
    pub loader_delay: Duration,
    /// Titles per genre preview
    pub preview_limit: u32,
}

impl Default for FinderSettings {
    fn default() -> Self {
        Self {
            freshness: Freshness::default(),
            page_size: 24,
            loader_delay: Duration::from_millis(1000),
            preview_limit: 12,
        }
    }
}

/// Cached access to the manga endpoints
pub struct MangaFinder {
    client: JikanClient,
    cache: QueryCache,
    settings: FinderSettings,
}

impl MangaFinder {
    pub fn new(client: JikanClient, cache: QueryCache, settings: FinderSettings) -> Self {
        Self {
            client,
            cache,
            settings,
        }
    }

    pub fn client(&self) -> &JikanClient {
        &self.client
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn settings(&self) -> &FinderSettings {
        &self.settings
    }

    /// All manga genres
    pub async fn genres(&self) -> Result<Vec<Genre>, ApiError> {
        let client = self.client.clone();
        self.cache
            .get(
                &Endpoint::MangaGenres.key(),
                self.settings.freshness.genres,
                move || {
                    let client = client.clone();
                    async move { client.manga_genres().await }
                },
            )
            .await
    }

    /// One genre looked up in the (cached) genre list
    pub async fn genre(&self, id: CategoryId) -> Result<Option<Genre>, ApiError> {
        let genres = self.genres().await?;
        Ok(genres.into_iter().find(|g| g.mal_id == id))
    }

    /// Search the catalogue.
    ///
    /// Returns `Ok(None)` without touching the network when there is neither
    /// query text nor a filter to search by.
    pub async fn search(&self, params: &SearchParams) -> Result<Option<MangaPage>, ApiError> {
        if params.is_empty() {
            debug!("Empty search, skipping request");
            return Ok(None);
        }

        let client = self.client.clone();
        let request = params.clone();
        self.cache
            .get(
                &Endpoint::SearchManga(params.clone()).key(),
                self.settings.freshness.default,
                move || {
                    let client = client.clone();
                    let request = request.clone();
                    async move { client.search_manga(&request).await }
                },
            )
            .await
            .map(Some)
    }

    /// One page of a genre listing
    pub async fn genre_page(
        &self,
        genre: CategoryId,
        page: u32,
        filters: &GenreFilters,
    ) -> Result<MangaPage, ApiError> {
        let params = SearchParams {
            page: Some(page.max(1)),
            limit: Some(self.settings.page_size),
            order_by: Some(filters.order_by),
            sort: Some(filters.sort),
            status: filters.status,
            manga_type: filters.manga_type,
            genres: vec![genre],
            ..Default::default()
        };

        // A genre is always a filter, so the guard never trips here
        self.search(&params)
            .await
            .map(|page| page.unwrap_or_else(|| MangaPage {
                data: Vec::new(),
                pagination: None,
            }))
    }

    /// Top manga list
    pub async fn top(&self, limit: Option<u32>) -> Result<MangaPage, ApiError> {
        let client = self.client.clone();
        self.cache
            .get(
                &Endpoint::TopManga { limit }.key(),
                self.settings.freshness.default,
                move || {
                    let client = client.clone();
                    async move { client.top_manga(limit).await }
                },
            )
            .await
    }

    /// Full details for one title
    pub async fn details(&self, mal_id: u32) -> Result<MangaDetails, ApiError> {
        let client = self.client.clone();
        self.cache
            .get(
                &Endpoint::MangaFull(mal_id).key(),
                self.settings.freshness.default,
                move || {
                    let client = client.clone();
                    async move { client.manga_details(mal_id).await }
                },
            )
            .await
    }

    /// Loader publishing into this finder's cache
    pub fn genre_loader(&self) -> GenreLoader {
        GenreLoader::new(
            self.cache.clone(),
            self.settings.loader_delay,
            self.settings.preview_limit,
        )
    }

    /// Fetch the genre list, then sweep every genre's preview through
    /// `loader`. The loader's requests go straight to the client; results
    /// reach the cache through the loader's own write path.
    pub async fn load_genre_previews(
        &self,
        loader: &GenreLoader,
        cancel: &CancellationToken,
    ) -> Result<LoaderStats, ApiError> {
        let genres = self.genres().await?;
        let ids: Vec<CategoryId> = genres.iter().map(|g| g.mal_id).collect();
        loader.seed(&ids).await;

        info!(genres = ids.len(), "Loading genre previews");

        let stats = loader
            .run(
                &ids,
                |genre| {
                    let params = loader.preview_params(genre);
                    let client = self.client.clone();
                    async move { client.search_manga(&params).await }
                },
                cancel,
            )
            .await;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{QueryKey, RateLimiter};
    use std::collections::HashSet;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const GENRES_BODY: &str = r#"{"data":[
        {"mal_id":1,"name":"Action","url":"","count":10},
        {"mal_id":8,"name":"Drama","url":"","count":5}
    ]}"#;
    const PREVIEW_BODY: &str = r#"{
        "data":[{"mal_id":13,"title":"One Piece","score":9.2}],
        "pagination":{"last_visible_page":1,"has_next_page":false}
    }"#;

    /// Local Jikan stand-in: the genre list on `/genres/manga`, one preview
    /// page for anything else. Reports each request line.
    async fn jikan_stub() -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let request_line = String::from_utf8_lossy(&buf)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                let body = if request_line.contains("/genres/manga") {
                    GENRES_BODY
                } else {
                    PREVIEW_BODY
                };
                let _ = tx.send(request_line);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/v4", addr), rx)
    }

    /// Finder pointed at a port with nothing listening, so any request fails
    async fn offline_finder() -> MangaFinder {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = JikanClient::new(
            format!("http://{}/v4", addr),
            Duration::from_secs(1),
            "manga-finder-test",
            RateLimiter::new(100.0, 1000),
        )
        .unwrap();
        MangaFinder::new(client, QueryCache::default(), FinderSettings::default())
    }

    #[tokio::test]
    async fn test_empty_search_makes_no_request() {
        let finder = offline_finder().await;

        assert_eq!(finder.search(&SearchParams::default()).await, Ok(None));
        assert_eq!(finder.search(&SearchParams::text("  ")).await, Ok(None));
        assert_eq!(finder.cache().stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_cached_search_makes_no_request() {
        let finder = offline_finder().await;
        let params = SearchParams::text("berserk");
        let page = MangaPage {
            data: Vec::new(),
            pagination: None,
        };
        finder
            .cache()
            .set(&Endpoint::SearchManga(params.clone()).key(), &page)
            .await
            .unwrap();

        // The backend is unreachable, so success means no request was made
        assert_eq!(finder.search(&params).await, Ok(Some(page.clone())));
        assert_eq!(finder.search(&params).await, Ok(Some(page)));
    }

    #[tokio::test]
    async fn test_genre_lookup_uses_cached_list() {
        let finder = offline_finder().await;
        let genres = vec![
            Genre {
                mal_id: 1,
                name: "Action".to_string(),
                url: String::new(),
                count: 10,
            },
            Genre {
                mal_id: 8,
                name: "Drama".to_string(),
                url: String::new(),
                count: 5,
            },
        ];
        finder
            .cache()
            .set(&Endpoint::MangaGenres.key(), &genres)
            .await
            .unwrap();

        assert_eq!(finder.genre(8).await.unwrap().map(|g| g.name), Some("Drama".to_string()));
        assert_eq!(finder.genre(99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_genre_page_key_matches_filters() {
        let finder = offline_finder().await;
        let filters = GenreFilters {
            status: Some(PublishingStatus::Complete),
            ..Default::default()
        };
        let expected_key = QueryKey::from(
            "/manga?page=2&limit=24&order_by=score&sort=desc&status=complete&genres=1",
        );
        let page = MangaPage {
            data: Vec::new(),
            pagination: None,
        };
        finder.cache().set(&expected_key, &page).await.unwrap();

        assert_eq!(finder.genre_page(1, 2, &filters).await, Ok(page));
    }

    #[tokio::test]
    async fn test_genre_previews_land_in_cache() -> anyhow::Result<()> {
        let (base, mut requests) = jikan_stub().await;
        let client = JikanClient::new(
            base,
            Duration::from_secs(5),
            "manga-finder-test",
            RateLimiter::new(100.0, 1000),
        )?;
        let settings = FinderSettings {
            loader_delay: Duration::from_millis(20),
            ..Default::default()
        };
        let finder = MangaFinder::new(client, QueryCache::default(), settings);
        let loader = finder.genre_loader();

        let stats = finder
            .load_genre_previews(&loader, &CancellationToken::new())
            .await?;
        assert_eq!(
            stats,
            LoaderStats {
                attempted: 2,
                loaded: 2,
                failed: 0,
                skipped: 0,
                cancelled: false
            }
        );

        let state = loader.snapshot().await;
        assert_eq!(state.loaded(), &HashSet::from([1, 8]));
        assert!(state.pending().is_empty());

        let cached: Option<MangaPage> = finder.cache().peek(&loader.preview_key(8)).await;
        assert_eq!(cached.map(|page| page.data[0].mal_id), Some(13));

        // Genre list first, then one preview per genre in list order
        let mut lines = Vec::new();
        while let Ok(line) = requests.try_recv() {
            lines.push(line);
        }
        assert_eq!(
            lines,
            vec![
                "GET /v4/genres/manga HTTP/1.1".to_string(),
                "GET /v4/manga?page=1&limit=12&order_by=score&sort=desc&genres=1 HTTP/1.1"
                    .to_string(),
                "GET /v4/manga?page=1&limit=12&order_by=score&sort=desc&genres=8 HTTP/1.1"
                    .to_string(),
            ]
        );

        // A second sweep is served entirely from the load state
        let again = finder
            .load_genre_previews(&loader, &CancellationToken::new())
            .await?;
        assert_eq!(again.skipped, 2);
        assert_eq!(again.attempted, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_backend_surfaces_network_error() {
        tokio::time::pause();
        let finder = offline_finder().await;
        let err = finder.details(1).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
