//! Sequential genre preview loader.
//!
//! Fetches one preview page per genre, strictly in input order, waiting a
//! fixed delay between requests so a full sweep of the genre list stays
//! under the API's per-IP rate limit. Each result is published to the query
//! cache and to an optional event channel as soon as it arrives.

use crate::api::{ApiError, CategoryId, Endpoint, MangaEntry, MangaPage, QueryKey, SearchParams};
use crate::cache::QueryCache;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-session progress of the preview sweep.
///
/// A genre is either pending or loaded, never both. Loaded genres are not
/// fetched again for the lifetime of this state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenreLoadState {
    pending: HashSet<CategoryId>,
    loaded: HashSet<CategoryId>,
    results: HashMap<CategoryId, Vec<MangaEntry>>,
}

impl GenreLoadState {
    /// Mark every id not yet loaded as pending
    pub fn enqueue(&mut self, ids: &[CategoryId]) {
        for &id in ids {
            if !self.loaded.contains(&id) {
                self.pending.insert(id);
            }
        }
    }

    /// Move `id` from pending to loaded. `None` records a failed attempt.
    pub fn complete(&mut self, id: CategoryId, entries: Option<Vec<MangaEntry>>) {
        self.pending.remove(&id);
        self.loaded.insert(id);
        if let Some(entries) = entries {
            self.results.insert(id, entries);
        }
    }

    pub fn is_loaded(&self, id: CategoryId) -> bool {
        self.loaded.contains(&id)
    }

    pub fn is_pending(&self, id: CategoryId) -> bool {
        self.pending.contains(&id)
    }

    pub fn pending(&self) -> &HashSet<CategoryId> {
        &self.pending
    }

    pub fn loaded(&self) -> &HashSet<CategoryId> {
        &self.loaded
    }

    pub fn results(&self, id: CategoryId) -> Option<&[MangaEntry]> {
        self.results.get(&id).map(Vec::as_slice)
    }

    pub fn results_by_category(&self) -> &HashMap<CategoryId, Vec<MangaEntry>> {
        &self.results
    }
}

/// Progress notification, one per attempted genre
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    Loaded {
        genre: CategoryId,
        entries: Vec<MangaEntry>,
    },
    Failed {
        genre: CategoryId,
        error: ApiError,
    },
}

/// Statistics for one loader run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub attempted: usize,
    pub loaded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Rate-limited, single-lane preview loader
pub struct GenreLoader {
    cache: QueryCache,
    state: Arc<Mutex<GenreLoadState>>,
    /// When the previous attempt settled, across runs
    last_settled: Mutex<Option<Instant>>,
    delay: Duration,
    preview_limit: u32,
    events: Option<mpsc::UnboundedSender<LoadEvent>>,
}

impl GenreLoader {
    /// Create a loader writing into `cache`
    pub fn new(cache: QueryCache, delay: Duration, preview_limit: u32) -> Self {
        Self {
            cache,
            state: Arc::new(Mutex::new(GenreLoadState::default())),
            last_settled: Mutex::new(None),
            delay,
            preview_limit,
            events: None,
        }
    }

    /// Send a [`LoadEvent`] for every attempted genre
    pub fn with_events(mut self, events: mpsc::UnboundedSender<LoadEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Request used for a genre's preview
    pub fn preview_params(&self, genre: CategoryId) -> SearchParams {
        SearchParams::genre_preview(genre, self.preview_limit)
    }

    /// Cache key a genre's preview is published under
    pub fn preview_key(&self, genre: CategoryId) -> QueryKey {
        Endpoint::SearchManga(self.preview_params(genre)).key()
    }

    /// Copy of the current load state
    pub async fn snapshot(&self) -> GenreLoadState {
        self.state.lock().await.clone()
    }

    /// Register ids as pending without fetching anything
    pub async fn seed(&self, ids: &[CategoryId]) {
        self.state.lock().await.enqueue(ids);
    }

    /// Fetch previews for `ids` in order.
    ///
    /// Genres already loaded are skipped without a request or a delay.
    /// An attempt never starts before the previous one (in this run or an
    /// earlier one) settled plus the configured delay; nothing is waited
    /// after the last one. A failed genre is recorded as loaded
    /// with no results and the sweep moves on. When `cancel` fires the loop
    /// stops at once, leaving the interrupted genre pending.
    pub async fn run<F, Fut>(
        &self,
        ids: &[CategoryId],
        fetch: F,
        cancel: &CancellationToken,
    ) -> LoaderStats
    where
        F: Fn(CategoryId) -> Fut,
        Fut: Future<Output = Result<MangaPage, ApiError>>,
    {
        self.seed(ids).await;

        let mut stats = LoaderStats::default();

        info!(
            genres = ids.len(),
            delay_ms = self.delay.as_millis() as u64,
            "Starting genre preview sweep"
        );

        for (idx, &genre) in ids.iter().enumerate() {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }

            if self.state.lock().await.is_loaded(genre) {
                debug!(genre = genre, "Genre already loaded, skipping");
                stats.skipped += 1;
                continue;
            }

            let wait = self.remaining_delay().await;
            if !wait.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        stats.cancelled = true;
                        break;
                    }
                    _ = sleep(wait) => {}
                }
            }

            info!(
                progress = format!("{}/{}", idx + 1, ids.len()),
                genre = genre,
                "Loading genre preview"
            );
            stats.attempted += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // The dropped request may still have reached the API
                    self.mark_settled().await;
                    stats.cancelled = true;
                    break;
                }
                result = fetch(genre) => result,
            };
            self.mark_settled().await;

            match result {
                Ok(page) => {
                    if let Err(e) = self.cache.set(&self.preview_key(genre), &page).await {
                        warn!(genre = genre, error = %e, "Failed to cache genre preview");
                    }
                    self.state
                        .lock()
                        .await
                        .complete(genre, Some(page.data.clone()));
                    stats.loaded += 1;
                    self.emit(LoadEvent::Loaded {
                        genre,
                        entries: page.data,
                    });
                }
                Err(e) => {
                    warn!(genre = genre, error = %e, "Failed to load genre preview");
                    self.state.lock().await.complete(genre, None);
                    stats.failed += 1;
                    self.emit(LoadEvent::Failed { genre, error: e });
                }
            }
        }

        if stats.cancelled {
            info!(
                loaded = stats.loaded,
                failed = stats.failed,
                "Genre preview sweep cancelled"
            );
        } else {
            info!(
                attempted = stats.attempted,
                loaded = stats.loaded,
                failed = stats.failed,
                skipped = stats.skipped,
                "Genre preview sweep complete"
            );
        }

        stats
    }

    /// Time left before the next attempt may start
    async fn remaining_delay(&self) -> Duration {
        match *self.last_settled.lock().await {
            Some(settled) => (settled + self.delay).saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    async fn mark_settled(&self) {
        *self.last_settled.lock().await = Some(Instant::now());
    }

    fn emit(&self, event: LoadEvent) {
        if let Some(events) = &self.events {
            // Receiver gone means nobody is rendering any more
            let _ = events.send(event);
        }
    }
}
