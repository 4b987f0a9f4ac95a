//! Manga Finder CLI application.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use manga_finder::api::{
    CategoryId, MangaDetails, MangaPage, MangaType, OrderBy, Pagination, PublishingStatus,
    SearchParams, SortDirection,
};
use manga_finder::finder::HOME_PREVIEW_LIMIT;
use manga_finder::{
    view, Debouncer, FinderSettings, Freshness, GenreFilters, JikanClient, LoadEvent,
    MangaFinder, QueryCache, QueryState, RateLimiter, RetryPolicy,
};
use shared::Config;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Search and browse manga from MyAnimeList", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging on stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Landing screen with a top-4 preview
    Home,

    /// Search titles by keyword and filters
    Search {
        /// Search text
        text: Vec<String>,

        #[command(flatten)]
        filters: SearchArgs,
    },

    /// Most popular manga
    Popular {
        /// Number of titles
        #[arg(long)]
        limit: Option<u32>,
    },

    /// List genres, optionally loading a preview of each
    Genres {
        /// Load every genre's top titles, one genre at a time
        #[arg(long)]
        preview: bool,

        /// Titles printed per genre preview
        #[arg(long, default_value_t = 5)]
        shown: usize,
    },

    /// Titles in one genre
    Genre {
        /// Genre id (see `genres`)
        id: CategoryId,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, value_enum)]
        status: Option<PublishingStatus>,

        #[arg(long = "type", value_enum)]
        manga_type: Option<MangaType>,

        #[arg(long, value_enum, default_value_t = OrderBy::Score)]
        order_by: OrderBy,

        #[arg(long, value_enum, default_value_t = SortDirection::Desc)]
        sort: SortDirection,
    },

    /// Details for one title
    Manga {
        /// MyAnimeList manga id
        id: u32,
    },

    /// Search as you type (reads stdin; `:n`/`:p` page, `:q` quits)
    Interactive,
}

#[derive(ClapArgs, Debug)]
struct SearchArgs {
    #[arg(long)]
    page: Option<u32>,

    #[arg(long)]
    limit: Option<u32>,

    #[arg(long, value_enum)]
    order_by: Option<OrderBy>,

    #[arg(long, value_enum)]
    sort: Option<SortDirection>,

    #[arg(long, value_enum)]
    status: Option<PublishingStatus>,

    #[arg(long = "type", value_enum)]
    manga_type: Option<MangaType>,

    #[arg(long)]
    min_score: Option<f64>,

    /// Comma-separated genre ids
    #[arg(long, value_delimiter = ',')]
    genres: Vec<CategoryId>,
}

impl SearchArgs {
    fn into_params(self, text: &str) -> SearchParams {
        SearchParams {
            query: Some(text.to_string()),
            page: self.page,
            limit: self.limit,
            order_by: self.order_by,
            sort: self.sort,
            status: self.status,
            manga_type: self.manga_type,
            min_score: self.min_score,
            genres: self.genres,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        config.log_level()
    };

    shared::logging::init(shared::LogConfig {
        log_dir: config.log_dir().to_string_lossy().to_string(),
        component: "manga-finder".to_string(),
        default_level: log_level,
        console: args.verbose || config.logging.console,
        file: config.logging.file,
        json_format: config.logging.json_format,
    })?;

    info!(config_file = %args.config.display(), base_url = %config.api.base_url, "Manga Finder starting");

    // Initialize API client
    let client = JikanClient::new(
        config.api.base_url.clone(),
        Duration::from_secs(config.api.timeout_secs),
        &config.api.user_agent,
        RateLimiter::new(
            config.api.rate_limit.requests_per_second,
            config.api.rate_limit.requests_per_minute,
        ),
    )
    .context("Failed to create Jikan client")?;

    let cache = QueryCache::new(RetryPolicy {
        retries: config.cache.retries,
        delay: config.cache.retry_delay(),
    });

    let finder = Arc::new(MangaFinder::new(client, cache, finder_settings(&config)));

    match args.command.unwrap_or(Command::Home) {
        Command::Home => {
            println!("{}", view::loading());
            let top: QueryState<MangaPage> = finder.top(Some(HOME_PREVIEW_LIMIT)).await.into();
            print!("{}", view::home(&top));
        }
        Command::Search { text, filters } => {
            let term = text.join(" ");
            let params = filters.into_params(&term);
            println!("{}", view::loading());
            let state: QueryState<Option<MangaPage>> = finder.search(&params).await.into();
            println!("{}", view::search_results(&term, &state));
        }
        Command::Popular { limit } => {
            println!("{}", view::loading());
            let state: QueryState<MangaPage> = finder.top(limit).await.into();
            println!("Most Popular Manga\n");
            println!(
                "{}",
                view::render_state(&state, "popular manga", |page| view::ranked_list(&page.data))
            );
        }
        Command::Genres { preview, shown } => {
            run_genres(Arc::clone(&finder), preview, shown).await?;
        }
        Command::Genre {
            id,
            page,
            status,
            manga_type,
            order_by,
            sort,
        } => {
            let filters = GenreFilters {
                status,
                manga_type,
                order_by,
                sort,
            };
            println!("{}", view::loading());
            // The name is decoration; the listing still renders without it
            let genre = finder.genre(id).await.unwrap_or_else(|e| {
                warn!(genre = id, error = %e, "Failed to load genre name");
                None
            });
            let state: QueryState<MangaPage> = finder.genre_page(id, page, &filters).await.into();
            println!(
                "{}",
                view::render_state(&state, "manga", |listing| {
                    view::genre_page(genre.as_ref(), page.max(1), listing)
                })
            );
        }
        Command::Manga { id } => {
            println!("{}", view::loading());
            let state: QueryState<MangaDetails> = finder.details(id).await.into();
            println!(
                "{}",
                view::render_state(&state, "manga details", view::details)
            );
        }
        Command::Interactive => {
            run_interactive(&finder, Duration::from_millis(config.search.debounce_ms)).await?;
        }
    }

    let stats = finder.cache().stats().await;
    info!(
        entries = stats.entries,
        failed = stats.failed,
        requests_last_minute = finder.client().rate_limit_stats().await,
        "Manga Finder finished"
    );

    Ok(())
}

fn finder_settings(config: &Config) -> FinderSettings {
    FinderSettings {
        freshness: Freshness {
            genres: config.cache.genres_freshness(),
            default: config.cache.default_freshness(),
        },
        page_size: config.genre.page_size,
        loader_delay: Duration::from_millis(config.loader.delay_ms),
        preview_limit: config.loader.preview_limit,
    }
}

/// Genre list, then optionally the sequential preview sweep.
///
/// Ctrl-C cancels the sweep; previews already printed stay valid.
async fn run_genres(finder: Arc<MangaFinder>, preview: bool, shown: usize) -> Result<()> {
    println!("{}", view::loading());
    let genres = match finder.genres().await {
        Ok(genres) => genres,
        Err(e) => {
            warn!(error = %e, "Failed to load genres");
            let failed: QueryState<()> = QueryState::Failed(e);
            println!("{}", view::render_state(&failed, "genres", |_| String::new()));
            return Ok(());
        }
    };

    println!("Browse by Genre\n");
    print!("{}", view::genre_list(&genres));

    if !preview {
        return Ok(());
    }

    let names: HashMap<CategoryId, String> =
        genres.into_iter().map(|g| (g.mal_id, g.name)).collect();

    println!("\nLoading previews (Ctrl-C to stop)...\n");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let loader = finder.genre_loader().with_events(tx);
    let cancel = CancellationToken::new();

    // The task owns the loader, so the event channel closes when it ends
    let sweep = {
        let finder = Arc::clone(&finder);
        let cancel = cancel.clone();
        tokio::spawn(async move { finder.load_genre_previews(&loader, &cancel).await })
    };

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(LoadEvent::Loaded { genre, entries }) => {
                    let name = names.get(&genre).map(String::as_str).unwrap_or("?");
                    print!("{}", view::genre_preview(name, &entries, shown));
                }
                Some(LoadEvent::Failed { genre, .. }) => {
                    let name = names.get(&genre).map(String::as_str).unwrap_or("?");
                    println!("== {} ==\n    Failed to load titles. Please try again.", name);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                info!("Interrupted, stopping genre preview sweep");
                cancel.cancel();
            }
        }
    }

    let stats = sweep
        .await
        .context("Genre preview task panicked")?
        .context("Failed to load genre previews")?;

    println!(
        "\nLoaded {} genres, {} failed{}",
        stats.loaded,
        stats.failed,
        if stats.cancelled { " (stopped early)" } else { "" }
    );

    Ok(())
}

/// Debounced search loop over stdin lines
async fn run_interactive(finder: &MangaFinder, debounce: Duration) -> Result<()> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut debouncer = Debouncer::new(rx, debounce);
    let mut params = SearchParams::default();
    let mut pagination: Option<Pagination> = None;

    println!("Type to search. :n next page, :p previous page, :q quit.");

    while let Some(input) = debouncer.next().await {
        let current = params.page.unwrap_or(1);
        match input.trim() {
            ":q" => break,
            ":n" | ":p" => {
                let Some(pager) = pagination.as_ref() else {
                    continue;
                };
                let target = if input.trim() == ":n" {
                    pager.next_page(current)
                } else {
                    pager.prev_page(current)
                };
                if target == current {
                    continue;
                }
                params.page = Some(target);
            }
            text => {
                params = SearchParams::text(text);
                pagination = None;
            }
        }

        println!("{}", view::loading());
        let state: QueryState<Option<MangaPage>> = finder.search(&params).await.into();
        if let QueryState::Ready(Some(page)) = &state {
            pagination = page.pagination.clone();
        }

        let term = params.query_text().unwrap_or_default().to_string();
        println!("{}", view::search_results(&term, &state));
    }

    Ok(())
}
