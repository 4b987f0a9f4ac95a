//! Text renderers for the CLI screens.
//!
//! Pure functions from data to `String`; the binary decides where to print.

use crate::api::{Genre, MalEntity, MangaDetails, MangaEntry, MangaPage, Pagination};
use crate::cache::QueryState;
use std::fmt::Write;

const SYNOPSIS_WIDTH: usize = 220;

/// Render a query's tri-state: loading line, generic failure, or the data
pub fn render_state<T>(state: &QueryState<T>, what: &str, render: impl Fn(&T) -> String) -> String {
    match state {
        QueryState::Idle => String::new(),
        QueryState::Loading => "Loading...".to_string(),
        QueryState::Failed(_) => format!("Failed to load {}. Please try again.", what),
        QueryState::Ready(data) => render(data),
    }
}

/// Shown while a screen's data is being fetched
pub fn loading() -> String {
    render_state(&QueryState::<()>::Loading, "", |_| String::new())
}

/// Home screen: top preview plus the available commands
pub fn home(top: &QueryState<MangaPage>) -> String {
    let mut out = String::from("Manga Finder\n\nTop manga right now:\n");
    out.push_str(&render_state(top, "top manga", |page| ranked_list(&page.data)));
    out.push_str(
        "\nCommands:\n  \
         search <text>   search titles\n  \
         popular         most popular manga\n  \
         genres          browse by genre\n  \
         genre <id>      titles in one genre\n  \
         manga <id>      details for one title\n  \
         interactive     search as you type\n",
    );
    out
}

/// Search screen body for a settled search term
pub fn search_results(term: &str, state: &QueryState<Option<MangaPage>>) -> String {
    render_state(state, "manga", |result| match result {
        None => "Type something to search.".to_string(),
        Some(page) if page.data.is_empty() => format!("No manga found for \"{}\".", term),
        Some(page) => {
            let mut out = manga_grid(&page.data);
            if let Some(pagination) = &page.pagination {
                out.push_str(&pagination_line(
                    pagination.current_page.unwrap_or(1),
                    pagination,
                ));
            }
            out
        }
    })
}

/// Card list: title, chapters, score and a clipped synopsis
pub fn manga_grid(entries: &[MangaEntry]) -> String {
    let mut out = String::new();
    for manga in entries {
        let _ = writeln!(out, "[{}] {}", manga.mal_id, manga.title);
        let _ = writeln!(
            out,
            "    Chapters: {}  Score: {}  {}",
            chapters(manga.chapters),
            score(manga.score),
            manga.manga_type.as_deref().unwrap_or("")
        );
        if let Some(synopsis) = manga.synopsis.as_deref() {
            let _ = writeln!(out, "    {}", clip(synopsis, SYNOPSIS_WIDTH));
        }
    }
    out
}

/// Popular screen: rank, score, members and up to three genres
pub fn ranked_list(entries: &[MangaEntry]) -> String {
    let mut out = String::new();
    for (idx, manga) in entries.iter().enumerate() {
        let genres: Vec<&str> = manga.genres.iter().take(3).map(|g| g.name.as_str()).collect();
        let _ = writeln!(
            out,
            "#{:<3} {}  [{}]",
            idx + 1,
            manga.title,
            manga.mal_id
        );
        let _ = writeln!(
            out,
            "     Score: {}  {} members  {}",
            score(manga.score),
            manga.members.map(thousands).unwrap_or_else(|| "?".to_string()),
            genres.join(", ")
        );
    }
    out
}

/// Genre list with title counts
pub fn genre_list(genres: &[Genre]) -> String {
    let mut out = String::new();
    for genre in genres {
        let _ = writeln!(out, "{:>4}  {} ({})", genre.mal_id, genre.name, thousands(genre.count));
    }
    out
}

/// One genre's preview as the batch loader delivers it
pub fn genre_preview(name: &str, entries: &[MangaEntry], shown: usize) -> String {
    let mut out = format!("== {} ==\n", name);
    if entries.is_empty() {
        out.push_str("    (no titles)\n");
    }
    for manga in entries.iter().take(shown) {
        let _ = writeln!(out, "    {}  {}", score(manga.score), manga.title);
    }
    out
}

/// Genre listing screen: header, cards, pager
pub fn genre_page(genre: Option<&Genre>, current_page: u32, page: &MangaPage) -> String {
    let name = genre.map(|g| g.name.as_str()).unwrap_or("Unknown genre");
    let mut out = match page.pagination.as_ref().and_then(Pagination::total_items) {
        Some(total) => format!("{} ({} manga)\n\n", name, thousands(total)),
        None => format!("{}\n\n", name),
    };

    if page.data.is_empty() {
        out.push_str("No manga found.\n");
    } else {
        out.push_str(&manga_grid(&page.data));
    }

    if let Some(pagination) = &page.pagination {
        out.push_str(&pagination_line(current_page, pagination));
    }
    out
}

/// "Page x of y", only when there is more than one page
pub fn pagination_line(current_page: u32, pagination: &Pagination) -> String {
    if pagination.last_visible_page > 1 {
        format!("\nPage {} of {}\n", current_page, pagination.last_visible_page)
    } else {
        String::new()
    }
}

/// Detail screen
pub fn details(manga: &MangaDetails) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", manga.title);
    if let Some(japanese) = manga.title_japanese.as_deref() {
        let _ = writeln!(out, "{}", japanese);
    }
    if let Some(english) = manga.title_english.as_deref() {
        let _ = writeln!(out, "English: {}", english);
    }
    out.push('\n');

    let published = manga
        .published
        .as_ref()
        .and_then(|p| {
            p.string
                .clone()
                .or_else(|| p.from_date().map(|d| d.format("%b %-d, %Y").to_string()))
        })
        .unwrap_or_else(|| "N/A".to_string());

    let _ = writeln!(out, "Score:     {}", score(manga.score));
    let _ = writeln!(out, "Chapters:  {}", chapters(manga.chapters));
    let _ = writeln!(out, "Published: {}", published);
    let _ = writeln!(
        out,
        "Members:   {}",
        manga.members.map(thousands).unwrap_or_else(|| "N/A".to_string())
    );
    if let Some(status) = manga.status.as_deref() {
        let _ = writeln!(out, "Status:    {}", status);
    }

    if !manga.genres.is_empty() {
        let _ = writeln!(out, "Genres:    {}", names(&manga.genres));
    }
    if !manga.authors.is_empty() {
        let _ = writeln!(out, "Authors:   {}", names(&manga.authors));
    }
    if !manga.serializations.is_empty() {
        let _ = writeln!(out, "Magazine:  {}", names(&manga.serializations));
    }

    if let Some(synopsis) = manga.synopsis.as_deref() {
        let _ = write!(out, "\nSynopsis\n{}\n", synopsis);
    }
    out
}

fn names(entities: &[MalEntity]) -> String {
    entities
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn chapters(chapters: Option<u32>) -> String {
    chapters
        .map(|c| c.to_string())
        .unwrap_or_else(|| "Ongoing".to_string())
}

fn score(score: Option<f64>) -> String {
    score
        .map(|s| format!("{:.2}", s))
        .unwrap_or_else(|| "N/A".to_string())
}

/// 1234567 -> "1,234,567"
pub fn thousands(n: u32) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Clip to `width` characters on a char boundary, adding an ellipsis
fn clip(text: &str, width: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= width {
        return flat;
    }
    let clipped: String = flat.chars().take(width).collect();
    format!("{}...", clipped.trim_end())
}
