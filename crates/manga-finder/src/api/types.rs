//! Jikan API v4 response types.
//!
//! These types represent the JSON responses from the manga endpoints. The
//! remote shape is trusted but optional fields default when missing.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// Numeric MyAnimeList genre id
pub type CategoryId = u32;

/// Generic pagination wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// Simple data wrapper (without pagination)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// A page of manga list entries
pub type MangaPage = PaginatedResponse<MangaEntry>;

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub last_visible_page: u32,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub items: Option<PaginationItems>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationItems {
    #[serde(default)]
    pub count: u32,
    pub total: u32,
    #[serde(default)]
    pub per_page: u32,
}

impl Pagination {
    /// Page after `page`, clamped to the last visible page
    pub fn next_page(&self, page: u32) -> u32 {
        page.saturating_add(1).min(self.last_visible_page.max(1))
    }

    /// Page before `page`, never below 1
    pub fn prev_page(&self, page: u32) -> u32 {
        page.saturating_sub(1).max(1)
    }

    pub fn total_items(&self) -> Option<u32> {
        self.items.as_ref().map(|i| i.total)
    }
}

/// Manga genre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub mal_id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub count: u32,
}

/// Manga list entry (search results, top lists, genre listings)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaEntry {
    pub mal_id: u32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub images: MangaImages,
    pub title: String,
    #[serde(default)]
    pub title_english: Option<String>,
    #[serde(default)]
    pub title_japanese: Option<String>,
    #[serde(rename = "type", default)]
    pub manga_type: Option<String>,
    #[serde(default)]
    pub chapters: Option<u32>,
    #[serde(default)]
    pub volumes: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub publishing: bool,
    #[serde(default)]
    pub published: Option<Published>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub scored_by: Option<u32>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub members: Option<u32>,
    #[serde(default)]
    pub favorites: Option<u32>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub authors: Vec<MalEntity>,
    #[serde(default)]
    pub genres: Vec<MalEntity>,
}

/// Full manga details (`/manga/{id}/full`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaDetails {
    pub mal_id: u32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub images: MangaImages,

    // Titles
    pub title: String,
    #[serde(default)]
    pub title_english: Option<String>,
    #[serde(default)]
    pub title_japanese: Option<String>,
    #[serde(default)]
    pub title_synonyms: Vec<String>,

    // Type and status
    #[serde(rename = "type", default)]
    pub manga_type: Option<String>,
    #[serde(default)]
    pub chapters: Option<u32>,
    #[serde(default)]
    pub volumes: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub publishing: bool,
    #[serde(default)]
    pub published: Option<Published>,

    // Scores and rankings
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub scored_by: Option<u32>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub members: Option<u32>,
    #[serde(default)]
    pub favorites: Option<u32>,

    // Synopsis
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub background: Option<String>,

    // People and classification
    #[serde(default)]
    pub authors: Vec<MalEntity>,
    #[serde(default)]
    pub serializations: Vec<MalEntity>,
    #[serde(default)]
    pub genres: Vec<MalEntity>,
    #[serde(default)]
    pub themes: Vec<MalEntity>,
    #[serde(default)]
    pub demographics: Vec<MalEntity>,
}

/// Cover images
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MangaImages {
    #[serde(default)]
    pub jpg: ImageSet,
    #[serde(default)]
    pub webp: Option<ImageSet>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSet {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub small_image_url: Option<String>,
    #[serde(default)]
    pub large_image_url: Option<String>,
}

/// Publication period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Published {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub string: Option<String>,
}

impl Published {
    pub fn from_date(&self) -> Option<NaiveDate> {
        self.from.as_deref().and_then(parse_date)
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        self.to.as_deref().and_then(parse_date)
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

/// MAL entity (genre, author, magazine, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalEntity {
    pub mal_id: u32,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
}
