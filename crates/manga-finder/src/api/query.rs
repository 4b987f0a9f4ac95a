//! Request shapes for the manga endpoints.
//!
//! An [`Endpoint`] renders to the exact path and query string sent to Jikan.
//! The same string is the cache fingerprint, so parameters are always
//! emitted in one fixed order with empty values left out.

use super::types::CategoryId;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sort field for `/manga`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    #[default]
    Score,
    Title,
    Popularity,
    Favorites,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::Score => "score",
            OrderBy::Title => "title",
            OrderBy::Popularity => "popularity",
            OrderBy::Favorites => "favorites",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Publication status filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PublishingStatus {
    Publishing,
    Complete,
    Hiatus,
    Discontinued,
}

impl PublishingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishingStatus::Publishing => "publishing",
            PublishingStatus::Complete => "complete",
            PublishingStatus::Hiatus => "hiatus",
            PublishingStatus::Discontinued => "discontinued",
        }
    }
}

/// Manga type filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MangaType {
    Manga,
    Novel,
    Oneshot,
    Doujin,
    Manhwa,
    Manhua,
}

impl MangaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MangaType::Manga => "manga",
            MangaType::Novel => "novel",
            MangaType::Oneshot => "oneshot",
            MangaType::Doujin => "doujin",
            MangaType::Manhwa => "manhwa",
            MangaType::Manhua => "manhua",
        }
    }
}

/// Parameters for `GET /manga`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub order_by: Option<OrderBy>,
    pub sort: Option<SortDirection>,
    pub status: Option<PublishingStatus>,
    pub manga_type: Option<MangaType>,
    pub min_score: Option<f64>,
    pub genres: Vec<CategoryId>,
}

impl SearchParams {
    /// Free-text search
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    /// First page of a genre's best-scored titles
    pub fn genre_preview(genre: CategoryId, limit: u32) -> Self {
        Self {
            page: Some(1),
            limit: Some(limit),
            order_by: Some(OrderBy::Score),
            sort: Some(SortDirection::Desc),
            genres: vec![genre],
            ..Default::default()
        }
    }

    /// Trimmed query text, `None` when blank
    pub fn query_text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// True when there is no query text and no filter set.
    ///
    /// Paging and sorting alone do not count: they only shape a result that
    /// would otherwise be the whole catalogue.
    pub fn is_empty(&self) -> bool {
        self.query_text().is_none()
            && self.status.is_none()
            && self.manga_type.is_none()
            && self.min_score.is_none()
            && self.genres.is_empty()
    }

    /// Query pairs in wire order
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(q) = self.query_text() {
            pairs.push(("q", q.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(order_by) = self.order_by {
            pairs.push(("order_by", order_by.as_str().to_string()));
        }
        if let Some(sort) = self.sort {
            pairs.push(("sort", sort.as_str().to_string()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(manga_type) = self.manga_type {
            pairs.push(("type", manga_type.as_str().to_string()));
        }
        if let Some(min_score) = self.min_score {
            pairs.push(("min_score", min_score.to_string()));
        }
        if !self.genres.is_empty() {
            let ids: Vec<String> = self.genres.iter().map(|g| g.to_string()).collect();
            pairs.push(("genres", ids.join(",")));
        }
        pairs
    }
}

/// One of the four Jikan endpoints the application reads
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    SearchManga(SearchParams),
    MangaFull(u32),
    TopManga { limit: Option<u32> },
    MangaGenres,
}

impl Endpoint {
    pub fn path_and_query(&self) -> String {
        match self {
            Endpoint::SearchManga(params) => with_query("/manga", &params.to_pairs()),
            Endpoint::MangaFull(id) => format!("/manga/{}/full", id),
            Endpoint::TopManga { limit } => {
                let pairs: Vec<(&'static str, String)> =
                    limit.iter().map(|l| ("limit", l.to_string())).collect();
                with_query("/top/manga", &pairs)
            }
            Endpoint::MangaGenres => "/genres/manga".to_string(),
        }
    }

    pub fn key(&self) -> QueryKey {
        QueryKey(self.path_and_query())
    }
}

fn with_query(path: &str, pairs: &[(&'static str, String)]) -> String {
    if pairs.is_empty() {
        return path.to_string();
    }
    let query: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    format!("{}?{}", path, query.join("&"))
}

/// Cache fingerprint of a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Endpoint> for QueryKey {
    fn from(endpoint: &Endpoint) -> Self {
        endpoint.key()
    }
}

impl From<&str> for QueryKey {
    fn from(s: &str) -> Self {
        QueryKey(s.to_string())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_search_query_order() {
        let params = SearchParams {
            query: Some("one piece".to_string()),
            page: Some(2),
            limit: Some(24),
            order_by: Some(OrderBy::Popularity),
            sort: Some(SortDirection::Asc),
            status: Some(PublishingStatus::Hiatus),
            manga_type: Some(MangaType::Manhwa),
            min_score: Some(7.5),
            genres: vec![1, 22],
        };
        assert_eq!(
            Endpoint::SearchManga(params).path_and_query(),
            "/manga?q=one%20piece&page=2&limit=24&order_by=popularity&sort=asc\
             &status=hiatus&type=manhwa&min_score=7.5&genres=1%2C22"
        );
    }

    #[test]
    fn test_blank_values_omitted() {
        let params = SearchParams::text("   ");
        assert!(params.is_empty());
        assert_eq!(Endpoint::SearchManga(params).path_and_query(), "/manga");
    }

    #[test]
    fn test_query_is_trimmed() {
        let a = Endpoint::SearchManga(SearchParams::text("berserk ")).key();
        let b = Endpoint::SearchManga(SearchParams::text("berserk")).key();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "/manga?q=berserk");
    }

    #[test]
    fn test_filters_make_params_non_empty() {
        let params = SearchParams {
            status: Some(PublishingStatus::Complete),
            ..Default::default()
        };
        assert!(!params.is_empty());

        let paging_only = SearchParams {
            page: Some(3),
            order_by: Some(OrderBy::Title),
            ..Default::default()
        };
        assert!(paging_only.is_empty());
    }

    #[test]
    fn test_genre_preview_shape() {
        let endpoint = Endpoint::SearchManga(SearchParams::genre_preview(8, 12));
        assert_eq!(
            endpoint.path_and_query(),
            "/manga?page=1&limit=12&order_by=score&sort=desc&genres=8"
        );
    }

    #[test]
    fn test_other_endpoints() {
        assert_eq!(Endpoint::MangaFull(2).path_and_query(), "/manga/2/full");
        assert_eq!(
            Endpoint::TopManga { limit: Some(4) }.path_and_query(),
            "/top/manga?limit=4"
        );
        assert_eq!(Endpoint::TopManga { limit: None }.path_and_query(), "/top/manga");
        assert_eq!(Endpoint::MangaGenres.path_and_query(), "/genres/manga");
    }
}
