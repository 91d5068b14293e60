//! Data models for search hits, citations, and extracted text.
//!
//! This module defines the core data structures used throughout the application:
//! - [`SearchHit`]: Raw item returned by the search provider
//! - [`Citation`]: Canonical record describing one discovered source
//! - [`CitationMetadata`]: Open, typed metadata attached to a citation
//! - [`TextChunk`]: One paragraph of a citation's extracted body text
//! - [`ScrapeResult`]: A scraped citation paired with its chunks
//!
//! Timestamps are `chrono::DateTime<Utc>` everywhere; they only become
//! strings when serialized at the output boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw search hit as returned by the search provider.
///
/// Providers are inconsistent about field names (`link` vs `url`,
/// `source` vs `siteName`), so both spellings are accepted and resolved
/// through the accessor methods.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    pub link: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub snippet: Option<String>,
    /// Free-form date string such as `"3 hours ago"` or `"Oct 17, 2025"`.
    pub date: Option<String>,
    pub source: Option<String>,
    #[serde(rename = "siteName")]
    pub site_name: Option<String>,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

impl SearchHit {
    /// The hit's link, preferring `link` over `url`. Blank values count as missing.
    pub fn target_url(&self) -> Option<&str> {
        non_blank(self.link.as_deref()).or_else(|| non_blank(self.url.as_deref()))
    }

    /// The publisher name, preferring `source` over `siteName`.
    pub fn publisher(&self) -> Option<&str> {
        non_blank(self.source.as_deref()).or_else(|| non_blank(self.site_name.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Kind of search that produced a citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Search,
    #[default]
    News,
    Videos,
}

impl SourceType {
    /// Uppercase first letter used as the citation id prefix.
    pub fn initial(self) -> char {
        match self {
            SourceType::Search => 'S',
            SourceType::News => 'N',
            SourceType::Videos => 'V',
        }
    }

    /// The media type implied by this source type.
    pub fn media_type(self) -> MediaType {
        match self {
            SourceType::Videos => MediaType::Video,
            SourceType::Search | SourceType::News => MediaType::Text,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Search => "search",
            SourceType::News => "news",
            SourceType::Videos => "videos",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Text,
    Video,
}

/// Metadata attached to a [`Citation`].
///
/// The named fields are the keys this application knows how to produce;
/// anything else a caller adds lands in `extra`. A citation whose metadata
/// has no values carries `None` instead of an empty value (see
/// [`CitationMetadata::is_empty`]).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CitationMetadata {
    /// Date exactly as the search provider reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_date_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Set once full article text has been extracted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text_scraped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraped_word_count: Option<usize>,
    /// Why the relevance filter kept this citation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_reason: Option<String>,
    /// Relevance filter score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salience: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CitationMetadata {
    /// True when no field carries a non-empty value.
    pub fn is_empty(&self) -> bool {
        fn blank(v: &Option<String>) -> bool {
            v.as_deref().is_none_or(|s| s.trim().is_empty())
        }

        blank(&self.original_date_string)
            && blank(&self.snippet)
            && blank(&self.image_url)
            && self.full_text_scraped.is_none()
            && self.scraped_word_count.is_none()
            && blank(&self.relevance_reason)
            && self.salience.as_ref().is_none_or(Value::is_null)
            && self.extra.values().all(Value::is_null)
    }

    /// Wrap into an `Option`, collapsing empty metadata to `None`.
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() { None } else { Some(self) }
    }
}

/// Canonical record describing one discovered source.
///
/// `url` is unique within a batch produced by
/// [`crate::citations::build_citations`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Citation {
    /// Deterministic per batch: source type initial plus a zero-padded sequence (`N0001`).
    pub citation_id: String,
    pub source_type: SourceType,
    pub media_type: MediaType,
    pub title: Option<String>,
    /// Normalized publication date, absent when it could not be determined.
    pub date: Option<DateTime<Utc>>,
    pub url: String,
    /// When the source was retrieved.
    pub access_date: DateTime<Utc>,
    pub jurisdiction: Option<String>,
    pub publisher: Option<String>,
    pub publication: Option<String>,
    pub author: Option<String>,
    pub metadata: Option<CitationMetadata>,
}

impl Citation {
    /// Whether the scrape stage should attempt full-text extraction.
    pub fn is_scrapable(&self) -> bool {
        self.media_type == MediaType::Text && !self.url.trim().is_empty()
    }

    /// Missing, blank, or placeholder titles are worth replacing with the page title.
    pub fn needs_title(&self) -> bool {
        match self.title.as_deref() {
            None => true,
            Some(title) => title.trim().is_empty() || title.contains("Untitled"),
        }
    }
}

/// One paragraph-sized slice of a citation's extracted text.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TextChunk {
    pub textchunk_id: String,
    pub citation_id: String,
    pub text: String,
    /// 1-based paragraph ordinal.
    pub section: u32,
    /// Character offset of `text` in the `"\n\n"`-joined paragraph stream.
    pub char_start: Option<usize>,
    /// Exclusive end offset, in characters.
    pub char_end: Option<usize>,
}

/// A successfully scraped citation and its ordered chunks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrapeResult {
    pub citation: Citation,
    pub chunks: Vec<TextChunk>,
}


#[cfg(test)]
mod tests {
    use super::*;
    use fixtures::citation;

    #[test]
    fn test_search_hit_prefers_link_over_url() {
        let hit: SearchHit = serde_json::from_str(
            r#"{"link": "https://a.example/1", "url": "https://b.example/1", "siteName": "B"}"#,
        )
        .unwrap();
        assert_eq!(hit.target_url(), Some("https://a.example/1"));
        assert_eq!(hit.publisher(), Some("B"));
    }

    #[test]
    fn test_search_hit_blank_link_falls_back() {
        let hit = SearchHit {
            link: Some("  ".to_string()),
            url: Some("https://b.example/1".to_string()),
            ..Default::default()
        };
        assert_eq!(hit.target_url(), Some("https://b.example/1"));

        let empty = SearchHit::default();
        assert_eq!(empty.target_url(), None);
    }

    #[test]
    fn test_source_type_initials_and_media() {
        assert_eq!(SourceType::News.initial(), 'N');
        assert_eq!(SourceType::Search.initial(), 'S');
        assert_eq!(SourceType::Videos.initial(), 'V');
        assert_eq!(SourceType::Videos.media_type(), MediaType::Video);
        assert_eq!(SourceType::Search.media_type(), MediaType::Text);
    }

    #[test]
    fn test_metadata_emptiness() {
        assert!(CitationMetadata::default().is_empty());

        let blank = CitationMetadata {
            snippet: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.non_empty(), None);

        let filled = CitationMetadata {
            snippet: Some("A snippet".to_string()),
            ..Default::default()
        };
        assert!(filled.non_empty().is_some());
    }

    #[test]
    fn test_metadata_serializes_extra_keys_flat() {
        let mut meta = CitationMetadata {
            scraped_word_count: Some(12),
            ..Default::default()
        };
        meta.extra.insert("desk".to_string(), Value::from("politics"));

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["scraped_word_count"], 12);
        assert_eq!(json["desk"], "politics");
        assert!(json.get("snippet").is_none());
    }

    #[test]
    fn test_citation_serialization_uses_rfc3339_dates() {
        let c = citation("N0001", "https://example.com/a", SourceType::News);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["access_date"], "2025-05-06T12:00:00Z");
        assert_eq!(json["source_type"], "news");
        assert_eq!(json["media_type"], "text");
        assert!(json["metadata"].is_null());
    }

    #[test]
    fn test_needs_title() {
        let mut c = citation("N0001", "https://example.com/a", SourceType::News);
        assert!(!c.needs_title());
        c.title = Some("Untitled document".to_string());
        assert!(c.needs_title());
        c.title = None;
        assert!(c.needs_title());
    }

    #[test]
    fn test_is_scrapable() {
        let text = citation("N0001", "https://example.com/a", SourceType::News);
        let video = citation("V0001", "https://example.com/v", SourceType::Videos);
        let blank = citation("N0002", " ", SourceType::News);
        assert!(text.is_scrapable());
        assert!(!video.is_scrapable());
        assert!(!blank.is_scrapable());
    }
}
