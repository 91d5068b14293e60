//! Mapping raw search hits into canonical [`Citation`] records.

use crate::dates;
use crate::models::{Citation, CitationMetadata, SearchHit, SourceType};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Convert raw hits into a deduplicated, densely numbered citation batch.
///
/// Hits are processed in input order:
/// - hits with no URL, or a URL already seen in this batch, are skipped
///   (the first occurrence wins, even if it is later excluded)
/// - hits whose publisher appears in `exclude_publishers` are dropped
/// - kept hits are numbered `{initial}{0001..}` with no gaps
///
/// Dates are resolved against `reference_time` through [`dates::normalize`].
#[instrument(level = "debug", skip_all, fields(%source_type, hits = hits.len()))]
pub fn build_citations(
    hits: &[SearchHit],
    source_type: SourceType,
    access_date: DateTime<Utc>,
    reference_time: DateTime<Utc>,
    exclude_publishers: &[String],
) -> Vec<Citation> {
    let mut seen_urls: HashSet<&str> = HashSet::new();
    let mut citations = Vec::new();

    for hit in hits {
        let Some(url) = hit.target_url() else {
            debug!(title = ?hit.title, "Skipping hit without a URL");
            continue;
        };
        if !seen_urls.insert(url) {
            debug!(%url, "Skipping duplicate URL");
            continue;
        }

        let publisher = hit.publisher();
        if publisher.is_some_and(|p| exclude_publishers.iter().any(|x| x == p)) {
            debug!(%url, ?publisher, "Skipping excluded publisher");
            continue;
        }

        let metadata = CitationMetadata {
            original_date_string: hit.date.clone(),
            snippet: hit.snippet.clone(),
            image_url: hit.image_url.clone(),
            ..Default::default()
        };

        citations.push(Citation {
            citation_id: format!("{}{:04}", source_type.initial(), citations.len() + 1),
            source_type,
            media_type: source_type.media_type(),
            title: hit.title.clone(),
            date: dates::normalize(hit.date.as_deref(), reference_time),
            url: url.to_string(),
            access_date,
            jurisdiction: None,
            publisher: publisher.map(str::to_string),
            publication: None,
            author: None,
            metadata: metadata.non_empty(),
        });
    }

    debug!(kept = citations.len(), "Built citations");
    citations
}
