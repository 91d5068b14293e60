//! Paginated keyword search against a Serper-compatible provider.
//!
//! A [`QueryAggregator`] turns a [`SearchRequest`] into citations:
//!
//! 1. **Query building**: quoted keywords are OR-combined and the free-form
//!    query string is appended
//! 2. **Pagination**: pages are requested one at a time until a short or
//!    exhausted page, or until `max_pages`
//! 3. **Dedup**: hits are accumulated by link across pages
//! 4. **Citations**: the hits go through [`build_citations`]
//!
//! Transport and HTTP failures end pagination for that request; whatever was
//! collected so far is still returned. Searching never fails outright.

use crate::citations::build_citations;
use crate::config::Settings;
use crate::models::{Citation, SearchHit, SourceType};
use crate::utils::truncate_for_log;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Number of results the provider returns for a full page.
pub const PAGE_SIZE: usize = 10;

/// Human-readable recency window for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    PastHour,
    #[default]
    PastDay,
    PastWeek,
    PastMonth,
    PastYear,
    AllTime,
}

impl DateRange {
    /// Provider recency filter (`tbs`) for this window. `AllTime` sends none.
    pub fn recency_token(self) -> Option<&'static str> {
        match self {
            DateRange::PastHour => Some("qdr:h,sbd:1"),
            DateRange::PastDay => Some("qdr:d,sbd:1"),
            DateRange::PastWeek => Some("qdr:w,sbd:1"),
            DateRange::PastMonth => Some("qdr:m,sbd:1"),
            DateRange::PastYear => Some("qdr:y,sbd:1"),
            DateRange::AllTime => None,
        }
    }
}

/// Everything needed to run one aggregated search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Free-form query text appended after the keyword clause.
    pub query: String,
    pub keywords: Vec<String>,
    pub search_type: SourceType,
    pub country: String,
    pub location: String,
    pub language: String,
    pub date_range: DateRange,
    pub max_pages: usize,
    pub exclude_publishers: Vec<String>,
}

/// Quote each keyword, OR them together, then append the raw query.
pub fn build_query(raw: &str, keywords: &[String]) -> String {
    let or_clause = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| format!("\"{k}\""))
        .join(" OR ");
    format!("{or_clause} {raw}").trim().to_string()
}

/// Split a comma-separated keyword list, trimming and dropping empties.
pub fn split_keywords(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Endpoint path for a search type.
pub fn endpoint_path(search_type: SourceType) -> &'static str {
    match search_type {
        SourceType::News => "news",
        SourceType::Videos => "videos",
        SourceType::Search => "search",
    }
}

/// Response key holding the hit array for a search type.
pub fn results_key(search_type: SourceType) -> &'static str {
    match search_type {
        SourceType::News => "news",
        SourceType::Videos => "videos",
        SourceType::Search => "organic",
    }
}

/// JSON body sent for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPayload {
    pub q: String,
    pub gl: String,
    pub hl: String,
    pub location: String,
    pub page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbs: Option<&'static str>,
}

impl SearchPayload {
    pub fn for_page(request: &SearchRequest, page: usize) -> Self {
        Self {
            q: build_query(&request.query, &request.keywords),
            gl: request.country.clone(),
            hl: request.language.clone(),
            location: request.location.clone(),
            page,
            tbs: request.date_range.recency_token(),
        }
    }
}

/// Pull the hit array for `search_type` out of a provider response.
///
/// Entries that do not deserialize as a [`SearchHit`] are skipped.
pub fn parse_hits(body: &Value, search_type: SourceType) -> Vec<SearchHit> {
    let Some(items) = body.get(results_key(search_type)).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<SearchHit>(item.clone()) {
            Ok(hit) => Some(hit),
            Err(e) => {
                debug!(error = %e, "Skipping malformed search hit");
                None
            }
        })
        .collect()
}

/// A remote search endpoint returning one page of hits per call.
pub trait SearchBackend {
    async fn fetch_page(
        &self,
        search_type: SourceType,
        payload: &SearchPayload,
    ) -> Result<Vec<SearchHit>, Box<dyn Error>>;
}

/// Serper HTTP client.
#[derive(Debug, Clone)]
pub struct SerperClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerperClient {
    pub fn new(settings: &Settings) -> Result<Self, Box<dyn Error>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key: settings.serper_api_key.clone(),
            base_url: settings.serper_base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl SearchBackend for SerperClient {
    #[instrument(level = "debug", skip_all, fields(page = payload.page, %search_type))]
    async fn fetch_page(
        &self,
        search_type: SourceType,
        payload: &SearchPayload,
    ) -> Result<Vec<SearchHit>, Box<dyn Error>> {
        let url = format!("{}/{}", self.base_url, endpoint_path(search_type));
        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {}", truncate_for_log(&body, 300)).into());
        }

        let body: Value = response.json().await?;
        Ok(parse_hits(&body, search_type))
    }
}

/// Paginates a [`SearchBackend`] and builds citations from the results.
#[derive(Debug)]
pub struct QueryAggregator<B> {
    backend: B,
    page_size: usize,
}

impl<B: SearchBackend> QueryAggregator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            page_size: PAGE_SIZE,
        }
    }

    /// Collect deduplicated hits across pages.
    #[instrument(level = "info", skip_all, fields(search_type = %request.search_type, max_pages = request.max_pages))]
    pub async fn collect_hits(&self, request: &SearchRequest) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = Vec::new();
        let mut seen_links: HashSet<String> = HashSet::new();

        for page in 1..=request.max_pages {
            let payload = SearchPayload::for_page(request, page);
            debug!(q = %payload.q, page, "Requesting search page");

            let page_hits = match self.backend.fetch_page(request.search_type, &payload).await {
                Ok(page_hits) => page_hits,
                Err(e) => {
                    warn!(page, error = %e, "Search request failed; keeping results collected so far");
                    break;
                }
            };

            let returned = page_hits.len();
            let mut added = 0usize;
            for hit in page_hits {
                let Some(link) = hit.target_url().map(str::to_string) else {
                    continue;
                };
                if seen_links.insert(link) {
                    hits.push(hit);
                    added += 1;
                }
            }
            debug!(page, returned, added, "Search page processed");

            if added == 0 || returned < self.page_size {
                break;
            }
        }

        info!(count = hits.len(), "Collected search hits");
        hits
    }

    /// Run the search and convert the hits into citations.
    pub async fn search(
        &self,
        request: &SearchRequest,
        reference_time: DateTime<Utc>,
    ) -> Vec<Citation> {
        let hits = self.collect_hits(request).await;
        build_citations(
            &hits,
            request.search_type,
            Utc::now(),
            reference_time,
            &request.exclude_publishers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves canned pages in order; pages past the end fail.
    struct FakeBackend {
        pages: Vec<Result<Vec<SearchHit>, String>>,
        calls: Mutex<Vec<SearchPayload>>,
    }

    impl FakeBackend {
        fn new(pages: Vec<Result<Vec<SearchHit>, String>>) -> Self {
            Self {
                pages,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl SearchBackend for &FakeBackend {
        async fn fetch_page(
            &self,
            _search_type: SourceType,
            payload: &SearchPayload,
        ) -> Result<Vec<SearchHit>, Box<dyn Error>> {
            self.calls.lock().unwrap().push(payload.clone());
            match self.pages.get(payload.page - 1) {
                Some(Ok(hits)) => Ok(hits.clone()),
                Some(Err(e)) => Err(e.clone().into()),
                None => Err("no such page".into()),
            }
        }
    }

    fn hits(prefix: &str, n: usize) -> Vec<SearchHit> {
        (0..n)
            .map(|i| SearchHit {
                link: Some(format!("https://{prefix}.example/{i}")),
                title: Some(format!("{prefix} {i}")),
                source: Some("Example".to_string()),
                ..Default::default()
            })
            .collect()
    }

    fn request(max_pages: usize) -> SearchRequest {
        SearchRequest {
            query: "Canada".to_string(),
            keywords: split_keywords("gun control, bill c-21"),
            search_type: SourceType::News,
            country: "ca".to_string(),
            location: "Canada".to_string(),
            language: "en".to_string(),
            date_range: DateRange::PastDay,
            max_pages,
            exclude_publishers: vec![],
        }
    }

    #[test]
    fn test_build_query() {
        let keywords = split_keywords(" gun control, ,bill c-21 ,");
        assert_eq!(keywords, vec!["gun control", "bill c-21"]);
        assert_eq!(
            build_query("Canada", &keywords),
            r#""gun control" OR "bill c-21" Canada"#
        );
        assert_eq!(build_query("", &keywords), r#""gun control" OR "bill c-21""#);
        assert_eq!(build_query(" only raw ", &[]), "only raw");
    }

    #[test]
    fn test_recency_tokens() {
        assert_eq!(DateRange::PastHour.recency_token(), Some("qdr:h,sbd:1"));
        assert_eq!(DateRange::PastYear.recency_token(), Some("qdr:y,sbd:1"));
        assert_eq!(DateRange::AllTime.recency_token(), None);
    }

    #[test]
    fn test_payload_omits_tbs_for_all_time() {
        let mut req = request(1);
        req.date_range = DateRange::AllTime;
        let json = serde_json::to_value(SearchPayload::for_page(&req, 2)).unwrap();
        assert_eq!(json["page"], 2);
        assert_eq!(json["gl"], "ca");
        assert!(json.get("tbs").is_none());
    }

    #[test]
    fn test_endpoint_and_results_keys() {
        assert_eq!(endpoint_path(SourceType::Search), "search");
        assert_eq!(results_key(SourceType::Search), "organic");
        assert_eq!(results_key(SourceType::Videos), "videos");
    }

    #[test]
    fn test_parse_hits_skips_malformed_entries() {
        let body = serde_json::json!({
            "news": [
                {"link": "https://a.example/1", "title": "ok", "date": "1 hour ago"},
                {"link": 42},
                {"url": "https://a.example/2", "siteName": "Site"}
            ]
        });
        let parsed = parse_hits(&body, SourceType::News);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].publisher(), Some("Site"));
        assert!(parse_hits(&body, SourceType::Videos).is_empty());
    }

    #[tokio::test]
    async fn test_stops_after_short_page() {
        let backend = FakeBackend::new(vec![
            Ok(hits("p1", PAGE_SIZE)),
            Ok(hits("p2", 3)),
            Ok(hits("p3", PAGE_SIZE)),
        ]);
        let aggregator = QueryAggregator::new(&backend);

        let collected = aggregator.collect_hits(&request(5)).await;
        assert_eq!(collected.len(), PAGE_SIZE + 3);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_never_exceeds_max_pages() {
        let backend = FakeBackend::new(vec![
            Ok(hits("p1", PAGE_SIZE)),
            Ok(hits("p2", PAGE_SIZE)),
            Ok(hits("p3", PAGE_SIZE)),
        ]);
        let aggregator = QueryAggregator::new(&backend);

        let collected = aggregator.collect_hits(&request(2)).await;
        assert_eq!(collected.len(), 2 * PAGE_SIZE);
        assert_eq!(backend.call_count(), 2);

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].page, 1);
        assert_eq!(calls[1].page, 2);
        assert_eq!(calls[0].tbs, Some("qdr:d,sbd:1"));
    }

    #[tokio::test]
    async fn test_stops_when_page_adds_nothing_new() {
        let backend = FakeBackend::new(vec![
            Ok(hits("p1", PAGE_SIZE)),
            Ok(hits("p1", PAGE_SIZE)),
            Ok(hits("p3", PAGE_SIZE)),
        ]);
        let aggregator = QueryAggregator::new(&backend);

        let collected = aggregator.collect_hits(&request(3)).await;
        assert_eq!(collected.len(), PAGE_SIZE);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_results() {
        let backend = FakeBackend::new(vec![
            Ok(hits("p1", PAGE_SIZE)),
            Err("HTTP 500 Internal Server Error".to_string()),
            Ok(hits("p3", PAGE_SIZE)),
        ]);
        let aggregator = QueryAggregator::new(&backend);

        let citations = aggregator.search(&request(3), Utc::now()).await;
        assert_eq!(citations.len(), PAGE_SIZE);
        assert_eq!(citations[0].citation_id, "N0001");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_first_page_failure_returns_empty() {
        let backend = FakeBackend::new(vec![Err("connection refused".to_string())]);
        let aggregator = QueryAggregator::new(&backend);
        assert!(aggregator.search(&request(3), Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn test_search_applies_publisher_exclusion() {
        let mut page = hits("p1", 4);
        page[1].source = Some("Blocked".to_string());
        let backend = FakeBackend::new(vec![Ok(page)]);
        let aggregator = QueryAggregator::new(&backend);

        let mut req = request(1);
        req.exclude_publishers = vec!["Blocked".to_string()];
        let citations = aggregator.search(&req, Utc::now()).await;
        assert_eq!(citations.len(), 3);
        assert!(citations.iter().all(|c| c.publisher.as_deref() == Some("Example")));
    }
}
