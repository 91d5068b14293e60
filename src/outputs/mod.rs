//! Output generation for scrape results.
//!
//! # Submodules
//!
//! - [`jsonl`]: Appends [`crate::models::ScrapeResult`]s to a JSON Lines file
//!
//! # Output Structure
//!
//! ```text
//! output.jsonl
//! {"citation": {"citation_id": "N0001", ...}, "chunks": [...]}
//! {"citation": {"citation_id": "N0002", ...}, "chunks": [...]}
//! ```

pub mod jsonl;
