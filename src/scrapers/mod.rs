//! Full-text scraping of discovered citations.
//!
//! The scrape stage turns citations into [`crate::models::ScrapeResult`]s in
//! three steps:
//!
//! 1. **Rendering**: Load the page in a browser (headless Chromium, or plain
//!    HTTP without JavaScript) and snapshot the DOM
//! 2. **Extraction**: Run ordered text strategies over the snapshot
//! 3. **Chunking**: Split the article text into paragraph chunks
//!
//! # Submodules
//!
//! | Module | Role |
//! |--------|------|
//! | [`browser`] | `Browser` / `BrowsingContext` traits and the run's session |
//! | [`chromium`] | Chromium over the DevTools protocol |
//! | [`http`] | `reqwest` renderer, no JavaScript |
//! | [`extract`] | Strategy chain and text cleanup |
//! | [`chunk`] | Paragraph chunks with character offsets |
//! | [`coordinator`] | Bounded concurrent scraping of a batch |
//!
//! Failed pages are logged and skipped without failing the batch.

pub mod browser;
pub mod chromium;
pub mod chunk;
pub mod coordinator;
pub mod extract;
pub mod http;

#[cfg(test)]
pub(crate) mod testing;
