//! Article body extraction.
//!
//! [`ContentExtractor::extract`] renders a page in a fresh browsing context
//! and snapshots the DOM. The snapshot is then handed to an ordered table of
//! pure strategies over a parsed [`Html`] document; each later strategy only
//! runs while the text found so far is too short to be an article.

use crate::config::ScrapeSettings;
use crate::scrapers::browser::{Browser, BrowsingContext, ContextProfile, catch_panic};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// A strategy's text stops the chain once it has this many trimmed chars.
pub const STRATEGY_FLOOR: usize = 200;

/// Extracted text must be longer than this to be returned.
pub const MIN_EXTRACTED_CHARS: usize = 200;

/// Paragraph candidates in the structural strategy must be longer than this.
const MIN_BLOCK_CHARS: usize = 30;

const ARTICLE_SELECTORS: &[&str] = &[
    "article",
    "[role='article']",
    ".article-body",
    ".story-body",
    ".post-content",
    ".entry-content",
    "main article",
    ".content__article-body",
    ".article__content",
];

const CONTAINER_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[class*='content']",
    "[class*='post']",
    "[class*='story']",
];

static ARTICLE: Lazy<Vec<Selector>> = Lazy::new(|| parse_all(ARTICLE_SELECTORS));
static CONTAINER: Lazy<Vec<Selector>> = Lazy::new(|| parse_all(CONTAINER_SELECTORS));
static PARAGRAPH: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p, div[class*='paragraph'], div[class*='body']").unwrap());
static NOISE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script, style, nav, header, footer, aside, .ad, .advert").unwrap()
});
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

/// Elements whose content is never rendered as text.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li",
    "main", "nav", "ol", "pre", "section", "table", "tr", "ul",
];

fn parse_all(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
}

/// A text extraction strategy over a parsed document.
pub type Strategy = fn(&Html) -> Option<String>;

/// Strategies in the order they are tried.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("selector", selector_strategy),
    ("structural", structural_strategy),
    ("whole_page", whole_page_strategy),
];

/// First article-body selector whose first match holds more than
/// [`STRATEGY_FLOOR`] characters.
pub fn selector_strategy(document: &Html) -> Option<String> {
    ARTICLE.iter().find_map(|selector| {
        let element = document.select(selector).next()?;
        let text = inner_text(element, None);
        let text = text.trim();
        (text.chars().count() > STRATEGY_FLOOR).then(|| text.to_string())
    })
}

/// Paragraph-like blocks inside the first content container, joined by blank lines.
pub fn structural_strategy(document: &Html) -> Option<String> {
    let container = CONTAINER
        .iter()
        .find_map(|selector| document.select(selector).next())?;

    let blocks: Vec<String> = container
        .select(&PARAGRAPH)
        .map(|block| inner_text(block, None).trim().to_string())
        .filter(|text| text.chars().count() > MIN_BLOCK_CHARS)
        .collect();

    (!blocks.is_empty()).then(|| blocks.join("\n\n"))
}

/// All body text with navigation, chrome, and ads removed.
pub fn whole_page_strategy(document: &Html) -> Option<String> {
    let root = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());
    let text = inner_text(root, Some(&NOISE));
    (!text.trim().is_empty()).then_some(text)
}

/// Run the strategy chain over rendered HTML and clean the winner.
///
/// Returns `None` unless the cleaned text is longer than
/// [`MIN_EXTRACTED_CHARS`].
pub fn extract_text(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let mut text = String::new();
    for (name, strategy) in STRATEGIES {
        if text.trim().chars().count() >= STRATEGY_FLOOR {
            break;
        }
        if let Some(candidate) = strategy(&document) {
            debug!(strategy = name, chars = candidate.chars().count(), "Strategy produced text");
            text = candidate;
        }
    }

    let cleaned = clean_text(&text);
    (cleaned.chars().count() > MIN_EXTRACTED_CHARS).then_some(cleaned)
}

/// Trim, squeeze blank-line runs to one blank line, and collapse spaces and tabs.
pub fn clean_text(text: &str) -> String {
    let text = BLANK_RUNS.replace_all(text.trim(), "\n\n");
    SPACE_RUNS.replace_all(&text, " ").into_owned()
}

/// Rendered text of an element, roughly as a browser's `innerText` lays it out.
///
/// Whitespace inside text nodes collapses to single spaces, paragraphs are
/// separated by a blank line and other block elements by a line break.
/// Elements matching `skip` are left out along with their descendants.
pub fn inner_text(element: ElementRef<'_>, skip: Option<&Selector>) -> String {
    let mut out = String::new();
    walk(element, skip, &mut out);
    tidy_lines(&out)
}

fn walk(element: ElementRef<'_>, skip: Option<&Selector>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&WHITESPACE.replace_all(text, " "));
        } else if let Some(child) = ElementRef::wrap(child) {
            visit(child, skip, out);
        }
    }
}

fn visit(element: ElementRef<'_>, skip: Option<&Selector>, out: &mut String) {
    let name = element.value().name();
    if HIDDEN_TAGS.contains(&name) || skip.is_some_and(|s| s.matches(&element)) {
        return;
    }
    if name == "br" {
        out.push('\n');
        return;
    }

    let breaks = if name == "p" {
        2
    } else if BLOCK_TAGS.contains(&name) {
        1
    } else {
        0
    };
    push_breaks(out, breaks);
    walk(element, skip, out);
    push_breaks(out, breaks);
}

fn push_breaks(out: &mut String, breaks: usize) {
    if out.is_empty() {
        return;
    }
    let existing = out.chars().rev().take_while(|c| *c == '\n').count();
    for _ in existing..breaks {
        out.push('\n');
    }
}

fn tidy_lines(text: &str) -> String {
    let lines = text.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    BLANK_RUNS.replace_all(lines.trim(), "\n\n").into_owned()
}

/// Renders pages and extracts their article text.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    profile: ContextProfile,
    nav_timeout: Duration,
    settle_delay: Duration,
}

impl ContentExtractor {
    pub fn new(settings: &ScrapeSettings) -> Self {
        Self {
            profile: ContextProfile::desktop(),
            nav_timeout: settings.nav_timeout,
            settle_delay: settings.settle_delay,
        }
    }

    pub fn profile(&self) -> &ContextProfile {
        &self.profile
    }

    /// Article text of `url`, or `None` when the page fails to load or holds
    /// too little text. The browsing context is closed on every path.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn extract<B: Browser>(&self, browser: &B, url: &str) -> Option<String> {
        let mut context = match browser.new_context(&self.profile).await {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, %url, "Could not open browsing context");
                return None;
            }
        };

        let rendered = catch_panic(self.render(&mut context, url)).await;
        if let Err(e) = browser.close_context(context).await {
            debug!(error = %e, %url, "Closing browsing context failed");
        }

        match rendered {
            Ok(html) => {
                let text = extract_text(&html);
                if text.is_none() {
                    debug!(%url, bytes = html.len(), "No article text found");
                }
                text
            }
            Err(e) => {
                warn!(error = %e, %url, "Page render failed");
                None
            }
        }
    }

    async fn render<C: BrowsingContext>(&self, context: &mut C, url: &str) -> Result<String, Box<dyn Error>> {
        context.navigate(url, self.nav_timeout).await?;
        sleep(self.settle_delay).await;
        context.content().await
    }
}
