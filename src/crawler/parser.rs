//! Content parsers
//!
//! A parser turns fetched content into items. Parsers are looked up by the
//! source's parser kind in a [`ParserRegistry`]; only HTML ships built in.

use crate::config::{ParserKind, Source};
use crate::model::{Content, Item};
use crate::ParseError;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Extracts items from fetched content
///
/// Implementations must be cheap to share; `parse` runs on the blocking
/// thread pool and may be called from several workers at once.
pub trait Parser: Send + Sync {
    /// Short name recorded on every item this parser produces
    fn name(&self) -> &'static str;

    fn parse(&self, content: &Content, source: &Source) -> Result<Vec<Item>, ParseError>;
}

/// Parsers keyed by the kind a source selects
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<ParserKind, Arc<dyn Parser>>,
}

impl ParserRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in HTML parser
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ParserKind::Html, Arc::new(HtmlParser));
        registry
    }

    /// Registers a parser, replacing any previous one for `kind`
    pub fn register(&mut self, kind: ParserKind, parser: Arc<dyn Parser>) {
        self.parsers.insert(kind, parser);
    }

    pub fn get(&self, kind: ParserKind) -> Option<Arc<dyn Parser>> {
        self.parsers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: ParserKind) -> bool {
        self.parsers.contains_key(&kind)
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.parsers.keys().map(ParserKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ParserRegistry").field("kinds", &kinds).finish()
    }
}

/// Runs a parser on the blocking thread pool
pub async fn parse_blocking(
    parser: Arc<dyn Parser>,
    content: Arc<Content>,
    source: Arc<Source>,
) -> Result<Vec<Item>, ParseError> {
    tokio::task::spawn_blocking(move || parser.parse(&content, &source))
        .await
        .map_err(|e| ParseError::Task(e.to_string()))?
}

/// HTML parser driven by the source's CSS selectors
///
/// # Selectors
///
/// | Key | Meaning |
/// |-----|---------|
/// | `item` | One item per matching element |
/// | `title` | Title inside an item (or the page title override) |
/// | `link` | Element whose `href` is the item URL |
/// | `content` | Element whose text is the item content |
///
/// Without an `item` selector the whole page becomes a single item.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlParser;

impl Parser for HtmlParser {
    fn name(&self) -> &'static str {
        "html"
    }

    fn parse(&self, content: &Content, source: &Source) -> Result<Vec<Item>, ParseError> {
        let base_url = Url::parse(&content.url)
            .map_err(|e| ParseError::Malformed(format!("invalid content URL: {}", e)))?;
        let document = Html::parse_document(&content.text());
        let selectors = ItemSelectors::compile(&source.selectors)?;

        let mut items = match &selectors.item {
            Some(item) => document
                .select(item)
                .map(|element| extract_item(element, &selectors, &base_url))
                .collect(),
            None => vec![extract_page(&document, &selectors, &base_url)],
        };

        let parsed_at = Utc::now();
        for item in &mut items {
            item.source_name = source.name.clone();
            item.fetched_at = Some(content.fetched_at);
            item.parsed_at = Some(parsed_at);
            item.extracted_by = self.name().to_string();
        }

        Ok(items)
    }
}

struct ItemSelectors {
    anchor: Selector,
    item: Option<Selector>,
    title: Option<Selector>,
    link: Option<Selector>,
    content: Option<Selector>,
}

impl ItemSelectors {
    fn compile(selectors: &HashMap<String, String>) -> Result<Self, ParseError> {
        let get = |key: &str| -> Result<Option<Selector>, ParseError> {
            selectors
                .get(key)
                .map(|s| {
                    Selector::parse(s).map_err(|e| ParseError::Selector {
                        selector: s.clone(),
                        message: e.to_string(),
                    })
                })
                .transpose()
        };

        let anchor = Selector::parse("a[href]").map_err(|e| ParseError::Selector {
            selector: "a[href]".to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            anchor,
            item: get("item")?,
            title: get("title")?,
            link: get("link")?,
            content: get("content")?,
        })
    }
}

/// Builds one item from an element matched by the `item` selector
fn extract_item(element: ElementRef<'_>, selectors: &ItemSelectors, base_url: &Url) -> Item {
    let title = selectors
        .title
        .as_ref()
        .and_then(|s| element.select(s).next())
        .map(element_text)
        .filter(|s| !s.is_empty());

    let url = match &selectors.link {
        Some(link) => element
            .select(link)
            .next()
            .and_then(|e| e.value().attr("href")),
        None => element.value().attr("href"),
    }
    .and_then(|href| resolve_link(href, base_url));

    let content = match &selectors.content {
        Some(content) => element.select(content).next().map(element_text),
        None => Some(element_text(element)),
    }
    .filter(|s| !s.is_empty());

    let links = element
        .select(&selectors.anchor)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_link(href, base_url))
        .collect();

    Item {
        title,
        url,
        content,
        links,
        ..Item::default()
    }
}

/// Builds the single item that represents a whole page
fn extract_page(document: &Html, selectors: &ItemSelectors, base_url: &Url) -> Item {
    let title = match &selectors.title {
        Some(title) => document.select(title).next().map(element_text),
        None => extract_title(document),
    }
    .filter(|s| !s.is_empty());

    let content = match &selectors.content {
        Some(content) => document.select(content).next().map(element_text),
        None => Selector::parse("body")
            .ok()
            .and_then(|body| document.select(&body).next().map(element_text)),
    }
    .filter(|s| !s.is_empty());

    Item {
        title,
        url: Some(base_url.to_string()),
        content,
        links: extract_links(document, &selectors.anchor, base_url),
        ..Item::default()
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts all followable links from the document, canonical link included
fn extract_links(document: &Html, anchor: &Selector, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    for element in document.select(anchor) {
        if element.value().attr("download").is_some() {
            continue;
        }
        if let Some(absolute) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        {
            links.push(absolute);
        }
    }

    if let Ok(canonical) = Selector::parse("link[rel='canonical'][href]") {
        links.extend(
            document
                .select(&canonical)
                .filter_map(|e| e.value().attr("href"))
                .filter_map(|href| resolve_link(href, base_url)),
        );
    }

    links
}

/// Collapses an element's text nodes into single-spaced text
fn element_text(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only anchors
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then(|| absolute.to_string())
}
