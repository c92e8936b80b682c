use crate::config::Source;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// Raw content fetched from a source
///
/// Created by the fetcher on success and never mutated afterwards; shared
/// between the fetch result and the derived parse job.
#[derive(Debug, Clone)]
pub struct Content {
    /// The source this content was fetched for
    pub source: Arc<Source>,

    /// Final URL after redirects
    pub url: String,

    /// Raw response body
    pub body: Vec<u8>,

    /// Declared Content-Type (empty when the server sent none)
    pub content_type: String,

    /// HTTP status code
    pub status: u16,

    /// Response headers
    pub headers: HeaderMap,

    pub fetched_at: DateTime<Utc>,
}

impl Content {
    /// Returns the body as text, replacing invalid UTF-8 sequences
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Checks the declared Content-Type against a MIME fragment (case-insensitive)
    pub fn has_content_type(&self, fragment: &str) -> bool {
        self.content_type
            .to_ascii_lowercase()
            .contains(&fragment.to_ascii_lowercase())
    }
}

/// A single piece of content extracted from a source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    pub title: Option<String>,

    /// Absolute URL of the item (or of the page it was found on)
    pub url: Option<String>,

    pub content: Option<String>,

    pub author: Option<String>,

    pub published: Option<DateTime<Utc>>,

    /// Followable links found inside the item
    pub links: Vec<String>,

    pub source_name: String,

    pub fetched_at: Option<DateTime<Utc>>,

    pub parsed_at: Option<DateTime<Utc>>,

    /// Name of the parser that produced this item
    pub extracted_by: String,

    /// Parser-specific fields
    pub extra: HashMap<String, String>,
}
