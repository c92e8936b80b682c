use crate::config::Source;
use crate::model::{Content, Item};
use crate::AggregatorError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// A unit of work for the fetch pool
///
/// Consumed exactly once by a fetch worker.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub source: Arc<Source>,

    /// Resolved URL to fetch (one page of the source)
    pub url: Url,

    pub submitted_at: DateTime<Utc>,

    /// Optional caller metadata, carried through to the result
    pub metadata: HashMap<String, String>,
}

impl FetchJob {
    pub fn new(source: Arc<Source>, url: Url) -> Self {
        Self {
            source,
            url,
            submitted_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Builds the job for a source's first page
    pub fn for_source(source: Arc<Source>) -> Result<Self, AggregatorError> {
        let url = source.resolved_url()?;
        Ok(Self::new(source, url))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one fetch job
///
/// Exactly one is produced per job; `content` and `error` are mutually exclusive.
#[derive(Debug)]
pub struct FetchResult {
    pub source: Arc<Source>,

    /// The URL the job asked for
    pub url: Url,

    pub content: Option<Arc<Content>>,

    pub fetched_at: DateTime<Utc>,

    /// Identity of the fetch worker that handled the job
    pub worker_id: usize,

    pub error: Option<AggregatorError>,

    pub metadata: HashMap<String, String>,
}

impl FetchResult {
    /// True when the fetch produced content and no error
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.content.is_some()
    }

    /// Derives the parse job for a successful fetch
    pub fn parse_job(&self) -> Option<ParseJob> {
        if self.error.is_some() {
            return None;
        }
        self.content.as_ref().map(|content| ParseJob {
            source: Arc::clone(&self.source),
            content: Arc::clone(content),
            submitted_at: Utc::now(),
        })
    }
}

/// A unit of work for the parse pool, derived from a successful fetch
#[derive(Debug, Clone)]
pub struct ParseJob {
    pub source: Arc<Source>,
    pub content: Arc<Content>,
    pub submitted_at: DateTime<Utc>,
}

/// Outcome of one parse job
#[derive(Debug)]
pub struct ParseResult {
    pub source: Arc<Source>,
    pub items: Vec<Item>,
    pub parsed_at: DateTime<Utc>,
    pub worker_id: usize,
    pub error: Option<AggregatorError>,
}

impl ParseResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
