//! Coordinator: wires the fetch and parse pools together
//!
//! Data flows through four bounded queues:
//!
//! ```text
//! submit -> fetch jobs -> [fetch pool] -> fetch results -> consumer
//!                              |
//!                              +-> parse jobs -> [parse pool] -> parse results -> consumer
//! ```
//!
//! Job queues are sized to the pool they feed, so a full fetch queue blocks
//! the submitter. Every blocking point (queue send and receive, rate limit
//! wait, network request) observes the run's cancellation token.

use crate::config::{Config, Source};
use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::{parse_blocking, ParserRegistry};
use crate::crawler::pool::WorkerPool;
use crate::model::{FetchJob, FetchResult, ParseJob, ParseResult, Stats};
use crate::{AggregatorError, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Sending halves owned by the coordinator; dropping them closes the queues
#[derive(Clone)]
struct Senders {
    fetch_jobs: mpsc::Sender<FetchJob>,
    fetch_results: mpsc::Sender<FetchResult>,
    parse_jobs: mpsc::Sender<ParseJob>,
    parse_results: mpsc::Sender<ParseResult>,
}

/// State shared with every worker
struct Shared {
    fetcher: Fetcher,
    parsers: ParserRegistry,
    fetch_jobs: tokio::sync::Mutex<mpsc::Receiver<FetchJob>>,
    parse_jobs: tokio::sync::Mutex<mpsc::Receiver<ParseJob>>,
    stats: Mutex<Stats>,
}

/// Main coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    shared: Arc<Shared>,
    fetch_pool: WorkerPool,
    parse_pool: WorkerPool,
    senders: Mutex<Option<Senders>>,
    fetch_results: Mutex<Option<mpsc::Receiver<FetchResult>>>,
    parse_results: Mutex<Option<mpsc::Receiver<ParseResult>>>,
    /// Cancelled by `stop` or by the token passed to `start`
    run_token: CancellationToken,
    drainers: TaskTracker,
}

impl Coordinator {
    /// Creates a coordinator with the built-in parsers
    ///
    /// # Arguments
    ///
    /// * `config` - The validated aggregator configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Queues and pools are ready; nothing runs until `start`
    /// * `Err(AggregatorError)` - The HTTP client could not be built
    pub fn new(config: Arc<Config>) -> Result<Self> {
        Self::with_parsers(config, ParserRegistry::with_defaults())
    }

    /// Creates a coordinator with a caller-supplied parser registry
    pub fn with_parsers(config: Arc<Config>, parsers: ParserRegistry) -> Result<Self> {
        let fetchers = config.crawler.max_fetchers.max(1);
        let parsers_count = config.crawler.max_parsers.max(1);

        let (fetch_jobs_tx, fetch_jobs_rx) = mpsc::channel(fetchers);
        let (fetch_results_tx, fetch_results_rx) = mpsc::channel(fetchers);
        let (parse_jobs_tx, parse_jobs_rx) = mpsc::channel(parsers_count);
        let (parse_results_tx, parse_results_rx) = mpsc::channel(parsers_count);

        let shared = Shared {
            fetcher: Fetcher::new(Arc::clone(&config))?,
            parsers,
            fetch_jobs: tokio::sync::Mutex::new(fetch_jobs_rx),
            parse_jobs: tokio::sync::Mutex::new(parse_jobs_rx),
            stats: Mutex::new(Stats::new()),
        };

        let drainers = TaskTracker::new();
        drainers.close();

        Ok(Self {
            config,
            shared: Arc::new(shared),
            fetch_pool: WorkerPool::new("fetcher", fetchers),
            parse_pool: WorkerPool::new("parser", parsers_count),
            senders: Mutex::new(Some(Senders {
                fetch_jobs: fetch_jobs_tx,
                fetch_results: fetch_results_tx,
                parse_jobs: parse_jobs_tx,
                parse_results: parse_results_tx,
            })),
            fetch_results: Mutex::new(Some(fetch_results_rx)),
            parse_results: Mutex::new(Some(parse_results_rx)),
            run_token: CancellationToken::new(),
            drainers,
        })
    }

    /// Starts both worker pools and returns immediately
    ///
    /// Workers run until `token` is cancelled, `stop` is called, or their
    /// job queue closes.
    pub fn start(&self, token: &CancellationToken) -> Result<()> {
        let senders = self
            .senders
            .lock()
            .clone()
            .ok_or(AggregatorError::QueueClosed("fetch job"))?;

        if self.is_running() {
            warn!("Coordinator is already running");
            return Ok(());
        }

        // Link the caller's token to the run; the task ends with whichever fires first
        let run_token = self.run_token.clone();
        let caller = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = caller.cancelled() => run_token.cancel(),
                _ = run_token.cancelled() => {}
            }
        });

        let shared = Arc::clone(&self.shared);
        let fetch_results = senders.fetch_results.clone();
        let parse_jobs = senders.parse_jobs.clone();
        self.fetch_pool.start(&self.run_token, move |worker_id, cancel| {
            fetch_worker(
                Arc::clone(&shared),
                worker_id,
                cancel,
                fetch_results.clone(),
                parse_jobs.clone(),
            )
        });

        let shared = Arc::clone(&self.shared);
        let parse_results = senders.parse_results;
        self.parse_pool.start(&self.run_token, move |worker_id, cancel| {
            parse_worker(Arc::clone(&shared), worker_id, cancel, parse_results.clone())
        });

        info!(
            fetchers = self.fetch_pool.size(),
            parsers = self.parse_pool.size(),
            "Coordinator started"
        );
        Ok(())
    }

    /// Submits the first page of a source
    pub async fn submit_fetch_job(&self, source: Arc<Source>) -> Result<()> {
        self.submit_job(FetchJob::for_source(source)?).await
    }

    /// Submits one fetch job for every page of a source
    ///
    /// # Returns
    ///
    /// The number of jobs submitted
    pub async fn submit_source_pages(&self, source: Arc<Source>) -> Result<usize> {
        let urls = source.page_urls()?;
        let count = urls.len();
        for url in urls {
            self.submit_job(FetchJob::new(Arc::clone(&source), url))
                .await?;
        }
        Ok(count)
    }

    /// Pushes a fetch job, waiting while the queue is full
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The job is queued
    /// * `Err(AggregatorError::Cancelled)` - The run was cancelled while waiting
    /// * `Err(AggregatorError::QueueClosed)` - The coordinator has been stopped
    pub async fn submit_job(&self, job: FetchJob) -> Result<()> {
        let sender = self
            .senders
            .lock()
            .as_ref()
            .map(|s| s.fetch_jobs.clone())
            .ok_or(AggregatorError::QueueClosed("fetch job"))?;
        let token = &self.run_token;

        // Counted before the send so a fast worker never reports more
        // processed than submitted
        self.shared.stats.lock().record_submitted();

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => Err(AggregatorError::Cancelled("submitting fetch job")),
            sent = sender.send(job) => sent.map_err(|_| AggregatorError::QueueClosed("fetch job")),
        };

        if sent.is_err() {
            let mut stats = self.shared.stats.lock();
            stats.total_sources = stats.total_sources.saturating_sub(1);
        }
        sent
    }

    /// Hands the fetch result queue to a downstream consumer
    ///
    /// Returns `None` once taken (or once `wait` started draining it).
    pub fn take_fetch_results(&self) -> Option<mpsc::Receiver<FetchResult>> {
        self.fetch_results.lock().take()
    }

    /// Hands the parse result queue to a downstream consumer
    pub fn take_parse_results(&self) -> Option<mpsc::Receiver<ParseResult>> {
        self.parse_results.lock().take()
    }

    /// Drains every result queue nobody has taken, in the background
    ///
    /// The drainers log each outcome and end when their queue closes; `stop`
    /// waits for them. Statistics are already counted by the workers.
    pub fn wait(&self) {
        if let Some(mut results) = self.take_fetch_results() {
            self.drainers.reopen();
            self.drainers.spawn(async move {
                while let Some(result) = results.recv().await {
                    match &result.error {
                        Some(e) => warn!(source = %result.source.name, url = %result.url, error = %e, "Fetch failed"),
                        None => debug!(source = %result.source.name, url = %result.url, "Fetch succeeded"),
                    }
                }
            });
        }

        if let Some(mut results) = self.take_parse_results() {
            self.drainers.reopen();
            self.drainers.spawn(async move {
                while let Some(result) = results.recv().await {
                    match &result.error {
                        Some(e) => warn!(source = %result.source.name, error = %e, "Parse failed"),
                        None => debug!(source = %result.source.name, items = result.items.len(), "Parse succeeded"),
                    }
                }
            });
        }

        self.drainers.close();
    }

    /// Stops both pools, closes every queue and timestamps the run
    ///
    /// Pending submissions fail with `Cancelled`; later ones with `QueueClosed`.
    pub async fn stop(&self) {
        self.run_token.cancel();
        self.fetch_pool.stop().await;
        self.parse_pool.stop().await;

        drop(self.senders.lock().take());
        self.drainers.wait().await;

        self.shared.stats.lock().mark_finished();
        info!("Coordinator stopped");
    }

    /// Returns a snapshot of the statistics
    pub fn stats(&self) -> Stats {
        self.shared.stats.lock().clone()
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.shared.fetcher
    }

    pub fn is_running(&self) -> bool {
        self.fetch_pool.is_running() || self.parse_pool.is_running()
    }
}

/// Sends on a queue unless the token fires first
///
/// Returns false when cancelled. A closed queue drops the value.
async fn send_or_cancel<T>(cancel: &CancellationToken, queue: &mpsc::Sender<T>, value: T) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = queue.send(value) => {
            if sent.is_err() {
                debug!("Queue closed, dropping value");
            }
            true
        }
    }
}

async fn fetch_worker(
    shared: Arc<Shared>,
    worker_id: usize,
    cancel: CancellationToken,
    results: mpsc::Sender<FetchResult>,
    parse_jobs: mpsc::Sender<ParseJob>,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(worker_id, "Fetch worker stopping: cancelled");
                return;
            }
            job = async { shared.fetch_jobs.lock().await.recv().await } => job,
        };

        let Some(job) = job else {
            debug!(worker_id, "Fetch worker stopping: queue closed");
            return;
        };

        let result = shared.process_fetch(&cancel, job, worker_id).await;
        let parse_job = result.parse_job();

        if !send_or_cancel(&cancel, &results, result).await {
            debug!(worker_id, "Fetch worker cancelled while sending result");
            return;
        }

        if let Some(parse_job) = parse_job {
            if !send_or_cancel(&cancel, &parse_jobs, parse_job).await {
                debug!(worker_id, "Fetch worker cancelled while submitting parse job");
                return;
            }
        }
    }
}

async fn parse_worker(
    shared: Arc<Shared>,
    worker_id: usize,
    cancel: CancellationToken,
    results: mpsc::Sender<ParseResult>,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(worker_id, "Parse worker stopping: cancelled");
                return;
            }
            job = async { shared.parse_jobs.lock().await.recv().await } => job,
        };

        let Some(job) = job else {
            debug!(worker_id, "Parse worker stopping: queue closed");
            return;
        };

        let result = shared.process_parse(&cancel, job, worker_id).await;

        if !send_or_cancel(&cancel, &results, result).await {
            debug!(worker_id, "Parse worker cancelled while sending result");
            return;
        }
    }
}

impl Shared {
    async fn process_fetch(
        &self,
        cancel: &CancellationToken,
        job: FetchJob,
        worker_id: usize,
    ) -> FetchResult {
        debug!(worker_id, source = %job.source.name, url = %job.url, "Fetching");

        let (content, error) = match self.fetcher.fetch_url(cancel, &job.source, &job.url).await {
            Ok(content) => (Some(Arc::new(content)), None),
            Err(e) => {
                if e.is_cancelled() {
                    debug!(worker_id, url = %job.url, "Fetch cancelled");
                } else {
                    warn!(worker_id, source = %job.source.name, url = %job.url, error = %e, "Fetch failed");
                }
                (None, Some(e))
            }
        };

        self.stats.lock().record_fetch(error.is_none());

        FetchResult {
            source: job.source,
            url: job.url,
            content,
            fetched_at: Utc::now(),
            worker_id,
            error,
            metadata: job.metadata,
        }
    }

    async fn process_parse(
        &self,
        cancel: &CancellationToken,
        job: ParseJob,
        worker_id: usize,
    ) -> ParseResult {
        let source = Arc::clone(&job.source);
        debug!(worker_id, source = %source.name, parser = %source.parser, "Parsing");

        let outcome = match self.parsers.get(source.parser) {
            None => Err(AggregatorError::NoParser {
                kind: source.parser.to_string(),
            }),
            Some(parser) => tokio::select! {
                _ = cancel.cancelled() => Err(AggregatorError::Cancelled("parsing")),
                parsed = parse_blocking(parser, Arc::clone(&job.content), Arc::clone(&source)) => {
                    parsed.map_err(AggregatorError::from)
                }
            },
        };

        let (items, error) = match outcome {
            Ok(items) => (items, None),
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(worker_id, source = %source.name, error = %e, "Parse failed");
                }
                (Vec::new(), Some(e))
            }
        };

        self.stats.lock().record_parse(error.is_none());

        ParseResult {
            source,
            items,
            parsed_at: Utc::now(),
            worker_id,
            error,
        }
    }
}
