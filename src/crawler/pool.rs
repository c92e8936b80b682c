//! Fixed-size worker pool
//!
//! A pool runs `size` copies of one worker function, each with its own id
//! and a shared cancellation token. The pool only tracks lifecycle; what a
//! worker does (and how it reports failures) is up to the worker function.

use parking_lot::Mutex;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct PoolState {
    running: bool,
    cancel: Option<CancellationToken>,
}

/// A named pool of identical async workers
///
/// Lifecycle is `Idle -> Running -> Idle`. Starting a running pool is
/// rejected and logged; `stop` returns the pool to idle once every worker
/// has returned.
#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    size: usize,
    tracker: TaskTracker,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    /// Creates an idle pool; `size` is clamped to at least 1
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let tracker = TaskTracker::new();
        // A closed, empty tracker makes `wait` on an idle pool return at once
        tracker.close();

        Self {
            name: name.into(),
            size: size.max(1),
            tracker,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Launches `size` workers and returns without waiting for them
    ///
    /// Each worker receives its id (`1..=size`) and a child of `token`, so
    /// cancelling either the caller's token or the pool (via [`stop`]) ends
    /// the workers.
    ///
    /// # Returns
    ///
    /// * `true` - The workers were launched
    /// * `false` - The pool was already running; nothing was launched
    ///
    /// [`stop`]: WorkerPool::stop
    pub fn start<F, Fut>(&self, token: &CancellationToken, worker: F) -> bool
    where
        F: Fn(usize, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.running {
            warn!(pool = %self.name, "Worker pool is already running");
            return false;
        }

        let cancel = token.child_token();
        self.tracker.reopen();
        for worker_id in 1..=self.size {
            let task = worker(worker_id, cancel.clone());
            let pool = self.name.clone();
            self.tracker.spawn(async move {
                debug!(pool = %pool, worker_id, "Worker started");
                task.await;
                debug!(pool = %pool, worker_id, "Worker exited");
            });
        }
        self.tracker.close();

        state.running = true;
        state.cancel = Some(cancel);
        info!(pool = %self.name, size = self.size, "Worker pool started");
        true
    }

    /// Cancels the workers and waits until every one of them has returned
    ///
    /// Does nothing beyond waiting when the pool is idle.
    pub async fn stop(&self) {
        let cancel = self.state.lock().cancel.take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        self.tracker.wait().await;

        let mut state = self.state.lock();
        if state.running {
            state.running = false;
            info!(pool = %self.name, "Worker pool stopped");
        }
    }

    /// Waits until every worker has returned, without cancelling them
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
