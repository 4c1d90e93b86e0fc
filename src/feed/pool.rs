//! Bounded worker pool that turns URLs into a stream of [`JobResult`]s.
//!
//! A loader task feeds one [`Job`] per URL into the job queue and closes it.
//! A fixed number of workers pull from that queue and push exactly one
//! result per job into the result queue. Both queues are bounded by the
//! worker count, so a slow consumer applies backpressure to the workers.
//!
//! Completion is signalled separately from the result queue: the `done`
//! receiver fires once every worker has exited, whether the queue drained or
//! the batch was cancelled.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;

use super::cancel::Cancellation;
use super::charset::{CharsetDecoder, DefaultCharsets};
use super::fetcher::Fetcher;
use super::job::{Job, JobResult};

/// Upper bound on concurrent workers when none is configured.
pub const DEFAULT_MAX_WORKERS: usize = 32;

/// Sizing for a [`WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Fixed worker count; 0 means one worker per URL.
    pub workers: usize,
    /// Cap applied to the worker count to avoid unbounded fan-out.
    pub max_workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl PoolConfig {
    /// Number of workers to spawn for a batch of `jobs` URLs.
    pub fn worker_count(&self, jobs: usize) -> usize {
        let wanted = if self.workers == 0 { jobs } else { self.workers };
        wanted.clamp(1, self.max_workers.max(1))
    }
}

/// Receiving side of a running batch.
pub struct Batch {
    results: mpsc::Receiver<JobResult>,
    done: oneshot::Receiver<()>,
    workers: usize,
}

impl Batch {
    /// Number of workers serving this batch.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Next result in completion order, or `None` once all workers exited.
    pub async fn recv(&mut self) -> Option<JobResult> {
        self.results.recv().await
    }

    /// Splits into the result stream and the completion signal.
    pub fn into_parts(self) -> (mpsc::Receiver<JobResult>, oneshot::Receiver<()>) {
        (self.results, self.done)
    }
}

/// Runs fetch+decode jobs across a fixed set of Tokio tasks.
#[derive(Clone)]
pub struct WorkerPool {
    config: PoolConfig,
    fetcher: Fetcher,
    charsets: Arc<dyn CharsetDecoder>,
}

impl WorkerPool {
    /// Creates a pool that decodes with [`DefaultCharsets`].
    ///
    /// # Arguments
    ///
    /// * `config` - Worker count settings, applied per batch
    /// * `fetcher` - HTTP client shared by every worker
    pub fn new(config: PoolConfig, fetcher: Fetcher) -> Self {
        Self {
            config,
            fetcher,
            charsets: Arc::new(DefaultCharsets),
        }
    }

    /// Replaces the charset hook handed to the feed decoder.
    pub fn with_charsets(mut self, charsets: Arc<dyn CharsetDecoder>) -> Self {
        self.charsets = charsets;
        self
    }

    /// Worker settings this pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Starts a batch and returns immediately.
    ///
    /// Must be called from within a Tokio runtime. Results arrive in
    /// completion order, not input order. Each pulled job yields one result;
    /// a worker that observes cancellation while idle yields one result
    /// carrying the cancellation error and exits.
    pub fn run(&self, urls: Vec<String>, cancel: Cancellation) -> Batch {
        let workers = self.config.worker_count(urls.len());
        let (job_tx, job_rx) = mpsc::channel::<Job>(workers);
        let (result_tx, result_rx) = mpsc::channel::<JobResult>(workers);
        let (done_tx, done_rx) = oneshot::channel();

        tracing::debug!(jobs = urls.len(), workers = workers, "Starting worker pool");

        tokio::spawn(load_jobs(urls, job_tx, cancel.clone()));

        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut set = JoinSet::new();
        for id in 0..workers {
            set.spawn(worker(
                id,
                Arc::clone(&job_rx),
                result_tx.clone(),
                self.fetcher.clone(),
                Arc::clone(&self.charsets),
                cancel.clone(),
            ));
        }
        // The result queue closes when the last worker drops its sender.
        drop(result_tx);

        tokio::spawn(async move {
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "Worker task ended abnormally");
                }
            }
            tracing::debug!("All workers finished");
            let _ = done_tx.send(());
        });

        Batch {
            results: result_rx,
            done: done_rx,
            workers,
        }
    }
}

async fn load_jobs(urls: Vec<String>, jobs: mpsc::Sender<Job>, cancel: Cancellation) {
    for url in urls {
        tokio::select! {
            biased;
            reason = cancel.done() => {
                tracing::debug!(error = %reason, "Stopped loading jobs");
                return;
            }
            sent = jobs.send(Job::new(url)) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

async fn worker(
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<JobResult>,
    fetcher: Fetcher,
    charsets: Arc<dyn CharsetDecoder>,
    cancel: Cancellation,
) {
    loop {
        let next = tokio::select! {
            biased;
            reason = cancel.done() => Err(reason),
            job = next_job(&jobs) => Ok(job),
        };

        let job = match next {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(reason) => {
                tracing::debug!(worker = id, error = %reason, "Worker cancelled");
                let _ = results.send(JobResult::cancelled(reason)).await;
                return;
            }
        };

        tracing::debug!(worker = id, url = %job.url(), "Running job");
        let result = job.execute(&fetcher, charsets.as_ref(), &cancel).await;

        if results.send(result).await.is_err() {
            tracing::debug!(worker = id, "Result receiver dropped, stopping");
            return;
        }
    }
}

async fn next_job(jobs: &Mutex<mpsc::Receiver<Job>>) -> Option<Job> {
    jobs.lock().await.recv().await
}
