use thiserror::Error;

use super::cancel::Cancellation;
use super::fetcher::{FetchError, Fetcher, FetcherConfig};
use super::job::{Item, JobResult};
use super::pool::{PoolConfig, WorkerPool};

/// Errors returned for a whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The URL list was empty; nothing was fetched.
    #[error("no urls provided")]
    NoUrls,
    /// The HTTP client could not be built.
    #[error("failed to set up fetcher: {0}")]
    Setup(FetchError),
    /// The first job to fail, reported verbatim.
    #[error(transparent)]
    Job(#[from] FetchError),
}

/// Collects items from a [`WorkerPool`] with a fail-fast policy.
#[derive(Clone)]
pub struct Aggregator {
    pool: WorkerPool,
}

impl Aggregator {
    /// Aggregates batches run on `pool`.
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    /// Builds an aggregator with its own HTTP client.
    pub fn from_config(pool: PoolConfig, fetcher: &FetcherConfig) -> Result<Self, BatchError> {
        let fetcher = Fetcher::new(fetcher).map_err(BatchError::Setup)?;
        Ok(Self::new(WorkerPool::new(pool, fetcher)))
    }

    /// Fetches every URL and returns all items.
    ///
    /// Items from different feeds arrive in completion order; items from one
    /// feed keep their document order.
    ///
    /// # Errors
    ///
    /// - [`BatchError::NoUrls`] if `urls` is empty (checked before any work)
    /// - [`BatchError::Job`] with the first job error received. Remaining
    ///   work is cancelled and partial items are discarded.
    pub async fn run<I, S>(&self, urls: I, cancel: &Cancellation) -> Result<Vec<Item>, BatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        if urls.is_empty() {
            return Err(BatchError::NoUrls);
        }

        let total = urls.len();
        tracing::info!(feeds = total, "Fetching feeds");

        // Child token so an early return stops our workers without touching
        // the caller's token.
        let batch_cancel = cancel.child();
        let _stop_workers = batch_cancel.drop_guard();

        let (mut results, mut done) = self.pool.run(urls, batch_cancel).into_parts();
        let mut items = Vec::new();

        loop {
            tokio::select! {
                biased;
                Some(result) = results.recv() => accept(&mut items, result)?,
                _ = &mut done => {
                    // Workers have exited; whatever is still queued is final.
                    while let Some(result) = results.recv().await {
                        accept(&mut items, result)?;
                    }
                    break;
                }
            }
        }

        tracing::info!(feeds = total, items = items.len(), "Fetched feeds");
        Ok(items)
    }
}

fn accept(items: &mut Vec<Item>, result: JobResult) -> Result<(), BatchError> {
    match result.result {
        Ok(mut feed_items) => {
            items.append(&mut feed_items);
            Ok(())
        }
        Err(e) => {
            tracing::warn!(url = %result.url, error = %e, "Aborting batch on first error");
            Err(e.into())
        }
    }
}

/// Fetches and decodes `urls` with default settings.
///
/// Shorthand for an [`Aggregator`] built from [`PoolConfig::default`] and
/// [`FetcherConfig::default`].
///
/// ```no_run
/// use std::time::Duration;
/// use feedpool::{parse_urls, Cancellation};
///
/// # async fn example() -> Result<(), feedpool::BatchError> {
/// let cancel = Cancellation::with_timeout(Duration::from_secs(3));
/// let items = parse_urls(
///     ["https://tsn.ua/rss/full.rss", "https://www.pravda.com.ua/rus/rss/"],
///     &cancel,
/// )
/// .await?;
/// for item in items {
///     println!("{}", item.title);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn parse_urls<I, S>(urls: I, cancel: &Cancellation) -> Result<Vec<Item>, BatchError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
    if urls.is_empty() {
        return Err(BatchError::NoUrls);
    }

    Aggregator::from_config(PoolConfig::default(), &FetcherConfig::default())?
        .run(urls, cancel)
        .await
}
