use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cancel::Cancellation;
use super::charset::CharsetDecoder;
use super::fetcher::{FetchError, Fetcher};
use super::parser::{parse_date, parse_feed_with, Feed};

/// A normalized entry from one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub title: String,
    /// Title of the channel the item came from.
    pub source: String,
    /// URL the feed was fetched from.
    pub source_url: String,
    pub link: String,
    /// `pubDate` in UTC, or the time of decoding when it could not be parsed.
    pub publish_date: DateTime<Utc>,
    pub description: String,
}

impl Item {
    /// Flattens a decoded feed into items attributed to `source_url`.
    pub fn from_feed(feed: Feed, source_url: &str) -> Vec<Item> {
        let source = feed.title;
        feed.entries
            .into_iter()
            .map(|entry| Item {
                title: entry.title,
                source: source.clone(),
                source_url: source_url.to_string(),
                link: entry.link,
                publish_date: parse_date(&entry.pub_date),
                description: entry.description,
            })
            .collect()
    }
}

/// Fetch and decode one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    url: String,
}

/// Outcome of a single [`Job`]: either the feed's items or the error.
#[derive(Debug)]
pub struct JobResult {
    /// URL of the job that produced this result; empty when an idle worker
    /// reports cancellation before pulling a job
    pub url: String,
    /// Items in document order, or the error that occurred
    pub result: Result<Vec<Item>, FetchError>,
}

impl Job {
    /// Creates a job for `url`. The URL is validated when the job runs.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The feed URL this job fetches.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Runs the job to completion. Never panics on feed errors; failures are
    /// carried in the returned [`JobResult`].
    pub async fn execute(
        self,
        fetcher: &Fetcher,
        charsets: &dyn CharsetDecoder,
        cancel: &Cancellation,
    ) -> JobResult {
        let result = self.fetch_items(fetcher, charsets, cancel).await;

        match &result {
            Ok(items) => tracing::debug!(url = %self.url, items = items.len(), "Job finished"),
            Err(e) if e.is_cancellation() => {
                tracing::debug!(url = %self.url, error = %e, "Job cancelled")
            }
            Err(e) => tracing::warn!(url = %self.url, error = %e, "Job failed"),
        }

        JobResult {
            url: self.url,
            result,
        }
    }

    async fn fetch_items(
        &self,
        fetcher: &Fetcher,
        charsets: &dyn CharsetDecoder,
        cancel: &Cancellation,
    ) -> Result<Vec<Item>, FetchError> {
        let body = fetcher.fetch(&self.url, cancel).await?;
        let feed = parse_feed_with(&body, charsets)?;
        Ok(Item::from_feed(feed, &self.url))
    }
}

impl JobResult {
    /// A result for a job that was never pulled because the batch stopped.
    pub(crate) fn cancelled(reason: FetchError) -> Self {
        Self {
            url: String::new(),
            result: Err(reason),
        }
    }
}
