//! Concurrent RSS 2.0 aggregation.
//!
//! Fetches many feeds through a bounded worker pool, decodes each one
//! (transcoding windows-1251 documents to UTF-8 on the way) and collects the
//! items, failing the whole batch on the first error.
//!
//! ```no_run
//! use std::time::Duration;
//! use feedpool::{parse_urls, Cancellation};
//!
//! # async fn example() -> Result<(), feedpool::BatchError> {
//! let cancel = Cancellation::with_timeout(Duration::from_secs(3));
//! let items = parse_urls(["https://example.com/rss"], &cancel).await?;
//! println!("{} items", items.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod feed;

pub use config::{Config, ConfigError};
pub use feed::{parse_urls, Aggregator, BatchError, Cancellation, FetchError, HttpError, Item};
