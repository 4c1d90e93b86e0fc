//! Concurrent RSS 2.0 fetching and decoding.
//!
//! - [`charset`] - Charset hook that turns declared encodings into UTF-8
//! - [`parser`] - Format detection and RSS 2.0 decoding with `quick-xml`
//! - [`fetcher`] - Cancellable single-GET HTTP retrieval
//! - [`pool`] - Bounded worker pool producing one result per URL
//! - [`aggregate`] - Fail-fast collection of results into items
//!
//! # Example
//!
//! ```ignore
//! use feedpool::feed::{parse_urls, Cancellation};
//!
//! let cancel = Cancellation::with_timeout(Duration::from_secs(3));
//! let items = parse_urls(["https://example.com/rss"], &cancel).await?;
//! ```

mod aggregate;
mod cancel;
mod charset;
mod fetcher;
mod job;
mod parser;
mod pool;

pub use aggregate::{parse_urls, Aggregator, BatchError};
pub use cancel::Cancellation;
pub use charset::{CharsetDecoder, CharsetError, DefaultCharsets};
pub use fetcher::{FetchError, Fetcher, FetcherConfig, HttpError};
pub use job::{Item, Job, JobResult};
pub use parser::{
    detect_format, parse_date, parse_feed, parse_feed_with, Entry, Feed, FeedFormat, ParseError,
};
pub use pool::{Batch, PoolConfig, WorkerPool, DEFAULT_MAX_WORKERS};
