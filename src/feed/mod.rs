//! Feed retrieval and change detection.
//!
//! - [`parser`] - RSS/Atom parsing using the `feed-rs` crate
//! - [`fetcher`] - HTTP fetching with retries, size limits and redirect tracking
//! - [`differ`] - Which entries are new relative to a stored marker

mod differ;
mod fetcher;
mod parser;

pub use differ::{diff_entries, Diff};
pub use fetcher::{http_client, FeedFetcher, FetchError, FetchedFeed, HttpFeedFetcher};
pub use parser::{parse_feed, Entry, ParsedFeed};
