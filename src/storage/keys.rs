//! Key layout inside the key-value store.
//!
//! The layout is kept compatible with existing deployments:
//!
//! - `{prefix}:{chat_id}` → set of feed URLs the chat is subscribed to
//! - `{prefix}:{feed_url}:subs` → set of subscriber chat ids
//! - `{prefix}:{feed_url}:last_entry` → marker of the newest delivered entry

use super::kv::MemberKey;
use super::types::ChatId;

pub const DEFAULT_PREFIX: &str = "pythonbot:rss";

const SUBS_SUFFIX: &str = ":subs";
const MARKER_SUFFIX: &str = ":last_entry";

#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn chat(&self, chat: ChatId) -> String {
        format!("{}:{}", self.prefix, chat)
    }

    pub fn subscribers(&self, feed_url: &str) -> String {
        format!("{}:{}{}", self.prefix, feed_url, SUBS_SUFFIX)
    }

    pub fn marker(&self, feed_url: &str) -> String {
        format!("{}:{}{}", self.prefix, feed_url, MARKER_SUFFIX)
    }

    /// `{prefix}:{feed_url}:subs` as a template over feed URLs
    pub(crate) fn subscribers_by_feed(&self) -> MemberKey {
        MemberKey {
            prefix: format!("{}:", self.prefix),
            suffix: SUBS_SUFFIX.to_string(),
        }
    }

    /// `{prefix}:{feed_url}:last_entry` as a template over feed URLs
    pub(crate) fn marker_by_feed(&self) -> MemberKey {
        MemberKey {
            prefix: format!("{}:", self.prefix),
            suffix: MARKER_SUFFIX.to_string(),
        }
    }

    /// Prefix and suffix matching every subscriber-set key
    pub(crate) fn subscribers_pattern(&self) -> (String, &'static str) {
        (format!("{}:", self.prefix), SUBS_SUFFIX)
    }

    /// Extract the feed URL from a `{prefix}:{feed_url}:subs` key
    pub fn feed_from_subscribers_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .and_then(|rest| rest.strip_suffix(SUBS_SUFFIX))
            .filter(|url| !url.is_empty())
    }
}
