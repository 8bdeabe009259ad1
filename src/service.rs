//! Subscription operations exposed to the command layer.

use thiserror::Error;

use crate::context::AppContext;
use crate::feed::FetchError;
use crate::storage::{AddOutcome, ChatId, RemoveOutcome, StoreError};
use crate::util::{validate_url, UrlValidationError};

#[derive(Debug, Error)]
pub enum SubscribeError {
    /// Rejected before any network or store access
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// Fetching or parsing failed, or the document has no feed link
    #[error("Not a valid feed: {0}")]
    InvalidFeed(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum UnsubscribeError {
    #[error("No subscription at position {0}")]
    OutOfRange(usize),
    #[error("Not subscribed to {0}")]
    NotSubscribed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscribed {
    /// Carries the feed title (falling back to its link) and canonical URL
    Created { title: String, url: String },
    AlreadySubscribed { url: String },
}

/// Which subscription `/del` refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeTarget {
    /// 1-based position in the sorted [`AppContext::list`] output
    Position(usize),
    Url(String),
}

impl AppContext {
    /// Subscribe `chat` to the feed at `url`.
    ///
    /// The feed is fetched once: redirects decide the stored URL, and the newest
    /// entry seeds the delivery marker so nothing already published is sent.
    pub async fn subscribe(&self, chat: ChatId, url: &str) -> Result<Subscribed, SubscribeError> {
        let url = validate_url(url, self.config.allow_private_hosts)?;
        let feed = self.fetcher.fetch(url.as_str()).await?;

        let seed = feed.entries.first().and_then(|e| e.identifier());
        match self
            .store
            .add_subscription(chat, &feed.final_url, seed)
            .await?
        {
            AddOutcome::Created => Ok(Subscribed::Created {
                title: feed.display_title().to_string(),
                url: feed.final_url,
            }),
            AddOutcome::AlreadySubscribed => Ok(Subscribed::AlreadySubscribed {
                url: feed.final_url,
            }),
        }
    }

    /// Remove one subscription of `chat`; returns the removed feed URL
    pub async fn unsubscribe(
        &self,
        chat: ChatId,
        target: UnsubscribeTarget,
    ) -> Result<String, UnsubscribeError> {
        let outcome = match &target {
            UnsubscribeTarget::Position(n) => {
                self.store.remove_subscription_by_position(chat, *n).await?
            }
            UnsubscribeTarget::Url(url) => self.store.remove_subscription(chat, url).await?,
        };
        match (outcome, target) {
            (RemoveOutcome::Removed(url), _) => Ok(url),
            (_, UnsubscribeTarget::Position(n)) => Err(UnsubscribeError::OutOfRange(n)),
            (_, UnsubscribeTarget::Url(url)) => Err(UnsubscribeError::NotSubscribed(url)),
        }
    }

    /// Feed URLs of `chat`, sorted
    pub async fn list(&self, chat: ChatId) -> Result<Vec<String>, StoreError> {
        self.store.list_feeds(chat).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::feed::testing::{fetched, StaticFetcher};
    use crate::feed::FetchedFeed;
    use crate::storage::MemoryStore;
    use crate::transport::testing::ScriptedTransport;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn context(feeds: Vec<(&str, FetchedFeed)>) -> AppContext {
        let fetcher = feeds
            .into_iter()
            .fold(StaticFetcher::default(), |f, (url, feed)| f.with(url, feed));
        AppContext::new(
            Config::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(fetcher),
            Arc::new(ScriptedTransport::default()),
        )
    }

    #[tokio::test]
    async fn test_subscribe_seeds_marker_and_is_idempotent() {
        let ctx = context(vec![(
            "https://example.com/rss",
            fetched("https://example.com/rss", &["e0", "e1"]),
        )]);

        let first = ctx
            .subscribe(ChatId(1), "https://example.com/rss")
            .await
            .unwrap();
        assert_eq!(
            first,
            Subscribed::Created {
                title: "Example".into(),
                url: "https://example.com/rss".into()
            }
        );
        let second = ctx
            .subscribe(ChatId(1), "https://example.com/rss")
            .await
            .unwrap();
        assert!(matches!(second, Subscribed::AlreadySubscribed { .. }));

        assert_eq!(ctx.list(ChatId(1)).await.unwrap().len(), 1);
        assert_eq!(
            ctx.store.subscribers("https://example.com/rss").await.unwrap(),
            vec![ChatId(1)]
        );
        assert_eq!(
            ctx.store
                .marker("https://example.com/rss")
                .await
                .unwrap()
                .as_deref(),
            Some("e0")
        );
    }

    #[tokio::test]
    async fn test_subscribe_stores_redirected_url() {
        let ctx = context(vec![(
            "https://old.example.com/feed",
            fetched("https://example.com/rss", &["e0"]),
        )]);

        ctx.subscribe(ChatId(1), "https://old.example.com/feed")
            .await
            .unwrap();

        assert_eq!(
            ctx.list(ChatId(1)).await.unwrap(),
            vec!["https://example.com/rss"]
        );
    }

    #[tokio::test]
    async fn test_subscribe_rejects_bad_url_without_mutation() {
        let ctx = context(vec![]);
        let err = ctx.subscribe(ChatId(1), "ftp://example.com").await.unwrap_err();
        assert!(matches!(err, SubscribeError::InvalidUrl(_)));

        let err = ctx
            .subscribe(ChatId(1), "http://127.0.0.1/feed")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscribeError::InvalidUrl(_)));
        assert!(ctx.list(ChatId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_rejects_unfetchable_feed() {
        let ctx = context(vec![]);
        let err = ctx
            .subscribe(ChatId(1), "https://example.com/missing")
            .await
            .unwrap_err();
        assert!(matches!(err, SubscribeError::InvalidFeed(_)));
        assert!(ctx.store.feeds_with_subscribers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_empty_feed_leaves_marker_unset() {
        let ctx = context(vec![(
            "https://example.com/rss",
            fetched("https://example.com/rss", &[]),
        )]);
        ctx.subscribe(ChatId(1), "https://example.com/rss")
            .await
            .unwrap();
        assert_eq!(ctx.store.marker("https://example.com/rss").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsubscribe_bounds() {
        let ctx = context(vec![
            ("https://a.example.com/rss", fetched("https://a.example.com/rss", &["a"])),
            ("https://b.example.com/rss", fetched("https://b.example.com/rss", &["b"])),
        ]);
        for url in ["https://a.example.com/rss", "https://b.example.com/rss"] {
            ctx.subscribe(ChatId(1), url).await.unwrap();
        }

        for n in [0, 3] {
            let err = ctx
                .unsubscribe(ChatId(1), UnsubscribeTarget::Position(n))
                .await
                .unwrap_err();
            assert!(matches!(err, UnsubscribeError::OutOfRange(p) if p == n));
        }
        assert_eq!(ctx.list(ChatId(1)).await.unwrap().len(), 2);

        let removed = ctx
            .unsubscribe(ChatId(1), UnsubscribeTarget::Position(2))
            .await
            .unwrap();
        assert_eq!(removed, "https://b.example.com/rss");
        assert_eq!(ctx.store.marker("https://b.example.com/rss").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsubscribe_by_url() {
        let ctx = context(vec![(
            "https://a.example.com/rss",
            fetched("https://a.example.com/rss", &["a"]),
        )]);
        ctx.subscribe(ChatId(1), "https://a.example.com/rss")
            .await
            .unwrap();

        let err = ctx
            .unsubscribe(ChatId(1), UnsubscribeTarget::Url("https://nope.example.com".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, UnsubscribeError::NotSubscribed(_)));

        let removed = ctx
            .unsubscribe(ChatId(1), UnsubscribeTarget::Url("https://a.example.com/rss".into()))
            .await
            .unwrap();
        assert_eq!(removed, "https://a.example.com/rss");
        assert!(ctx.list(ChatId(1)).await.unwrap().is_empty());
    }
}
