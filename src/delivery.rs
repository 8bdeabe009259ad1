//! Delivery of new entries to every subscriber of a feed.
//!
//! Each send is classified by its [`SendOutcome`] and the subscription store is
//! updated accordingly: blocked chats are purged, migrated chats are renamed and
//! retried once, everything else is logged and left for the next entry. A store
//! failure while reacting to one chat is counted and never stops the others.

use std::sync::Arc;

use crate::content::render_entry;
use crate::feed::{Diff, FetchedFeed};
use crate::storage::{ChatId, StoreError, SubscriptionStore};
use crate::transport::{MessagingTransport, SendOutcome};

/// Per-feed delivery counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    /// Chats removed after the transport reported them unreachable
    pub purged: usize,
    pub migrated: usize,
    /// Timeouts, rejections and failed migration retries
    pub failed: usize,
}

impl DeliveryReport {
    pub fn merge(&mut self, other: DeliveryReport) {
        self.sent += other.sent;
        self.purged += other.purged;
        self.migrated += other.migrated;
        self.failed += other.failed;
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: SubscriptionStore,
    transport: Arc<dyn MessagingTransport>,
}

impl Dispatcher {
    pub fn new(store: SubscriptionStore, transport: Arc<dyn MessagingTransport>) -> Self {
        Self { store, transport }
    }

    /// Send the diff's new entries (oldest first) to the current subscribers of
    /// `feed_url`, then settle the feed's marker.
    ///
    /// Subscribers are re-read for every entry so purges and renames made while
    /// delivering the previous entry are honoured. If no subscriber is left at the
    /// end the marker is deleted instead of advanced.
    pub async fn deliver(
        &self,
        feed_url: &str,
        feed: &FetchedFeed,
        diff: &Diff<'_>,
    ) -> Result<DeliveryReport, StoreError> {
        let mut report = DeliveryReport::default();

        for entry in diff.oldest_first() {
            let message = render_entry(entry, feed.display_title(), &feed.link);
            for chat in self.store.subscribers(feed_url).await? {
                self.deliver_one(feed_url, chat, &message, &mut report)
                    .await;
            }
        }

        if !self.store.has_subscribers(feed_url).await? {
            tracing::debug!(feed = %feed_url, "No subscribers left, dropping marker");
            self.store.delete_marker(feed_url).await?;
        } else if let Some(marker) = &diff.next_marker {
            self.store.set_marker(feed_url, marker).await?;
        }

        Ok(report)
    }

    async fn deliver_one(
        &self,
        feed_url: &str,
        chat: ChatId,
        message: &str,
        report: &mut DeliveryReport,
    ) {
        match self.transport.send(chat, message, true).await {
            SendOutcome::Success => report.sent += 1,
            SendOutcome::Unauthorized => {
                tracing::warn!(chat = %chat, feed = %feed_url, "Chat unreachable, removing all its subscriptions");
                match self.store.purge_chat(chat).await {
                    Ok(()) => report.purged += 1,
                    Err(e) => {
                        tracing::error!(chat = %chat, feed = %feed_url, error = %e, "Failed to purge unreachable chat");
                        report.failed += 1;
                    }
                }
            }
            SendOutcome::Migrated(new_chat) => {
                tracing::info!(old = %chat, new = %new_chat, "Chat migrated");
                match self.store.rename_chat(chat, new_chat).await {
                    Ok(()) => report.migrated += 1,
                    Err(e) => {
                        // The retry below still reaches the chat under its new id
                        tracing::error!(old = %chat, new = %new_chat, error = %e, "Failed to record chat migration");
                        report.failed += 1;
                    }
                }
                // A single retry; whatever it returns is only logged
                match self.transport.send(new_chat, message, true).await {
                    SendOutcome::Success => report.sent += 1,
                    outcome => {
                        tracing::warn!(chat = %new_chat, feed = %feed_url, ?outcome, "Retry after migration failed");
                        report.failed += 1;
                    }
                }
            }
            SendOutcome::TimedOut => {
                tracing::debug!(chat = %chat, feed = %feed_url, "Send timed out");
                report.failed += 1;
            }
            SendOutcome::BadRequest(reason) => {
                tracing::error!(chat = %chat, feed = %feed_url, reason = %reason, "Send rejected");
                report.failed += 1;
            }
        }
    }
}
