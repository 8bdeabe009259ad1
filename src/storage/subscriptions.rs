use std::sync::Arc;

use super::keys::KeySpace;
use super::kv::{KvOp, KvStore};
use super::types::{AddOutcome, ChatId, RemoveOutcome, StoreError};

/// Bidirectional chat ↔ feed relation plus per-feed delivery markers.
///
/// Every relation change touches both `chat→feeds` and `feed→chats` in one
/// atomic batch, and every removal that can empty a subscriber set carries a
/// `DeleteIfEmpty` for the feed's marker, so a marker never outlives the last
/// subscriber.
#[derive(Clone)]
pub struct SubscriptionStore {
    kv: Arc<dyn KvStore>,
    keys: KeySpace,
}

impl SubscriptionStore {
    pub fn new(kv: Arc<dyn KvStore>, keys: KeySpace) -> Self {
        Self { kv, keys }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    // ========================================================================
    // Relation
    // ========================================================================

    /// Subscribe `chat` to `feed_url`.
    ///
    /// When `seed_marker` is given and the feed has no marker yet, the marker is
    /// written in the same batch. An existing marker is never overwritten, since
    /// other chats may already be subscribed at a later delivery position.
    pub async fn add_subscription(
        &self,
        chat: ChatId,
        feed_url: &str,
        seed_marker: Option<&str>,
    ) -> Result<AddOutcome, StoreError> {
        let chat_key = self.keys.chat(chat);
        if self.kv.is_member(&chat_key, feed_url).await? {
            return Ok(AddOutcome::AlreadySubscribed);
        }

        let mut ops = Vec::with_capacity(3);
        if let Some(marker) = seed_marker {
            ops.push(KvOp::SetIfAbsent {
                key: self.keys.marker(feed_url),
                value: marker.to_string(),
            });
        }
        ops.push(KvOp::AddMember {
            key: self.keys.subscribers(feed_url),
            member: chat.to_string(),
        });
        ops.push(KvOp::AddMember {
            key: chat_key,
            member: feed_url.to_string(),
        });
        self.kv.apply(ops).await?;

        tracing::info!(chat = %chat, feed = %feed_url, "Subscription created");
        Ok(AddOutcome::Created)
    }

    /// Feeds the chat is subscribed to, in ascending URL order.
    ///
    /// The order is deterministic, so positions shown to a user stay valid for
    /// [`remove_subscription_by_position`](Self::remove_subscription_by_position)
    /// as long as the set is not modified in between.
    pub async fn list_feeds(&self, chat: ChatId) -> Result<Vec<String>, StoreError> {
        self.kv.members(&self.keys.chat(chat)).await
    }

    pub async fn is_subscribed(&self, chat: ChatId, feed_url: &str) -> Result<bool, StoreError> {
        self.kv.is_member(&self.keys.chat(chat), feed_url).await
    }

    /// Chat ids subscribed to the feed. Members that are not numeric are skipped.
    pub async fn subscribers(&self, feed_url: &str) -> Result<Vec<ChatId>, StoreError> {
        let members = self.kv.members(&self.keys.subscribers(feed_url)).await?;
        Ok(members
            .into_iter()
            .filter_map(|m| match m.parse::<ChatId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(feed = %feed_url, member = %m, "Ignoring non-numeric subscriber");
                    None
                }
            })
            .collect())
    }

    pub async fn has_subscribers(&self, feed_url: &str) -> Result<bool, StoreError> {
        self.kv.exists(&self.keys.subscribers(feed_url)).await
    }

    /// Every feed URL that currently has at least one subscriber
    pub async fn feeds_with_subscribers(&self) -> Result<Vec<String>, StoreError> {
        let (prefix, suffix) = self.keys.subscribers_pattern();
        let keys = self.kv.keys(&prefix, suffix).await?;
        Ok(keys
            .iter()
            .filter_map(|k| self.keys.feed_from_subscribers_key(k))
            .map(str::to_string)
            .collect())
    }

    /// Remove the subscription at 1-based `position` of [`list_feeds`](Self::list_feeds).
    ///
    /// Position 0 and positions past the end return `OutOfRange` without mutating.
    pub async fn remove_subscription_by_position(
        &self,
        chat: ChatId,
        position: usize,
    ) -> Result<RemoveOutcome, StoreError> {
        let feeds = self.list_feeds(chat).await?;
        let Some(feed_url) = position.checked_sub(1).and_then(|i| feeds.get(i)) else {
            return Ok(RemoveOutcome::OutOfRange);
        };
        self.unlink(chat, feed_url).await?;
        Ok(RemoveOutcome::Removed(feed_url.clone()))
    }

    /// Remove the subscription of `chat` to `feed_url`
    pub async fn remove_subscription(
        &self,
        chat: ChatId,
        feed_url: &str,
    ) -> Result<RemoveOutcome, StoreError> {
        if !self.is_subscribed(chat, feed_url).await? {
            return Ok(RemoveOutcome::NotSubscribed);
        }
        self.unlink(chat, feed_url).await?;
        Ok(RemoveOutcome::Removed(feed_url.to_string()))
    }

    async fn unlink(&self, chat: ChatId, feed_url: &str) -> Result<(), StoreError> {
        let subs_key = self.keys.subscribers(feed_url);
        self.kv
            .apply(vec![
                KvOp::RemoveMember {
                    key: self.keys.chat(chat),
                    member: feed_url.to_string(),
                },
                KvOp::RemoveMember {
                    key: subs_key.clone(),
                    member: chat.to_string(),
                },
                KvOp::DeleteIfEmpty {
                    set: subs_key,
                    key: self.keys.marker(feed_url),
                },
            ])
            .await?;
        tracing::info!(chat = %chat, feed = %feed_url, "Subscription removed");
        Ok(())
    }

    /// Rewrite a chat's identity after a migration.
    ///
    /// Moves the chat's feed set to `new` and swaps `old` for `new` in every
    /// subscriber set it appears in. If `new` already has subscriptions the two
    /// sets are merged. The feed set is read inside the same atomic batch.
    pub async fn rename_chat(&self, old: ChatId, new: ChatId) -> Result<(), StoreError> {
        if old == new {
            return Ok(());
        }
        self.kv
            .apply(vec![KvOp::MoveAll {
                from: self.keys.chat(old),
                to: self.keys.chat(new),
                old: old.to_string(),
                new: new.to_string(),
                reverse: self.keys.subscribers_by_feed(),
            }])
            .await?;
        tracing::info!(old = %old, new = %new, "Chat renamed");
        Ok(())
    }

    /// Remove every subscription of `chat`.
    ///
    /// Markers of feeds left without subscribers are deleted in the same batch,
    /// and the feed set is read inside it, so a subscription added concurrently
    /// is removed from both sides too.
    pub async fn purge_chat(&self, chat: ChatId) -> Result<(), StoreError> {
        self.kv
            .apply(vec![KvOp::DetachAll {
                set: self.keys.chat(chat),
                member: chat.to_string(),
                reverse: self.keys.subscribers_by_feed(),
                cleanup: self.keys.marker_by_feed(),
            }])
            .await?;
        tracing::info!(chat = %chat, "Chat purged");
        Ok(())
    }

    // ========================================================================
    // Markers
    // ========================================================================

    pub async fn marker(&self, feed_url: &str) -> Result<Option<String>, StoreError> {
        self.kv.get(&self.keys.marker(feed_url)).await
    }

    pub async fn set_marker(&self, feed_url: &str, marker: &str) -> Result<(), StoreError> {
        self.kv.set(&self.keys.marker(feed_url), marker).await
    }

    pub async fn delete_marker(&self, feed_url: &str) -> Result<(), StoreError> {
        self.kv.delete(&self.keys.marker(feed_url)).await
    }
}
