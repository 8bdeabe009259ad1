//! Messaging transport seam.
//!
//! Delivery and command handling only talk to [`MessagingTransport`]; the
//! teloxide-backed [`TelegramTransport`] is the production implementation.

pub mod telegram;

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::ChatId;

pub use telegram::{connect, TelegramTransport};

/// Per-recipient result of a send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Success,
    /// The bot was blocked, kicked, or the chat no longer exists
    Unauthorized,
    /// The group was upgraded; the chat now lives under a new id
    Migrated(ChatId),
    /// Timeouts, rate limits, server-side and connection failures
    TimedOut,
    /// The request was rejected for any other reason
    BadRequest(String),
}

/// Bot's role in a chat, as reported by `getChatMember`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

/// Failure of a non-delivery API call. The text never contains the bot token.
#[derive(Debug, Error)]
#[error("Telegram request failed: {0}")]
pub struct TransportError(pub String);

/// Sends messages and answers chat lookups for the command layer.
#[async_trait]
pub trait MessagingTransport: Send + Sync + 'static {
    async fn send(&self, chat: ChatId, html: &str, disable_preview: bool) -> SendOutcome;

    /// Look up a chat by `@username`. `Ok(None)` if it does not exist.
    async fn resolve_chat(&self, name: &str) -> Result<Option<ChatId>, TransportError>;

    async fn membership(&self, chat: ChatId, user_id: u64) -> Result<MemberStatus, TransportError>;

    /// Show a "typing…" indicator while a slow command runs. Best effort.
    async fn typing(&self, _chat: ChatId) {}
}
