//! Telegram transport over `teloxide`.
//!
//! All teloxide request and error types stay inside this module; the rest of
//! the crate sees [`SendOutcome`], [`MemberStatus`] and [`TransportError`].

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use teloxide::payloads::SendMessageSetters;
use teloxide::requests::Requester;
use teloxide::types::{
    ChatAction, ChatMemberStatus, LinkPreviewOptions, ParseMode, Recipient, UserId,
};
use teloxide::{ApiError, Bot, RequestError};

use super::{MemberStatus, MessagingTransport, SendOutcome, TransportError};
use crate::bot::BotIdentity;
use crate::storage::ChatId;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Build a bot client talking to `api_url`.
pub fn connect(token: &SecretString, api_url: &str) -> Result<Bot, url::ParseError> {
    let api_url = url::Url::parse(api_url)?;
    Ok(Bot::new(token.expose_secret()).set_api_url(api_url))
}

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// `getMe`: the bot's own account
    pub async fn identity(&self) -> Result<BotIdentity, TransportError> {
        let me = self.bot.get_me().await.map_err(|e| self.error(e))?;
        Ok(BotIdentity {
            id: me.user.id.0,
            username: me.user.username.clone().unwrap_or_default(),
        })
    }

    /// Error text with the bot token masked
    pub fn describe(&self, err: &RequestError) -> String {
        let text = err.to_string();
        let token = self.bot.token();
        if token.is_empty() {
            text
        } else {
            text.replace(token, "<token>")
        }
    }

    fn error(&self, err: RequestError) -> TransportError {
        TransportError(self.describe(&err))
    }

    /// Map a failed `sendMessage` onto the delivery outcome classes
    fn send_outcome(&self, err: RequestError) -> SendOutcome {
        match err {
            RequestError::MigrateToChatId(new_id) => SendOutcome::Migrated(ChatId(new_id.0)),
            RequestError::Api(ref api) if is_forbidden(api) => SendOutcome::Unauthorized,
            RequestError::RetryAfter(_) | RequestError::Network(_) => SendOutcome::TimedOut,
            // Gateways in front of the API answer 5xx with non-JSON bodies
            RequestError::InvalidJson { .. } => SendOutcome::TimedOut,
            other => SendOutcome::BadRequest(self.describe(&other)),
        }
    }
}

/// The 403 family: the chat cannot be written to anymore.
fn is_forbidden(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::BotBlocked
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::UserDeactivated
            | ApiError::CantInitiateConversation
            | ApiError::CantTalkWithBots
    ) || err.to_string().starts_with("Forbidden")
}

fn is_unknown_chat(err: &ApiError) -> bool {
    match err {
        ApiError::ChatNotFound => true,
        ApiError::Unknown(description) => description.starts_with("Bad Request"),
        _ => false,
    }
}

#[async_trait]
impl MessagingTransport for TelegramTransport {
    async fn send(&self, chat: ChatId, html: &str, disable_preview: bool) -> SendOutcome {
        let result = self
            .bot
            .send_message(teloxide::types::ChatId(chat.0), html)
            .parse_mode(ParseMode::Html)
            .link_preview_options(LinkPreviewOptions {
                is_disabled: disable_preview,
                url: None,
                prefer_small_media: false,
                prefer_large_media: false,
                show_above_text: false,
            })
            .await;
        match result {
            Ok(_) => SendOutcome::Success,
            Err(e) => self.send_outcome(e),
        }
    }

    async fn resolve_chat(&self, name: &str) -> Result<Option<ChatId>, TransportError> {
        match self
            .bot
            .get_chat(Recipient::ChannelUsername(name.to_string()))
            .await
        {
            Ok(chat) => Ok(Some(ChatId(chat.id.0))),
            Err(RequestError::Api(ref api)) if is_unknown_chat(api) => Ok(None),
            Err(e) => Err(self.error(e)),
        }
    }

    async fn membership(&self, chat: ChatId, user_id: u64) -> Result<MemberStatus, TransportError> {
        let member = self
            .bot
            .get_chat_member(teloxide::types::ChatId(chat.0), UserId(user_id))
            .await
            .map_err(|e| self.error(e))?;
        Ok(match member.status() {
            ChatMemberStatus::Owner => MemberStatus::Creator,
            ChatMemberStatus::Administrator => MemberStatus::Administrator,
            ChatMemberStatus::Member => MemberStatus::Member,
            ChatMemberStatus::Restricted => MemberStatus::Restricted,
            ChatMemberStatus::Left => MemberStatus::Left,
            ChatMemberStatus::Banned => MemberStatus::Kicked,
        })
    }

    async fn typing(&self, chat: ChatId) {
        if let Err(e) = self
            .bot
            .send_chat_action(teloxide::types::ChatId(chat.0), ChatAction::Typing)
            .await
        {
            tracing::debug!(chat = %chat, error = %self.describe(&e), "sendChatAction failed");
        }
    }
}
