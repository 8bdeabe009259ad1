//! Executes chat commands against the application context.

use std::sync::Arc;

use super::commands::Command;
use crate::context::AppContext;
use crate::scheduler::Poller;
use crate::service::{SubscribeError, Subscribed, UnsubscribeError, UnsubscribeTarget};
use crate::storage::ChatId;
use crate::transport::{MemberStatus, SendOutcome};
use crate::util::escape_html;

const WELCOME: &str = "<b>Welcome to the RSS Bot!</b>\nSend /help to get started.";
const HELP: &str = "<b>/rss</b> <i>[Chat]</i>: Show subbed feeds\n\
<b>/sub</b> <i>Feed URL</i> <i>[Chat]</i>: Sub to feed\n\
<b>/del</b> <i>n or Feed URL</i> <i>[Chat]</i>: Unsubscribe feed\n\
<b>/sync</b>: Check all feeds now\n\
<i>[Chat]</i> is an optional argument with the @Channelname.";

const NO_CHANNEL: &str = "❌ This channel does not exist.";
const NO_FEEDS: &str = "❌ There are no feeds.";
const NO_URL: &str = "❌ No feed URL given.";
const BAD_URL: &str = "❌ That doesn't look like an URL.";
const NOT_ADMIN: &str = "❌ You need to add the bot as an administrator to the channel.";
const INVALID_FEED: &str = "❌ Not a valid feed.";
const ALREADY_SUBSCRIBED: &str = "✅ Already subscribed to this feed.";
const NO_NUMBER: &str = "❌ No number given.";
const NUMBER_TOO_SMALL: &str = "❌ Number must be bigger than 0!";
const NUMBER_TOO_HIGH: &str = "❌ Feed ID too high.";
const NOT_SUBSCRIBED: &str = "❌ Not subscribed to this feed.";
const INTERNAL_ERROR: &str = "❌ Something went wrong, please try again later.";

/// The bot's own account, as reported by `getMe`
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: u64,
    pub username: String,
}

/// An incoming chat message, reduced to what commands need
#[derive(Debug, Clone)]
pub struct Incoming {
    pub chat: ChatId,
    /// Title for groups and channels, first name for private chats
    pub chat_name: String,
    pub sender: Option<i64>,
    pub text: Option<String>,
}

pub struct CommandHandler {
    ctx: Arc<AppContext>,
    poller: Poller,
    bot: BotIdentity,
}

impl CommandHandler {
    pub fn new(ctx: Arc<AppContext>, poller: Poller, bot: BotIdentity) -> Self {
        Self { ctx, poller, bot }
    }

    /// Handle one incoming message and send the reply, if any, to its chat.
    pub async fn handle(&self, message: Incoming) {
        let Some(reply) = self.reply_to(&message).await else {
            return;
        };
        let chat = message.chat;
        match self.ctx.transport.send(chat, &reply, true).await {
            SendOutcome::Success => {}
            outcome => tracing::warn!(chat = %chat, ?outcome, "Failed to send reply"),
        }
    }

    /// Reply text for a message. `None` for non-commands, messages from
    /// non-admins and commands that answer nothing.
    pub async fn reply_to(&self, message: &Incoming) -> Option<String> {
        let command = Command::from_text(message.text.as_deref()?, &self.bot.username)?;
        let sender = message.sender?;
        if !self.ctx.config.is_admin(sender) {
            tracing::debug!(user = sender, chat = %message.chat, "Ignoring command from non-admin");
            return None;
        }
        tracing::debug!(user = sender, ?command, "Command received");

        match command {
            Command::Start => Some(WELCOME.to_string()),
            Command::Help => Some(HELP.to_string()),
            Command::List(channel) => Some(self.list(message, channel.as_deref()).await),
            Command::Subscribe(url, channel) => {
                Some(self.subscribe(message, url, channel.as_deref()).await)
            }
            Command::Unsubscribe(target, channel) => {
                Some(self.unsubscribe(message, target, channel.as_deref()).await)
            }
            Command::Sync => {
                let poller = self.poller.clone();
                tokio::spawn(async move {
                    poller.run_cycle().await;
                });
                None
            }
        }
    }

    /// Chat the command applies to: the named channel, or the chat it was sent in.
    /// `Err` carries the reply to send instead.
    async fn target(
        &self,
        message: &Incoming,
        channel: Option<&str>,
    ) -> Result<(ChatId, String), String> {
        let Some(name) = channel else {
            return Ok((message.chat, message.chat_name.clone()));
        };
        match self.ctx.transport.resolve_chat(name).await {
            Ok(Some(chat)) => Ok((chat, name.to_string())),
            Ok(None) => Err(NO_CHANNEL.to_string()),
            Err(e) => {
                tracing::warn!(channel = %name, error = %e, "Failed to resolve channel");
                Err(INTERNAL_ERROR.to_string())
            }
        }
    }

    async fn list(&self, message: &Incoming, channel: Option<&str>) -> String {
        let (chat, title) = match self.target(message, channel).await {
            Ok(target) => target,
            Err(reply) => return reply,
        };
        let feeds = match self.ctx.list(chat).await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::error!(chat = %chat, error = %e, "Failed to list subscriptions");
                return INTERNAL_ERROR.to_string();
            }
        };
        if feeds.is_empty() {
            return NO_FEEDS.to_string();
        }

        let mut text = format!("<b>{}</b> is subscribed to:\n", escape_html(&title));
        for (n, feed) in feeds.iter().enumerate() {
            text.push_str(&format!("<b>{})</b> {}\n", n + 1, escape_html(feed)));
        }
        text
    }

    async fn subscribe(
        &self,
        message: &Incoming,
        url: Option<String>,
        channel: Option<&str>,
    ) -> String {
        let Some(url) = url else {
            return NO_URL.to_string();
        };
        let (chat, _) = match self.target(message, channel).await {
            Ok(target) => target,
            Err(reply) => return reply,
        };
        if channel.is_some() {
            match self.ctx.transport.membership(chat, self.bot.id).await {
                Ok(MemberStatus::Administrator) => {}
                Ok(status) => {
                    tracing::debug!(chat = %chat, ?status, "Bot is not a channel administrator");
                    return NOT_ADMIN.to_string();
                }
                Err(e) => {
                    tracing::warn!(chat = %chat, error = %e, "Failed to check channel membership");
                    return INTERNAL_ERROR.to_string();
                }
            }
        }

        self.ctx.transport.typing(message.chat).await;
        match self.ctx.subscribe(chat, &url).await {
            Ok(Subscribed::Created { title, .. }) => {
                format!("✅ <b>{}</b> added!", escape_html(&title))
            }
            Ok(Subscribed::AlreadySubscribed { .. }) => ALREADY_SUBSCRIBED.to_string(),
            Err(SubscribeError::InvalidUrl(e)) => {
                tracing::debug!(url = %url, error = %e, "Rejected subscribe URL");
                BAD_URL.to_string()
            }
            Err(SubscribeError::InvalidFeed(e)) => {
                tracing::info!(url = %url, error = %e, "Not a valid feed");
                INVALID_FEED.to_string()
            }
            Err(SubscribeError::Store(e)) => {
                tracing::error!(chat = %chat, error = %e, "Failed to store subscription");
                INTERNAL_ERROR.to_string()
            }
        }
    }

    async fn unsubscribe(
        &self,
        message: &Incoming,
        target: Option<String>,
        channel: Option<&str>,
    ) -> String {
        let Some(arg) = target else {
            return NO_NUMBER.to_string();
        };
        let (chat, _) = match self.target(message, channel).await {
            Ok(target) => target,
            Err(reply) => return reply,
        };
        let target = match parse_target(&arg) {
            Ok(target) => target,
            Err(reply) => return reply.to_string(),
        };

        match self.ctx.unsubscribe(chat, target).await {
            Ok(url) => format!("✅ <b>{}</b> removed!", escape_html(&url)),
            Err(UnsubscribeError::OutOfRange(_)) => NUMBER_TOO_HIGH.to_string(),
            Err(UnsubscribeError::NotSubscribed(_)) => NOT_SUBSCRIBED.to_string(),
            Err(UnsubscribeError::Store(e)) => {
                tracing::error!(chat = %chat, error = %e, "Failed to remove subscription");
                INTERNAL_ERROR.to_string()
            }
        }
    }
}

fn parse_target(arg: &str) -> Result<UnsubscribeTarget, &'static str> {
    if let Ok(n) = arg.parse::<i64>() {
        return match usize::try_from(n) {
            Ok(n) if n >= 1 => Ok(UnsubscribeTarget::Position(n)),
            _ => Err(NUMBER_TOO_SMALL),
        };
    }
    if arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(UnsubscribeTarget::Url(arg.to_string()));
    }
    Err(NO_NUMBER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::feed::testing::{fetched, StaticFetcher};
    use crate::storage::MemoryStore;
    use crate::transport::testing::ScriptedTransport;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    const ADMIN: i64 = 10;
    const BOT: u64 = 99;
    const FEED: &str = "https://example.com/rss";

    fn message(from: i64, text: &str) -> Incoming {
        Incoming {
            chat: ChatId(from),
            chat_name: "Admin".to_string(),
            sender: Some(from),
            text: Some(text.to_string()),
        }
    }

    fn handler(transport: ScriptedTransport) -> (Arc<AppContext>, CommandHandler) {
        let (ctx, _, handler) = handler_with(transport);
        (ctx, handler)
    }

    fn handler_with(
        transport: ScriptedTransport,
    ) -> (Arc<AppContext>, Arc<ScriptedTransport>, CommandHandler) {
        let transport = Arc::new(transport);
        let fetcher = StaticFetcher::default().with(FEED, fetched(FEED, &["e0"]));
        let config = Config {
            admins: vec![ADMIN],
            ..Config::default()
        };
        let ctx = Arc::new(AppContext::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(fetcher),
            transport.clone(),
        ));
        let poller = Poller::new(ctx.clone());
        let handler = CommandHandler::new(
            ctx.clone(),
            poller,
            BotIdentity {
                id: BOT,
                username: "feedbot".to_string(),
            },
        );
        (ctx, transport, handler)
    }

    async fn reply(handler: &CommandHandler, text: &str) -> Option<String> {
        handler.reply_to(&message(ADMIN, text)).await
    }

    #[tokio::test]
    async fn test_non_admin_is_ignored() {
        let (_, handler) = handler(ScriptedTransport::default());
        assert_eq!(handler.reply_to(&message(5, "/start")).await, None);
        assert_eq!(reply(&handler, "/start").await.as_deref(), Some(WELCOME));
    }

    #[tokio::test]
    async fn test_subscribe_list_and_delete() {
        let (ctx, handler) = handler(ScriptedTransport::default());

        assert_eq!(
            reply(&handler, &format!("/sub {FEED}")).await.as_deref(),
            Some("✅ <b>Example</b> added!")
        );
        assert_eq!(
            reply(&handler, &format!("/sub {FEED}")).await.as_deref(),
            Some(ALREADY_SUBSCRIBED)
        );
        assert_eq!(
            reply(&handler, "/rss").await.as_deref(),
            Some("<b>Admin</b> is subscribed to:\n<b>1)</b> https://example.com/rss\n")
        );

        assert_eq!(reply(&handler, "/del 0").await.as_deref(), Some(NUMBER_TOO_SMALL));
        assert_eq!(reply(&handler, "/del 2").await.as_deref(), Some(NUMBER_TOO_HIGH));
        assert_eq!(reply(&handler, "/del x").await.as_deref(), Some(NO_NUMBER));
        assert_eq!(
            reply(&handler, "/del 1").await.as_deref(),
            Some("✅ <b>https://example.com/rss</b> removed!")
        );
        assert_eq!(reply(&handler, "/rss").await.as_deref(), Some(NO_FEEDS));
        assert!(ctx.store.feeds_with_subscribers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_argument_errors() {
        let (_, handler) = handler(ScriptedTransport::default());
        assert_eq!(reply(&handler, "/sub").await.as_deref(), Some(NO_URL));
        assert_eq!(reply(&handler, "/sub not-a-url").await.as_deref(), Some(BAD_URL));
        assert_eq!(
            reply(&handler, "/sub https://example.com/missing").await.as_deref(),
            Some(INVALID_FEED)
        );
        assert_eq!(reply(&handler, "/del").await.as_deref(), Some(NO_NUMBER));
    }

    #[tokio::test]
    async fn test_channel_subscription_requires_admin_rights() {
        let transport = ScriptedTransport {
            chats: HashMap::from([
                ("@news".to_string(), ChatId(-100)),
                ("@other".to_string(), ChatId(-200)),
            ]),
            statuses: HashMap::from([(-100, MemberStatus::Administrator)]),
            ..Default::default()
        };
        let (ctx, handler) = handler(transport);

        assert_eq!(
            reply(&handler, &format!("/sub {FEED} @missing")).await.as_deref(),
            Some(NO_CHANNEL)
        );
        assert_eq!(
            reply(&handler, &format!("/sub {FEED} @other")).await.as_deref(),
            Some(NOT_ADMIN)
        );
        reply(&handler, &format!("/sub {FEED} @news")).await;

        assert_eq!(ctx.store.subscribers(FEED).await.unwrap(), vec![ChatId(-100)]);
        assert_eq!(
            reply(&handler, "/rss @news").await.as_deref(),
            Some("<b>@news</b> is subscribed to:\n<b>1)</b> https://example.com/rss\n")
        );
        assert_eq!(
            reply(&handler, &format!("/del {FEED} @news")).await.as_deref(),
            Some("✅ <b>https://example.com/rss</b> removed!")
        );
    }

    #[tokio::test]
    async fn test_handle_sends_reply_to_origin_chat() {
        let (_, transport, handler) = handler_with(ScriptedTransport::default());
        handler.handle(message(ADMIN, "/help")).await;
        handler.handle(message(5, "/help")).await;
        handler.handle(message(ADMIN, "just chatting")).await;

        assert_eq!(transport.sent_to(ChatId(ADMIN)), vec![HELP.to_string()]);
        assert_eq!(transport.sent_count(), 1);
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("3"), Ok(UnsubscribeTarget::Position(3)));
        assert_eq!(parse_target("-1"), Err(NUMBER_TOO_SMALL));
        assert_eq!(
            parse_target("https://a.example.com/rss"),
            Ok(UnsubscribeTarget::Url("https://a.example.com/rss".into()))
        );
        assert_eq!(parse_target("abc"), Err(NO_NUMBER));
    }
}
