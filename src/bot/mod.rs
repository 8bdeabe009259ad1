//! Telegram command front-end.
//!
//! - [`commands`] - `BotCommands` enum for `/command@bot args`
//! - [`handler`] - Executing commands for admins and composing replies
//!
//! [`run_updates`] long-polls through teloxide and hands each message to the
//! handler.

mod commands;
mod handler;

pub use commands::Command;
pub use handler::{BotIdentity, CommandHandler, Incoming};

use std::sync::Arc;
use std::time::Duration;

use teloxide::requests::Requester;
use teloxide::types::{AllowedUpdate, Message};
use teloxide::update_listeners::Polling;
use teloxide::utils::command::BotCommands;

use crate::storage::ChatId;
use crate::transport::TelegramTransport;

const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(50);

impl From<&Message> for Incoming {
    fn from(msg: &Message) -> Self {
        let chat = &msg.chat;
        let chat_name = chat
            .title()
            .or_else(|| chat.first_name())
            .or_else(|| chat.username())
            .map(str::to_string)
            .unwrap_or_else(|| chat.id.to_string());
        Incoming {
            chat: ChatId(chat.id.0),
            chat_name,
            sender: msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()),
            text: msg.text().map(str::to_string),
        }
    }
}

/// Receive messages until shutdown and dispatch them to `handler`.
///
/// Updates queued while the bot was offline are dropped before polling starts.
pub async fn run_updates(transport: TelegramTransport, handler: Arc<CommandHandler>) {
    let bot = transport.bot().clone();
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        tracing::warn!(error = %transport.describe(&e), "Failed to register command menu");
    }

    let listener = Polling::builder(bot.clone())
        .timeout(LONG_POLL_TIMEOUT)
        .allowed_updates(vec![AllowedUpdate::Message])
        .drop_pending_updates()
        .build();
    tracing::info!("Listening for commands");

    teloxide::repl_with_listener(
        bot,
        move |msg: Message| {
            let handler = handler.clone();
            async move {
                handler.handle(Incoming::from(&msg)).await;
                teloxide::respond(())
            }
        },
        listener,
    )
    .await;
}
