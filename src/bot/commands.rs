//! Chat commands, parsed by teloxide's `BotCommands` derive.

use teloxide::utils::command::{BotCommands, ParseError};

/// A recognised bot command with its raw arguments.
#[derive(BotCommands, Debug, Clone, PartialEq, Eq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "Show the welcome message")]
    Start,
    #[command(description = "Show the command list")]
    Help,
    /// `/rss [@channel]`
    #[command(rename = "rss", description = "Show subbed feeds", parse_with = one_arg)]
    List(Option<String>),
    /// `/sub <url> [@channel]`
    #[command(rename = "sub", description = "Sub to feed", parse_with = two_args)]
    Subscribe(Option<String>, Option<String>),
    /// `/del <n|url> [@channel]`
    #[command(rename = "del", description = "Unsubscribe feed", parse_with = two_args)]
    Unsubscribe(Option<String>, Option<String>),
    #[command(description = "Check all feeds now")]
    Sync,
}

impl Command {
    /// Parse a message text. Returns `None` for plain text, unknown commands and
    /// commands addressed to another bot (`/rss@otherbot`).
    pub fn from_text(text: &str, bot_username: &str) -> Option<Self> {
        <Self as BotCommands>::parse(text, bot_username).ok()
    }
}

// Missing arguments are answered by the handler, so these never fail.

fn one_arg(input: String) -> Result<(Option<String>,), ParseError> {
    Ok((input.split_whitespace().next().map(str::to_string),))
}

fn two_args(input: String) -> Result<(Option<String>, Option<String>), ParseError> {
    let mut words = input.split_whitespace().map(str::to_string);
    Ok((words.next(), words.next()))
}
