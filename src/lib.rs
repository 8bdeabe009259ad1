//! feedrelay: a Telegram bot that polls RSS/Atom feeds and relays new entries
//! to the chats subscribed to them.
//!
//! - [`storage`] - Chat ↔ feed subscriptions and delivery markers over a key-value store
//! - [`feed`] - Fetching, parsing and diffing feeds
//! - [`content`] - Rendering entries as Telegram HTML
//! - [`delivery`] - Sending new entries and reacting to per-chat failures
//! - [`scheduler`] - Periodic, bounded-concurrency poll cycles
//! - [`bot`] - Chat commands over the Bot API

pub mod bot;
pub mod config;
pub mod content;
pub mod context;
pub mod delivery;
pub mod feed;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod transport;
pub mod util;
