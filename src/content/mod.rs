//! Turning feed entries into recipient-ready Telegram HTML.
//!
//! - [`sanitize`] - HTML reduction to Telegram's tag subset via `scraper`
//! - [`render`] - Message layout and link labels

mod render;
mod sanitize;

pub use render::{link_label, render_entry, MAX_MESSAGE_CHARS};
pub use sanitize::{sanitize_html, strip_tags};
