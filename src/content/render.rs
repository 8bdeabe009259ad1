use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use super::sanitize::{sanitize_html, strip_tags};
use crate::feed::Entry;
use crate::util::{escape_html, escape_truncated};

/// Telegram rejects messages longer than this (counted after entity parsing)
pub const MAX_MESSAGE_CHARS: usize = 4096;

const NO_TITLE: &str = "No title";

// Caps for the parts around the body, so the body budget never runs out
const MAX_TITLE_CHARS: usize = 256;
const MAX_LABEL_CHARS: usize = 128;

fn feedproxy() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https?://feedproxy\.google\.com/~r/(.+?)/.*").expect("static regex")
    })
}

fn www_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^www\d?\.").expect("static regex"))
}

/// Short label for a link: the wrapped site of a feedproxy redirect, otherwise
/// the host (with port) without a leading `www.`/`www2.` label.
pub fn link_label(link: &str) -> String {
    let raw = if let Some(caps) = feedproxy().captures(link) {
        caps[1].to_string()
    } else {
        match Url::parse(link) {
            Ok(url) => match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => format!("{host}:{port}"),
                (Some(host), None) => host.to_string(),
                (None, _) => link.to_string(),
            },
            Err(_) => link.to_string(),
        }
    };
    www_label().replace(&raw, "").into_owned()
}

/// Render one entry as a Telegram HTML message:
///
/// ```text
/// <b>Entry title</b>
/// <i>Feed title</i>
/// sanitized body
/// <a href="link">Read more on example.com</a>
/// ```
///
/// An entry without a link points at the feed's own link. When the message
/// would exceed [`MAX_MESSAGE_CHARS`], the body is reduced to plain text and cut.
/// Titles and the link label are capped on their own.
pub fn render_entry(entry: &Entry, feed_title: &str, feed_link: &str) -> String {
    let title = match entry.title.as_deref() {
        Some(t) => escape_truncated(strip_tags(t).trim(), MAX_TITLE_CHARS),
        None => NO_TITLE.to_string(),
    };

    let (post_link, label) = match entry.link.as_deref() {
        Some(link) => (link, link_label(link)),
        None => (feed_link, feed_link.to_string()),
    };

    let head = format!(
        "<b>{}</b>\n<i>{}</i>\n",
        title,
        escape_truncated(feed_title, MAX_TITLE_CHARS)
    );
    let tail = format!(
        "\n<a href=\"{}\">Read more on {}</a>\n",
        escape_html(post_link),
        escape_truncated(&label, MAX_LABEL_CHARS)
    );

    let body = entry.body().map(sanitize_html).unwrap_or_default();
    let message = format!("{head}{body}{tail}");
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return message;
    }

    let budget = MAX_MESSAGE_CHARS.saturating_sub(head.chars().count() + tail.chars().count());
    let plain = entry.body().map(strip_tags).unwrap_or_default();
    let body = escape_truncated(plain.trim(), budget);
    format!("{head}{body}{tail}")
}
