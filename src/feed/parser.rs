use anyhow::Result;
use feed_rs::parser;

/// One item of a feed, as far as delivery cares about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub id: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
}

impl Entry {
    /// Identifier used as a delivery marker: the feed-native id, or the link
    /// when the entry carries no id.
    pub fn identifier(&self) -> Option<&str> {
        self.id.as_deref().or(self.link.as_deref())
    }

    /// Body to render: full content when present, otherwise the summary
    pub fn body(&self) -> Option<&str> {
        self.content.as_deref().or(self.summary.as_deref())
    }
}

/// Feed document after parsing, before the fetcher attaches the final URL.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Newest first, as published by the feed
    pub entries: Vec<Entry>,
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}

pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    // feed-rs would hash the title into an id for guid-less items; leave it
    // empty so the link becomes the identifier instead
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)?;

    let entries: Vec<Entry> = feed
        .entries
        .into_iter()
        .map(|entry| Entry {
            id: non_empty(entry.id),
            link: entry.links.into_iter().next().and_then(|l| non_empty(l.href)),
            title: entry.title.map(|t| t.content),
            content: entry.content.and_then(|c| c.body),
            summary: entry.summary.map(|s| s.content),
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content).and_then(non_empty),
        link: feed.links.into_iter().next().and_then(|l| non_empty(l.href)),
        entries,
    })
}
