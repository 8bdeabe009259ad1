use super::parser::Entry;

/// Entries newer than the stored marker, and the marker to store next.
#[derive(Debug)]
pub struct Diff<'a> {
    /// Newest first, mirroring the feed order
    pub new_entries: Vec<&'a Entry>,
    /// Marker to persist after delivery; `None` leaves the stored marker as is
    pub next_marker: Option<String>,
}

impl<'a> Diff<'a> {
    /// New entries in delivery order (oldest first)
    pub fn oldest_first(&self) -> impl Iterator<Item = &'a Entry> + '_ {
        self.new_entries.iter().rev().copied()
    }
}

fn matches_marker(entry: &Entry, marker: &str) -> bool {
    match &entry.id {
        Some(id) => id == marker,
        None => entry.link.as_deref() == Some(marker),
    }
}

/// Compute which entries of a newest-first list come after `marker`.
///
/// - no marker yet: seed it with the newest entry, report nothing new
/// - marker found at position `i`: entries `[0, i)` are new
/// - marker not in the list (history trimmed or marker lost): report nothing
///   new and re-seed to the newest entry
pub fn diff_entries<'a>(entries: &'a [Entry], marker: Option<&str>) -> Diff<'a> {
    let newest = entries.iter().find_map(Entry::identifier);

    let Some(marker) = marker else {
        return Diff {
            new_entries: Vec::new(),
            next_marker: newest.map(str::to_string),
        };
    };

    match entries.iter().position(|e| matches_marker(e, marker)) {
        Some(index) => Diff {
            new_entries: entries[..index].iter().collect(),
            next_marker: if index == 0 {
                None
            } else {
                newest.map(str::to_string)
            },
        },
        None => {
            if !entries.is_empty() {
                tracing::debug!(marker = %marker, "Marker not found in feed, re-seeding");
            }
            Diff {
                new_entries: Vec::new(),
                next_marker: newest.filter(|n| *n != marker).map(str::to_string),
            }
        }
    }
}
