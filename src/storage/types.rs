use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store-specific errors with operator-friendly messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be opened or reached
    #[error("Subscription store unavailable: {0}")]
    Unavailable(String),

    /// Schema setup failed
    #[error("Store migration failed: {0}")]
    Migration(String),

    /// Generic backend error
    #[error("Store error: {0}")]
    Backend(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a connection-time sqlx error.
    ///
    /// Lock and open failures mean the store is unusable for this process,
    /// everything else is passed through as a backend error.
    pub(crate) fn from_connect(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("unable to open database file")
            || matches!(err, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
        {
            return StoreError::Unavailable(err.to_string());
        }

        StoreError::Backend(err)
    }
}

// ============================================================================
// Chat Identity
// ============================================================================

/// Numeric Telegram chat id. Negative for groups and channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChatId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ChatId)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        ChatId(id)
    }
}

// ============================================================================
// Operation Outcomes
// ============================================================================

/// Result of adding a chat→feed subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Created,
    AlreadySubscribed,
}

/// Result of removing a chat→feed subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The subscription existed and was removed; carries the feed URL
    Removed(String),
    /// Position was 0 or greater than the number of subscriptions
    OutOfRange,
    /// The chat was not subscribed to the given feed URL
    NotSubscribed,
}
