//! Subscription storage.
//!
//! - [`KvStore`] is the set-oriented key-value seam with two backends,
//!   [`MemoryStore`] and [`SqliteStore`]
//! - [`SubscriptionStore`] layers the chat ↔ feed relation and delivery markers on top

mod keys;
mod kv;
mod memory;
mod schema;
mod subscriptions;
mod types;

use std::sync::Arc;

pub use keys::{KeySpace, DEFAULT_PREFIX};
pub use kv::{KvOp, KvStore, MemberKey};
pub use memory::MemoryStore;
pub use schema::SqliteStore;
pub use subscriptions::SubscriptionStore;
pub use types::{AddOutcome, ChatId, RemoveOutcome, StoreError};

/// Open the configured backend. `":memory:"` selects the process-local store.
pub async fn open_store(path: &str) -> Result<Arc<dyn KvStore>, StoreError> {
    if path == ":memory:" {
        tracing::warn!("Using in-memory store, subscriptions are lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(SqliteStore::open(path).await?))
}
