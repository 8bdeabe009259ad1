use async_trait::async_trait;

use super::types::StoreError;

/// One mutation inside an atomic batch.
///
/// Set-valued keys follow the usual key-value store convention: a set with no
/// members does not exist, so removing the last member deletes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    AddMember { key: String, member: String },
    RemoveMember { key: String, member: String },
    Set { key: String, value: String },
    /// Write `value` only when `key` holds no string value yet
    SetIfAbsent { key: String, value: String },
    Delete { key: String },
    /// Move every value stored under `from` to `to`, replacing whatever `to` held.
    /// No-op when `from` does not exist.
    Rename { from: String, to: String },
    /// Delete `key` when the set stored at `set` has no members at this point of the batch
    DeleteIfEmpty { set: String, key: String },
    /// For every entry of `set`: remove `member` from the entry's `reverse` set and
    /// delete its `cleanup` key if that set is now empty. Then delete `set`.
    ///
    /// The entries are read inside the batch, so a member added concurrently is
    /// detached too.
    DetachAll {
        set: String,
        member: String,
        reverse: MemberKey,
        cleanup: MemberKey,
    },
    /// Merge every entry of `from` into `to`, swap `old` for `new` in each entry's
    /// `reverse` set, then delete `from`. Entries are read inside the batch.
    MoveAll {
        from: String,
        to: String,
        old: String,
        new: String,
        reverse: MemberKey,
    },
}

impl KvOp {
    /// Set a bulk op enumerates; `None` for single-key ops
    pub(crate) fn source(&self) -> Option<&str> {
        match self {
            KvOp::DetachAll { set, .. } => Some(set),
            KvOp::MoveAll { from, to, .. } if from != to => Some(from),
            _ => None,
        }
    }

    /// Rewrite a bulk op into single-key ops, given the current entries of its
    /// [`source`](Self::source). Single-key ops are returned as they are.
    pub(crate) fn expand(self, entries: Vec<String>) -> Vec<KvOp> {
        match self {
            KvOp::DetachAll {
                set,
                member,
                reverse,
                cleanup,
            } => {
                let mut ops = Vec::with_capacity(entries.len() * 2 + 1);
                for entry in &entries {
                    let reverse_key = reverse.of(entry);
                    ops.push(KvOp::RemoveMember {
                        key: reverse_key.clone(),
                        member: member.clone(),
                    });
                    ops.push(KvOp::DeleteIfEmpty {
                        set: reverse_key,
                        key: cleanup.of(entry),
                    });
                }
                ops.push(KvOp::Delete { key: set });
                ops
            }
            KvOp::MoveAll {
                from,
                to,
                old,
                new,
                reverse,
            } => {
                if from == to {
                    return Vec::new();
                }
                let mut ops = Vec::with_capacity(entries.len() * 3 + 1);
                for entry in entries {
                    let reverse_key = reverse.of(&entry);
                    ops.push(KvOp::RemoveMember {
                        key: reverse_key.clone(),
                        member: old.clone(),
                    });
                    ops.push(KvOp::AddMember {
                        key: reverse_key,
                        member: new.clone(),
                    });
                    ops.push(KvOp::AddMember {
                        key: to.clone(),
                        member: entry,
                    });
                }
                ops.push(KvOp::Delete { key: from });
                ops
            }
            op => vec![op],
        }
    }
}

/// Key derived from a set entry as `{prefix}{entry}{suffix}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberKey {
    pub prefix: String,
    pub suffix: String,
}

impl MemberKey {
    pub fn of(&self, entry: &str) -> String {
        format!("{}{}{}", self.prefix, entry, self.suffix)
    }
}

/// Set-oriented key-value store backing the subscription relation.
///
/// Reads are single-key. Every write goes through [`KvStore::apply`], which must
/// apply the whole batch atomically with respect to other callers.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Members of the set at `key`, in ascending lexicographic order
    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn is_member(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// True if `key` holds a non-empty set or a string value
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set keys starting with `prefix` and ending with `suffix`
    async fn keys(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StoreError>;

    async fn apply(&self, ops: Vec<KvOp>) -> Result<(), StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.apply(vec![KvOp::Set {
            key: key.to_string(),
            value: value.to_string(),
        }])
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.apply(vec![KvOp::Delete {
            key: key.to_string(),
        }])
        .await
    }
}
