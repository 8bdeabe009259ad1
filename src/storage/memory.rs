use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use super::kv::{KvOp, KvStore};
use super::types::StoreError;

#[derive(Debug, Clone)]
enum Value {
    Set(BTreeSet<String>),
    Str(String),
}

/// Process-local store. State is lost on restart; intended for tests and
/// throwaway deployments (`database_path = ":memory:"`).
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_op(data: &mut HashMap<String, Value>, op: KvOp) {
    match op {
        KvOp::AddMember { key, member } => match data.get_mut(&key) {
            Some(Value::Set(set)) => {
                set.insert(member);
            }
            _ => {
                // A string value under a set key is overwritten, mirroring a type reset
                data.insert(key, Value::Set(BTreeSet::from([member])));
            }
        },
        KvOp::RemoveMember { key, member } => {
            if let Some(Value::Set(set)) = data.get_mut(&key) {
                set.remove(&member);
                if set.is_empty() {
                    data.remove(&key);
                }
            }
        }
        KvOp::Set { key, value } => {
            data.insert(key, Value::Str(value));
        }
        KvOp::SetIfAbsent { key, value } => {
            data.entry(key).or_insert(Value::Str(value));
        }
        KvOp::Delete { key } => {
            data.remove(&key);
        }
        KvOp::Rename { from, to } => {
            if let Some(value) = data.remove(&from) {
                data.insert(to, value);
            }
        }
        KvOp::DeleteIfEmpty { set, key } => {
            if !matches!(data.get(&set), Some(Value::Set(s)) if !s.is_empty()) {
                data.remove(&key);
            }
        }
        // Expanded by `apply` before they get here
        KvOp::DetachAll { .. } | KvOp::MoveAll { .. } => {}
    }
}

fn set_members(data: &HashMap<String, Value>, key: &str) -> Vec<String> {
    match data.get(key) {
        Some(Value::Set(set)) => set.iter().cloned().collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(set_members(&*self.data.read().await, key))
    }

    async fn is_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let data = self.data.read().await;
        Ok(matches!(data.get(key), Some(Value::Set(set)) if set.contains(member)))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.data.read().await.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let data = self.data.read().await;
        Ok(match data.get(key) {
            Some(Value::Str(value)) => Some(value.clone()),
            _ => None,
        })
    }

    async fn keys(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.read().await;
        let mut keys: Vec<String> = data
            .iter()
            .filter(|(k, v)| {
                matches!(v, Value::Set(_)) && k.starts_with(prefix) && k.ends_with(suffix)
            })
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn apply(&self, ops: Vec<KvOp>) -> Result<(), StoreError> {
        // Holding the write lock for the whole batch makes it atomic to readers
        let mut data = self.data.write().await;
        for op in ops {
            let entries = op
                .source()
                .map(|set| set_members(&data, set))
                .unwrap_or_default();
            for single in op.expand(entries) {
                apply_op(&mut data, single);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(key: &str, member: &str) -> KvOp {
        KvOp::AddMember {
            key: key.into(),
            member: member.into(),
        }
    }

    #[tokio::test]
    async fn test_removing_last_member_deletes_key() {
        let store = MemoryStore::new();
        store.apply(vec![add("s", "a")]).await.unwrap();
        assert!(store.exists("s").await.unwrap());

        store
            .apply(vec![KvOp::RemoveMember {
                key: "s".into(),
                member: "a".into(),
            }])
            .await
            .unwrap();
        assert!(!store.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn test_members_sorted() {
        let store = MemoryStore::new();
        store
            .apply(vec![add("s", "c"), add("s", "a"), add("s", "b"), add("s", "a")])
            .await
            .unwrap();
        assert_eq!(store.members("s").await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_set_if_absent_keeps_existing() {
        let store = MemoryStore::new();
        store.set("m", "first").await.unwrap();
        store
            .apply(vec![KvOp::SetIfAbsent {
                key: "m".into(),
                value: "second".into(),
            }])
            .await
            .unwrap();
        assert_eq!(store.get("m").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_rename_moves_and_replaces() {
        let store = MemoryStore::new();
        store
            .apply(vec![add("old", "x"), add("new", "y")])
            .await
            .unwrap();
        store
            .apply(vec![KvOp::Rename {
                from: "old".into(),
                to: "new".into(),
            }])
            .await
            .unwrap();
        assert!(!store.exists("old").await.unwrap());
        assert_eq!(store.members("new").await.unwrap(), vec!["x"]);

        // Missing source is a no-op
        store
            .apply(vec![KvOp::Rename {
                from: "ghost".into(),
                to: "new".into(),
            }])
            .await
            .unwrap();
        assert_eq!(store.members("new").await.unwrap(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_delete_if_empty() {
        let store = MemoryStore::new();
        store.set("marker", "e0").await.unwrap();
        store.apply(vec![add("subs", "1")]).await.unwrap();

        let guard = KvOp::DeleteIfEmpty {
            set: "subs".into(),
            key: "marker".into(),
        };
        store.apply(vec![guard.clone()]).await.unwrap();
        assert!(store.exists("marker").await.unwrap());

        store.delete("subs").await.unwrap();
        store.apply(vec![guard]).await.unwrap();
        assert!(!store.exists("marker").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_filters_sets_by_pattern() {
        let store = MemoryStore::new();
        store
            .apply(vec![add("p:a:subs", "1"), add("p:1", "a"), add("q:b:subs", "1")])
            .await
            .unwrap();
        store.set("p:c:subs", "not a set").await.unwrap();
        assert_eq!(store.keys("p:", ":subs").await.unwrap(), vec!["p:a:subs"]);
    }
}
