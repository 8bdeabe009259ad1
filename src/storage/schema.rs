use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqliteConnection, SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::kv::{KvOp, KvStore};
use super::types::StoreError;

// ============================================================================
// SqliteStore
// ============================================================================

/// Key-value store persisted in SQLite.
///
/// Sets live in `kv_sets` (one row per member), strings in `kv_strings`.
/// A key is only ever present in one of the two tables.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the file cannot be opened or is locked
    /// by another process, `StoreError::Migration` if schema setup fails.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);
        let in_memory = path == ":memory:";

        // busy_timeout=5000: wait up to 5 seconds for locks before SQLITE_BUSY.
        // Every pooled connection inherits the pragma.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_connect)?
            .pragma("busy_timeout", "5000");

        // An in-memory database exists per connection, so it gets exactly one that never expires
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .acquire_timeout(Duration::from_secs(10));
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StoreError::from_connect)?;
        let store = Self { pool };
        store
            .migrate()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        tracing::debug!(path = %path, "Subscription store opened");
        Ok(store)
    }

    /// Create tables inside a single transaction. All statements use
    /// `IF NOT EXISTS`, so re-running on an existing database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_sets (
                key TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (key, member)
            ) WITHOUT ROWID
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_strings (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn key_exists(conn: &mut SqliteConnection, key: &str) -> Result<bool, sqlx::Error> {
    let found: i64 = sqlx::query_scalar(
        r#"
        SELECT EXISTS(SELECT 1 FROM kv_sets WHERE key = ?1)
            OR EXISTS(SELECT 1 FROM kv_strings WHERE key = ?1)
        "#,
    )
    .bind(key)
    .fetch_one(&mut *conn)
    .await?;
    Ok(found != 0)
}

async fn delete_key(conn: &mut SqliteConnection, key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM kv_sets WHERE key = ?")
        .bind(key)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM kv_strings WHERE key = ?")
        .bind(key)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn apply_op(conn: &mut SqliteConnection, op: KvOp) -> Result<(), sqlx::Error> {
    match op {
        KvOp::AddMember { key, member } => {
            sqlx::query("DELETE FROM kv_strings WHERE key = ?")
                .bind(&key)
                .execute(&mut *conn)
                .await?;
            sqlx::query("INSERT INTO kv_sets (key, member) VALUES (?, ?) ON CONFLICT DO NOTHING")
                .bind(&key)
                .bind(&member)
                .execute(&mut *conn)
                .await?;
        }
        KvOp::RemoveMember { key, member } => {
            sqlx::query("DELETE FROM kv_sets WHERE key = ? AND member = ?")
                .bind(&key)
                .bind(&member)
                .execute(&mut *conn)
                .await?;
        }
        KvOp::Set { key, value } => {
            sqlx::query("DELETE FROM kv_sets WHERE key = ?")
                .bind(&key)
                .execute(&mut *conn)
                .await?;
            sqlx::query(
                "INSERT INTO kv_strings (key, value) VALUES (?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(&key)
            .bind(&value)
            .execute(&mut *conn)
            .await?;
        }
        KvOp::SetIfAbsent { key, value } => {
            sqlx::query("INSERT INTO kv_strings (key, value) VALUES (?, ?) ON CONFLICT(key) DO NOTHING")
                .bind(&key)
                .bind(&value)
                .execute(&mut *conn)
                .await?;
        }
        KvOp::Delete { key } => {
            delete_key(conn, &key).await?;
        }
        KvOp::Rename { from, to } => {
            if from != to && key_exists(conn, &from).await? {
                delete_key(conn, &to).await?;
                sqlx::query("UPDATE kv_sets SET key = ? WHERE key = ?")
                    .bind(&to)
                    .bind(&from)
                    .execute(&mut *conn)
                    .await?;
                sqlx::query("UPDATE kv_strings SET key = ? WHERE key = ?")
                    .bind(&to)
                    .bind(&from)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        KvOp::DeleteIfEmpty { set, key } => {
            let has_members: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM kv_sets WHERE key = ?)")
                    .bind(&set)
                    .fetch_one(&mut *conn)
                    .await?;
            if has_members == 0 {
                delete_key(conn, &key).await?;
            }
        }
        // Expanded by `apply` before they get here
        KvOp::DetachAll { .. } | KvOp::MoveAll { .. } => {}
    }
    Ok(())
}

async fn set_members(conn: &mut SqliteConnection, key: &str) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT member FROM kv_sets WHERE key = ? ORDER BY member")
        .bind(key)
        .fetch_all(&mut *conn)
        .await
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern
fn like_literal(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(set_members(&mut *conn, key).await?)
    }

    async fn is_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let found: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM kv_sets WHERE key = ? AND member = ?)")
                .bind(key)
                .bind(member)
                .fetch_one(&self.pool)
                .await?;
        Ok(found != 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(key_exists(&mut *conn, key).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar("SELECT value FROM kv_strings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn keys(&self, prefix: &str, suffix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{}%{}", like_literal(prefix), like_literal(suffix));
        // LIKE is case-insensitive for ASCII, so the exact match is re-checked
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT key FROM kv_sets WHERE key LIKE ? ESCAPE '\\' ORDER BY key",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys
            .into_iter()
            .filter(|k| {
                k.len() >= prefix.len() + suffix.len()
                    && k.starts_with(prefix)
                    && k.ends_with(suffix)
            })
            .collect())
    }

    async fn apply(&self, ops: Vec<KvOp>) -> Result<(), StoreError> {
        // IMMEDIATE takes the write lock before the first read, so bulk ops
        // enumerate exactly the rows they then rewrite
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        for op in ops {
            let entries = match op.source() {
                Some(set) => set_members(&mut *tx, set).await?,
                None => Vec::new(),
            };
            for single in op.expand(entries) {
                apply_op(&mut *tx, single).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
