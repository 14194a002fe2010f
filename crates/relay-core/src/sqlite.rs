//! SQLite-backed context store
//!
//! Stands in for the durable key-value table. One row per session; a put
//! replaces the previous row for that session.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::store::{ContextRecord, ContextStore, ConversationContext};

/// Context store persisting to a single SQLite table
pub struct SqliteContextStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteContextStore {
    /// Open (or create) the database file and ensure the table exists
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open SQLite database at {:?}", path.as_ref()))?;
        info!("Opened context store at {:?} (table {})", path.as_ref(), table);
        Self::with_connection(conn, table)
    }

    pub fn open_in_memory(table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::with_connection(conn, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{table}\" (
                    session_id TEXT PRIMARY KEY,
                    conversation_context TEXT NOT NULL,
                    last_updated TEXT NOT NULL,
                    expiration_time INTEGER NOT NULL
                )"
            ),
            [],
        )
        .with_context(|| format!("Failed to create table {}", table))?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{table}_expiration\" ON \"{table}\"(expiration_time)"
            ),
            [],
        )
        .with_context(|| format!("Failed to create expiration index on {}", table))?;

        debug!("Context table {} initialized", table);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
        })
    }

    /// Read back a record; the router itself never does this
    pub async fn get(&self, session_id: &str) -> Result<Option<ContextRecord>> {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();
        let session_id = session_id.to_owned();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);
            let row = conn
                .query_row(
                    &format!(
                        "SELECT session_id, conversation_context, last_updated, expiration_time
                         FROM \"{table}\" WHERE session_id = ?1"
                    ),
                    params![&session_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()
                .context("Failed to query context record")?;

            match row {
                Some((session_id, context_json, last_updated, expiration_time)) => {
                    let conversation_context: ConversationContext =
                        serde_json::from_str(&context_json)
                            .context("Failed to deserialize conversation context")?;
                    Ok(Some(ContextRecord {
                        session_id,
                        conversation_context,
                        last_updated,
                        expiration_time,
                    }))
                }
                None => Ok(None),
            }
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Delete records whose expiry is at or before `now`
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();
        let cutoff = now.timestamp();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);
            let deleted = conn
                .execute(
                    &format!("DELETE FROM \"{table}\" WHERE expiration_time <= ?1"),
                    params![cutoff],
                )
                .context("Failed to purge expired context records")?;
            if deleted > 0 {
                info!("Purged {} expired context records from {}", deleted, table);
            }
            Ok(deleted)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    pub async fn count(&self) -> Result<usize> {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn);
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
                .context("Failed to count context records")?;
            Ok(count as usize)
        })
        .await
        .context("spawn_blocking task panicked")?
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    fn name(&self) -> &str {
        &self.table
    }

    async fn put(&self, record: &ContextRecord) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();
        let record = record.clone();

        tokio::task::spawn_blocking(move || {
            let context_json = serde_json::to_string(&record.conversation_context)
                .context("Failed to serialize conversation context")?;
            let conn = lock(&conn);
            conn.execute(
                &format!(
                    "INSERT INTO \"{table}\" (session_id, conversation_context, last_updated, expiration_time)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(session_id) DO UPDATE SET
                        conversation_context = excluded.conversation_context,
                        last_updated = excluded.last_updated,
                        expiration_time = excluded.expiration_time"
                ),
                params![
                    &record.session_id,
                    &context_json,
                    &record.last_updated,
                    record.expiration_time,
                ],
            )
            .context("Failed to write context record")?;
            debug!("Wrote context record for session {}", record.session_id);
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| {
        warn!("Database mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_start || !valid_rest || table.len() > 128 {
        bail!(
            "Invalid state table name '{}': use letters, digits, '_' or '-', starting with a letter or '_'",
            table
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context(index: usize) -> ConversationContext {
        ConversationContext {
            user_input: "summarize sales".to_string(),
            supervisor_response: "Data Analysis".to_string(),
            selected_agent_index: index,
            selected_agent_id: format!("agent-{}", index),
            timestamp: "2026-05-01T09:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = SqliteContextStore::open_in_memory("AgentState").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let record = ContextRecord::new("s-1", context(0), now);

        store.put(&record).await.unwrap();
        let loaded = store.get("s-1").await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_upserts() {
        let store = SqliteContextStore::open_in_memory("AgentState").unwrap();
        let now = Utc::now();
        store.put(&ContextRecord::new("s-1", context(0), now)).await.unwrap();
        store.put(&ContextRecord::new("s-1", context(2), now)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let loaded = store.get("s-1").await.unwrap().unwrap();
        assert_eq!(loaded.conversation_context.selected_agent_index, 2);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = SqliteContextStore::open_in_memory("AgentState").unwrap();
        let earlier = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let later = earlier + chrono::Duration::hours(12);
        store.put(&ContextRecord::new("old", context(0), earlier)).await.unwrap();
        store.put(&ContextRecord::new("new", context(1), later)).await.unwrap();

        let purged = store
            .purge_expired(earlier + chrono::Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = SqliteContextStore::open(&path, "AgentState").unwrap();
            store
                .put(&ContextRecord::new("s-1", context(1), Utc::now()))
                .await
                .unwrap();
        }
        let store = SqliteContextStore::open(&path, "AgentState").unwrap();
        assert!(store.get("s-1").await.unwrap().is_some());
    }

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("AgentState").is_ok());
        assert!(validate_table_name("agent_state-prod").is_ok());
        assert!(validate_table_name("_t1").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1table").is_err());
        assert!(validate_table_name("a\"; DROP TABLE x; --").is_err());
        assert!(SqliteContextStore::open_in_memory("bad name").is_err());
    }
}
