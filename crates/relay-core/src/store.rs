//! Conversation context persistence
//!
//! The router writes one record per routing decision and never reads it back.
//! Writes are best-effort: [`persist_context`] logs failures and hands the
//! error back so the caller can drop it.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::CONTEXT_TTL_SECS;

/// Snapshot of one routing decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub user_input: String,
    pub supervisor_response: String,
    pub selected_agent_index: usize,
    pub selected_agent_id: String,
    pub timestamp: String,
}

/// Item written to the state table, keyed by session id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContextRecord {
    pub session_id: String,
    pub conversation_context: ConversationContext,
    pub last_updated: String,
    /// Epoch seconds after which the record may be discarded
    pub expiration_time: i64,
}

impl ContextRecord {
    pub fn new(
        session_id: impl Into<String>,
        context: ConversationContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            conversation_context: context,
            last_updated: iso_timestamp(now),
            expiration_time: now.timestamp() + CONTEXT_TTL_SECS,
        }
    }
}

/// UTC timestamp with millisecond precision and a `Z` suffix
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Key-value store holding conversation context records
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str;

    /// Write the record, replacing any existing record for the session
    async fn put(&self, record: &ContextRecord) -> Result<()>;
}

/// Write a conversation context with a fresh expiry.
///
/// Failures are logged here; callers that treat persistence as best-effort
/// can ignore the returned error. An empty session id is never written.
pub async fn persist_context(
    store: &dyn ContextStore,
    session_id: &str,
    context: ConversationContext,
) -> Result<()> {
    if session_id.is_empty() {
        warn!("Event has no session id, not saving conversation context");
        bail!("missing session id");
    }
    let record = ContextRecord::new(session_id, context, Utc::now());
    match store.put(&record).await {
        Ok(()) => {
            info!(
                "Saved conversation context for session '{}' to {}",
                session_id,
                store.name()
            );
            Ok(())
        }
        Err(e) => {
            error!(
                "Error saving conversation context for session '{}' to {}: {:#}",
                session_id,
                store.name(),
                e
            );
            Err(e)
        }
    }
}

/// Process-local store, used in tests and when no database is configured
pub struct MemoryContextStore {
    table: String,
    records: RwLock<HashMap<String, ContextRecord>>,
}

impl MemoryContextStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, session_id: &str) -> Option<ContextRecord> {
        self.records.read().await.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    fn name(&self) -> &str {
        &self.table
    }

    async fn put(&self, record: &ContextRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.insert(record.session_id.clone(), record.clone());
        debug!("memory store '{}' now holds {} records", self.table, records.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::TimeZone;

    fn sample_context() -> ConversationContext {
        ConversationContext {
            user_input: "plan a VPC".to_string(),
            supervisor_response: "Infrastructure Planning".to_string(),
            selected_agent_index: 2,
            selected_agent_id: "agent-infra".to_string(),
            timestamp: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    struct OfflineStore;

    #[async_trait]
    impl ContextStore for OfflineStore {
        fn name(&self) -> &str {
            "offline"
        }
        async fn put(&self, _record: &ContextRecord) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
    }

    #[test]
    fn test_record_expiry_is_one_day_out() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let record = ContextRecord::new("s-1", sample_context(), now);
        assert_eq!(record.expiration_time, now.timestamp() + 86_400);
        assert_eq!(record.last_updated, "2026-03-01T12:00:00.000Z");
    }

    #[test]
    fn test_record_wire_shape() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let value = serde_json::to_value(ContextRecord::new("s-1", sample_context(), now)).unwrap();
        assert_eq!(value["SessionId"], "s-1");
        assert_eq!(value["ConversationContext"]["selectedAgentId"], "agent-infra");
        assert_eq!(value["ConversationContext"]["selectedAgentIndex"], 2);
        assert_eq!(value["ConversationContext"]["supervisorResponse"], "Infrastructure Planning");
        assert!(value["LastUpdated"].is_string());
        assert!(value["ExpirationTime"].is_i64());
    }

    #[tokio::test]
    async fn test_memory_store_overwrites_session() {
        let store = MemoryContextStore::new("AgentState");
        persist_context(&store, "s-1", sample_context()).await.unwrap();

        let mut second = sample_context();
        second.selected_agent_index = 0;
        persist_context(&store, "s-1", second).await.unwrap();

        assert_eq!(store.len().await, 1);
        let record = store.get("s-1").await.unwrap();
        assert_eq!(record.conversation_context.selected_agent_index, 0);
    }

    #[tokio::test]
    async fn test_empty_session_is_not_written() {
        let store = MemoryContextStore::new("AgentState");
        assert!(persist_context(&store, "", sample_context()).await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_persist_failure_is_returned() {
        let result = persist_context(&OfflineStore, "s-1", sample_context()).await;
        assert!(result.unwrap_err().to_string().contains("connection refused"));
    }
}
