//! The conversation history gateway.
//!
//! Append-only, process-global. Reads see any prefix of committed appends
//! and never a torn record (each append is one INSERT). `search` returns,
//! for matched tool calls, the original input arguments and the recorded
//! result — this is what lets the agent restore a deleted task from its
//! pre-delete snapshot.

use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use voxtask_core::{HistoryMessage, HistoryRole, StoreError, ToolInvocation, ToolOutcome};

use crate::parse_datetime;

/// Recent rows scanned by `search` before in-process filtering.
const SEARCH_SCAN_WINDOW: i64 = 500;

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        role: HistoryRole,
        content: &str,
        tool_calls: Option<&[ToolInvocation]>,
        tool_results: Option<&[ToolOutcome]>,
    ) -> Result<HistoryMessage, StoreError> {
        let now = chrono::Utc::now();
        let tool_calls_json = tool_calls
            .filter(|c| !c.is_empty())
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Storage(format!("tool_calls serialization: {e}")))?;
        let tool_results_json = tool_results
            .filter(|r| !r.is_empty())
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Storage(format!("tool_results serialization: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO conversation_messages (role, content, tool_calls, tool_results, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(role.as_str())
        .bind(content)
        .bind(&tool_calls_json)
        .bind(&tool_results_json)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT message: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(message_id = id, role = %role, "History message appended");

        Ok(HistoryMessage {
            id,
            role,
            content: content.to_string(),
            tool_calls: tool_calls.filter(|c| !c.is_empty()).map(|c| c.to_vec()),
            tool_results: tool_results.filter(|r| !r.is_empty()).map(|r| r.to_vec()),
            created_at: now,
        })
    }

    /// The last `n` messages in chronological order.
    pub async fn tail(&self, n: usize) -> Result<Vec<HistoryMessage>, StoreError> {
        let rows = sqlx::query("SELECT * FROM conversation_messages ORDER BY id DESC LIMIT ?1")
            .bind(n as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("TAIL: {e}")))?;

        let mut messages: Vec<HistoryMessage> =
            rows.iter().map(row_to_message).collect::<Result<_, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Recent turns whose content matches any term (case-insensitive
    /// substring) or whose tool-call list contains any named tool. Returns
    /// up to `limit` matches, most recent last.
    pub async fn search(
        &self,
        terms: &[String],
        tool_names: &[String],
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, StoreError> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() && tool_names.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT * FROM conversation_messages ORDER BY id DESC LIMIT ?1")
            .bind(SEARCH_SCAN_WINDOW)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SEARCH scan: {e}")))?;

        let mut matched: Vec<HistoryMessage> = Vec::new();
        for row in &rows {
            let message = row_to_message(row)?;

            let content_hit = {
                let content = message.content.to_lowercase();
                terms.iter().any(|t| content.contains(t.as_str()))
            };
            let tool_hit = message.tool_calls.as_ref().is_some_and(|calls| {
                calls
                    .iter()
                    .any(|c| tool_names.iter().any(|n| n == &c.name))
            });
            // A tool-result message matches when its recorded payloads
            // mention a term (the pre-delete snapshot lives there).
            let result_hit = message.tool_results.as_ref().is_some_and(|results| {
                results.iter().any(|r| {
                    let content = r.content.to_lowercase();
                    terms.iter().any(|t| content.contains(t.as_str()))
                })
            });

            if content_hit || tool_hit || result_hit {
                matched.push(message);
                if matched.len() >= limit {
                    break;
                }
            }
        }

        matched.reverse();
        Ok(matched)
    }

    /// Wipe the entire log. The recovery escape hatch for a corrupted turn
    /// that would otherwise poison every subsequent prompt.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM conversation_messages")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("CLEAR: {e}")))?;
        let deleted = result.rows_affected();
        info!(deleted, "Conversation history cleared");
        Ok(deleted)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM conversation_messages")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT: {e}")))?;
        row.try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))
    }

    /// Chronological page of the full log (REST surface).
    pub async fn page(&self, offset: i64, limit: i64) -> Result<Vec<HistoryMessage>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM conversation_messages ORDER BY id ASC LIMIT ?1 OFFSET ?2")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("PAGE: {e}")))?;
        rows.iter().map(row_to_message).collect()
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryMessage, StoreError> {
    let role_raw: String = row
        .try_get("role")
        .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
    let role: HistoryRole = role_raw
        .parse()
        .map_err(|e: String| StoreError::CorruptedHistory(e))?;

    let tool_calls_json: Option<String> = row
        .try_get("tool_calls")
        .map_err(|e| StoreError::QueryFailed(format!("tool_calls column: {e}")))?;
    let tool_results_json: Option<String> = row
        .try_get("tool_results")
        .map_err(|e| StoreError::QueryFailed(format!("tool_results column: {e}")))?;

    let tool_calls = tool_calls_json
        .as_deref()
        .map(serde_json::from_str::<Vec<ToolInvocation>>)
        .transpose()
        .map_err(|e| StoreError::CorruptedHistory(format!("tool_calls: {e}")))?;
    let tool_results = tool_results_json
        .as_deref()
        .map(serde_json::from_str::<Vec<ToolOutcome>>)
        .transpose()
        .map_err(|e| StoreError::CorruptedHistory(format!("tool_results: {e}")))?;

    let created_raw: String = row
        .try_get("created_at")
        .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

    Ok(HistoryMessage {
        id: row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
        role,
        content: row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?,
        tool_calls,
        tool_results,
        created_at: parse_datetime(&created_raw, "created_at")?,
    })
}
