//! The API cost log.
//!
//! One record per agent invocation, accumulated across its iterations.
//! Cost-tracking failures are logged, never propagated — accounting must
//! not break a working turn.

use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use voxtask_core::{StoreError, TokenUsage};

use crate::parse_datetime;

/// Stored query preview length.
const QUERY_PREVIEW_CHARS: usize = 1000;

/// What the agent loop hands over after a turn.
#[derive(Debug, Clone)]
pub struct CostEntry {
    pub user_query: String,
    pub model: String,
    pub usage: TokenUsage,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub iterations: u32,
    pub tool_calls_count: u32,
}

/// A persisted cost record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CostRecord {
    pub id: i64,
    pub user_query: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub cache_write_tokens: i64,
    pub cache_read_tokens: i64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub iterations: i64,
    pub tool_calls_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
pub struct CostLog {
    pool: SqlitePool,
}

impl CostLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a turn's cost. Failures are swallowed with a warning.
    pub async fn record(&self, entry: CostEntry) {
        if let Err(e) = self.try_record(&entry).await {
            warn!(error = %e, "Failed to record API cost");
        }
    }

    async fn try_record(&self, entry: &CostEntry) -> Result<(), StoreError> {
        let preview: String = entry.user_query.chars().take(QUERY_PREVIEW_CHARS).collect();

        sqlx::query(
            r#"
            INSERT INTO api_costs
                (user_query, model, input_tokens, output_tokens, total_tokens,
                 cache_write_tokens, cache_read_tokens,
                 input_cost, output_cost, total_cost,
                 iterations, tool_calls_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&preview)
        .bind(&entry.model)
        .bind(entry.usage.input_tokens as i64)
        .bind(entry.usage.output_tokens as i64)
        .bind(entry.usage.total() as i64)
        .bind(entry.usage.cache_write_tokens as i64)
        .bind(entry.usage.cache_read_tokens as i64)
        .bind(entry.input_cost)
        .bind(entry.output_cost)
        .bind(entry.total_cost)
        .bind(entry.iterations as i64)
        .bind(entry.tool_calls_count as i64)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT cost: {e}")))?;

        info!(
            model = %entry.model,
            total_cost = entry.total_cost,
            input_tokens = entry.usage.input_tokens,
            output_tokens = entry.usage.output_tokens,
            cache_read = entry.usage.cache_read_tokens,
            cache_write = entry.usage.cache_write_tokens,
            iterations = entry.iterations,
            "Cost recorded"
        );
        Ok(())
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<CostRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM api_costs ORDER BY id DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("RECENT costs: {e}")))?;
        rows.iter().map(row_to_record).collect()
    }

    /// Grand totals: (record count, summed cost in USD).
    pub async fn totals(&self) -> Result<(i64, f64), StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt, COALESCE(SUM(total_cost), 0.0) AS cost FROM api_costs",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("TOTAL costs: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;
        let cost: f64 = row
            .try_get("cost")
            .map_err(|e| StoreError::QueryFailed(format!("cost column: {e}")))?;
        Ok((cnt, cost))
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<CostRecord, StoreError> {
    let created_raw: String = row
        .try_get("created_at")
        .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

    let col = |name: &str| -> Result<i64, StoreError> {
        row.try_get(name)
            .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
    };
    let colf = |name: &str| -> Result<f64, StoreError> {
        row.try_get(name)
            .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
    };

    Ok(CostRecord {
        id: col("id")?,
        user_query: row
            .try_get("user_query")
            .map_err(|e| StoreError::QueryFailed(format!("user_query column: {e}")))?,
        model: row
            .try_get("model")
            .map_err(|e| StoreError::QueryFailed(format!("model column: {e}")))?,
        input_tokens: col("input_tokens")?,
        output_tokens: col("output_tokens")?,
        total_tokens: col("total_tokens")?,
        cache_write_tokens: col("cache_write_tokens")?,
        cache_read_tokens: col("cache_read_tokens")?,
        input_cost: colf("input_cost")?,
        output_cost: colf("output_cost")?,
        total_cost: colf("total_cost")?,
        iterations: col("iterations")?,
        tool_calls_count: col("tool_calls_count")?,
        created_at: parse_datetime(&created_raw, "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn entry(cost: f64) -> CostEntry {
        CostEntry {
            user_query: "Add a task".into(),
            model: "claude-sonnet-4-20250514".into(),
            usage: TokenUsage {
                input_tokens: 1200,
                output_tokens: 40,
                cache_read_tokens: 3000,
                cache_write_tokens: 500,
            },
            input_cost: cost * 0.6,
            output_cost: cost * 0.4,
            total_cost: cost,
            iterations: 2,
            tool_calls_count: 1,
        }
    }

    #[tokio::test]
    async fn record_and_read_back() {
        let log = Database::in_memory().await.unwrap().costs();
        log.record(entry(0.0123)).await;

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        let rec = &recent[0];
        assert_eq!(rec.model, "claude-sonnet-4-20250514");
        assert_eq!(rec.input_tokens, 1200);
        assert_eq!(rec.cache_read_tokens, 3000);
        assert_eq!(rec.cache_write_tokens, 500);
        assert_eq!(rec.iterations, 2);
        assert!((rec.total_cost - 0.0123).abs() < 1e-12);
    }

    #[tokio::test]
    async fn totals_sum_across_records() {
        let log = Database::in_memory().await.unwrap().costs();
        log.record(entry(0.01)).await;
        log.record(entry(0.02)).await;

        let (count, total) = log.totals().await.unwrap();
        assert_eq!(count, 2);
        assert!((total - 0.03).abs() < 1e-12);
    }

    #[tokio::test]
    async fn long_query_truncated_to_preview() {
        let log = Database::in_memory().await.unwrap().costs();
        let mut e = entry(0.001);
        e.user_query = "x".repeat(5000);
        log.record(e).await;

        let recent = log.recent(1).await.unwrap();
        assert_eq!(recent[0].user_query.chars().count(), 1000);
    }
}
