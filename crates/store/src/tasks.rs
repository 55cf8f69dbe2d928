//! The task store gateway.
//!
//! All mutations return the post-mutation entity; `delete` returns the
//! pre-delete snapshot so the conversation log keeps enough state for a
//! later restore. Bulk variants report per-item success — there is no
//! cross-item transaction.

use chrono::{DateTime, Local, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use voxtask_core::{
    NewTask, StoreError, Task, TaskFilter, TaskPatch, TaskPriority, TaskStats, TaskStatus,
};

use crate::parse_datetime;

/// Per-item result of a bulk operation. `K` identifies the failed item:
/// the input index for creates, the task id for updates and deletes.
#[derive(Debug)]
pub struct BulkOutcome<T, K = i64> {
    pub succeeded: Vec<T>,
    pub failed: Vec<(K, String)>,
}

impl<T, K> Default for BulkOutcome<T, K> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T, K> BulkOutcome<T, K> {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A create without a scheduled date defaults to today at 12:00 local time.
pub fn default_scheduled_date() -> DateTime<Utc> {
    Local::now()
        .date_naive()
        .and_hms_opt(12, 0, 0)
        .and_then(|noon| Local.from_local_datetime(&noon).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, new: NewTask) -> Result<Task, StoreError> {
        if new.title.trim().is_empty() {
            return Err(StoreError::Storage("task title must not be empty".into()));
        }

        let now = Utc::now();
        let scheduled = new.scheduled_date.unwrap_or_else(default_scheduled_date);

        let result = sqlx::query(
            r#"
            INSERT INTO tasks
                (title, description, notes, priority, status,
                 scheduled_date, deadline, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.notes)
        .bind(new.priority.as_str())
        .bind(TaskStatus::Todo.as_str())
        .bind(scheduled.to_rfc3339())
        .bind(new.deadline.map(|d| d.to_rfc3339()))
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT task: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(task_id = id, title = %new.title, "Task created");
        self.require(id).await
    }

    pub async fn create_many(&self, items: Vec<NewTask>) -> BulkOutcome<Task, usize> {
        let mut outcome = BulkOutcome::default();
        for (index, item) in items.into_iter().enumerate() {
            match self.create(item).await {
                Ok(task) => outcome.succeeded.push(task),
                Err(e) => outcome.failed.push((index, e.to_string())),
            }
        }
        outcome
    }

    pub async fn get(&self, id: i64) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT task: {e}")))?;

        row.as_ref().map(row_to_task).transpose()
    }

    async fn require(&self, id: i64) -> Result<Task, StoreError> {
        self.get(id).await?.ok_or(StoreError::TaskNotFound(id))
    }

    /// Apply a patch. A status transition into `completed` stamps
    /// `completed_at`; a transition away clears it.
    pub async fn update(&self, id: i64, patch: &TaskPatch) -> Result<Task, StoreError> {
        let mut task = self.require(id).await?;
        let now = Utc::now();

        if let Some(ref title) = patch.title {
            task.title = title.clone();
        }
        if let Some(ref description) = patch.description {
            task.description = Some(description.clone());
        }
        if let Some(ref notes) = patch.notes {
            task.notes = Some(notes.clone());
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(status) = patch.status {
            if status == TaskStatus::Completed {
                if task.status != TaskStatus::Completed {
                    task.completed_at = Some(now);
                }
            } else {
                task.completed_at = None;
            }
            task.status = status;
        }
        if let Some(scheduled) = patch.scheduled_date {
            task.scheduled_date = scheduled;
        }
        if let Some(deadline) = patch.deadline {
            task.deadline = Some(deadline);
        }
        task.updated_at = now;

        self.persist(&task).await?;
        debug!(task_id = id, "Task updated");
        Ok(task)
    }

    /// Bulk patch. `shift_days` moves `scheduled_date` (and `deadline`,
    /// when set) by a relative number of days instead of an absolute date.
    pub async fn update_many(
        &self,
        ids: &[i64],
        patch: &TaskPatch,
        shift_days: Option<i64>,
    ) -> BulkOutcome<Task> {
        let mut outcome = BulkOutcome::default();
        for &id in ids {
            let result = match shift_days {
                Some(days) => self.shift_then_patch(id, patch, days).await,
                None => self.update(id, patch).await,
            };
            match result {
                Ok(task) => outcome.succeeded.push(task),
                Err(e) => outcome.failed.push((id, e.to_string())),
            }
        }
        outcome
    }

    async fn shift_then_patch(
        &self,
        id: i64,
        patch: &TaskPatch,
        days: i64,
    ) -> Result<Task, StoreError> {
        let current = self.require(id).await?;
        let shift = chrono::Duration::days(days);
        let mut shifted = patch.clone();
        shifted.scheduled_date = Some(current.scheduled_date + shift);
        shifted.deadline = current.deadline.map(|d| d + shift).or(patch.deadline);
        self.update(id, &shifted).await
    }

    /// Delete a task, returning its pre-delete snapshot.
    pub async fn delete(&self, id: i64) -> Result<Task, StoreError> {
        let snapshot = self.require(id).await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE task: {e}")))?;
        debug!(task_id = id, title = %snapshot.title, "Task deleted");
        Ok(snapshot)
    }

    pub async fn delete_many(&self, ids: &[i64]) -> BulkOutcome<Task> {
        let mut outcome = BulkOutcome::default();
        for &id in ids {
            match self.delete(id).await {
                Ok(task) => outcome.succeeded.push(task),
                Err(e) => outcome.failed.push((id, e.to_string())),
            }
        }
        outcome
    }

    /// Filtered enumeration, newest first.
    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut sql = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(&format!(" AND status = ?{}", binds.len() + 1));
            binds.push(status.as_str().into());
        }
        if let Some(priority) = filter.priority {
            sql.push_str(&format!(" AND priority = ?{}", binds.len() + 1));
            binds.push(priority.as_str().into());
        }
        if let Some(after) = filter.scheduled_after {
            sql.push_str(&format!(" AND scheduled_date >= ?{}", binds.len() + 1));
            binds.push(after.to_rfc3339());
        }
        if let Some(before) = filter.scheduled_before {
            sql.push_str(&format!(" AND scheduled_date <= ?{}", binds.len() + 1));
            binds.push(before.to_rfc3339());
        }
        if let Some(ref text) = filter.text {
            let n = binds.len() + 1;
            sql.push_str(&format!(
                " AND (LOWER(title) LIKE ?{n} ESCAPE '\\' OR LOWER(description) LIKE ?{n} ESCAPE '\\' OR LOWER(notes) LIKE ?{n} ESCAPE '\\')"
            ));
            binds.push(format!("%{}%", escape_like(&text.to_lowercase())));
        }

        sql.push_str(&format!(
            " ORDER BY created_at DESC LIMIT {}",
            filter.limit.unwrap_or(50)
        ));

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("LIST tasks: {e}")))?;

        rows.iter().map(row_to_task).collect()
    }

    /// Case-insensitive substring search across title/description/notes.
    /// Matching is OR across terms; results rank by match count, then
    /// recency.
    pub async fn search(
        &self,
        terms: &[String],
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, StoreError> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // Over-fetch candidates, rank in process.
        let candidates = self
            .list(&TaskFilter {
                status: filter.status,
                priority: filter.priority,
                limit: Some(500),
                ..TaskFilter::default()
            })
            .await?;

        let mut ranked: Vec<(usize, Task)> = candidates
            .into_iter()
            .filter_map(|task| {
                let haystacks = [
                    task.title.to_lowercase(),
                    task.description.clone().unwrap_or_default().to_lowercase(),
                    task.notes.clone().unwrap_or_default().to_lowercase(),
                ];
                let matches = terms
                    .iter()
                    .filter(|term| haystacks.iter().any(|h| h.contains(term.as_str())))
                    .count();
                (matches > 0).then_some((matches, task))
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
        });

        let limit = filter.limit.unwrap_or(10) as usize;
        Ok(ranked.into_iter().take(limit).map(|(_, t)| t).collect())
    }

    pub async fn stats(&self) -> Result<TaskStats, StoreError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                SUM(status = 'todo')        AS todo,
                SUM(status = 'in_progress') AS in_progress,
                SUM(status = 'completed')   AS completed,
                SUM(status = 'cancelled')   AS cancelled,
                SUM(deadline IS NOT NULL AND deadline >= ?1 AND status != 'completed') AS upcoming,
                SUM(deadline IS NOT NULL AND deadline < ?1 AND status != 'completed')  AS missed
            FROM tasks
            "#,
        )
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("STATS: {e}")))?;

        Ok(TaskStats {
            total: row.try_get::<i64, _>("total").unwrap_or(0),
            todo: row.try_get::<Option<i64>, _>("todo").ok().flatten().unwrap_or(0),
            in_progress: row
                .try_get::<Option<i64>, _>("in_progress")
                .ok()
                .flatten()
                .unwrap_or(0),
            completed: row
                .try_get::<Option<i64>, _>("completed")
                .ok()
                .flatten()
                .unwrap_or(0),
            cancelled: row
                .try_get::<Option<i64>, _>("cancelled")
                .ok()
                .flatten()
                .unwrap_or(0),
            upcoming_deadlines: row
                .try_get::<Option<i64>, _>("upcoming")
                .ok()
                .flatten()
                .unwrap_or(0),
            missed: row
                .try_get::<Option<i64>, _>("missed")
                .ok()
                .flatten()
                .unwrap_or(0),
        })
    }

    async fn persist(&self, task: &Task) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE tasks SET
                title = ?1, description = ?2, notes = ?3, priority = ?4,
                status = ?5, scheduled_date = ?6, deadline = ?7,
                updated_at = ?8, completed_at = ?9
            WHERE id = ?10
            "#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.notes)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(task.scheduled_date.to_rfc3339())
        .bind(task.deadline.map(|d| d.to_rfc3339()))
        .bind(task.updated_at.to_rfc3339())
        .bind(task.completed_at.map(|d| d.to_rfc3339()))
        .bind(task.id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE task: {e}")))?;
        Ok(())
    }
}

fn escape_like(s: &str) -> String {
    s.replace('%', "\\%").replace('_', "\\_")
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, StoreError> {
    let priority_raw: String = row
        .try_get("priority")
        .map_err(|e| StoreError::QueryFailed(format!("priority column: {e}")))?;
    let status_raw: String = row
        .try_get("status")
        .map_err(|e| StoreError::QueryFailed(format!("status column: {e}")))?;

    let priority: TaskPriority = priority_raw
        .parse()
        .map_err(|e: String| StoreError::QueryFailed(e))?;
    let status: TaskStatus = status_raw
        .parse()
        .map_err(|e: String| StoreError::QueryFailed(e))?;

    let scheduled_raw: String = row
        .try_get("scheduled_date")
        .map_err(|e| StoreError::QueryFailed(format!("scheduled_date column: {e}")))?;
    let created_raw: String = row
        .try_get("created_at")
        .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
    let updated_raw: String = row
        .try_get("updated_at")
        .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;
    let deadline_raw: Option<String> = row
        .try_get("deadline")
        .map_err(|e| StoreError::QueryFailed(format!("deadline column: {e}")))?;
    let completed_raw: Option<String> = row
        .try_get("completed_at")
        .map_err(|e| StoreError::QueryFailed(format!("completed_at column: {e}")))?;

    Ok(Task {
        id: row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?,
        title: row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?,
        description: row
            .try_get("description")
            .map_err(|e| StoreError::QueryFailed(format!("description column: {e}")))?,
        notes: row
            .try_get("notes")
            .map_err(|e| StoreError::QueryFailed(format!("notes column: {e}")))?,
        priority,
        status,
        scheduled_date: parse_datetime(&scheduled_raw, "scheduled_date")?,
        deadline: deadline_raw
            .as_deref()
            .map(|raw| parse_datetime(raw, "deadline"))
            .transpose()?,
        created_at: parse_datetime(&created_raw, "created_at")?,
        updated_at: parse_datetime(&updated_raw, "updated_at")?,
        completed_at: completed_raw
            .as_deref()
            .map(|raw| parse_datetime(raw, "completed_at"))
            .transpose()?,
    })
}
