//! Database query functions for the `tasks` table.
//!
//! Task is the sole owner of the optimistic-versioning pattern used by every
//! entity in this crate: each row carries an integer `version`; every update
//! specifies the version it expects and the row-count of the `UPDATE`
//! disambiguates "not found" from "version mismatch".

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Task, TaskStatus};

/// Error returned when an optimistic-locked update does not match the
/// expected version (or the row has disappeared since the caller's read).
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskUpdateError {
    #[error("task {0} not found")]
    NotFound(Uuid),
    #[error("task {task_id} expected version {expected} but current version differs")]
    ConcurrentModification { task_id: Uuid, expected: i32 },
}

/// Insert a new task row in `created` state.
pub async fn insert_task(
    pool: &PgPool,
    tenant_id: &str,
    created_by: &str,
    intent: &str,
) -> Result<Task> {
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (tenant_id, created_by, intent, status) \
         VALUES ($1, $2, $3, 'created') \
         RETURNING *",
    )
    .bind(tenant_id)
    .bind(created_by)
    .bind(intent)
    .fetch_one(pool)
    .await
    .context("failed to insert task")?;

    Ok(task)
}

/// Fetch a task by its ID.
pub async fn get_task(pool: &PgPool, id: Uuid) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch task")?;

    Ok(task)
}

/// List every task currently in `status`, oldest first -- the read side
/// of the workflow/activity worker loop's poll, which then claims one by
/// racing `start_parsing`'s optimistic-versioned transition.
pub async fn list_by_status(pool: &PgPool, status: TaskStatus) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE status = $1 ORDER BY created_at ASC",
    )
    .bind(status)
    .fetch_all(pool)
    .await
    .context("failed to list tasks by status")?;

    Ok(tasks)
}

/// List tasks for a tenant, newest first.
pub async fn list_tasks_for_tenant(pool: &PgPool, tenant_id: &str) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE tenant_id = $1 ORDER BY created_at DESC",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
    .context("failed to list tasks for tenant")?;

    Ok(tasks)
}

/// Transition a task from `created` to `parsing`.
pub async fn start_parsing(pool: &PgPool, id: Uuid, expected_version: i32) -> Result<Task, TaskUpdateError> {
    transition_task_status(pool, id, TaskStatus::Created, TaskStatus::Parsing, expected_version).await
}

/// Transition a task's status with optimistic concurrency control.
///
/// The `WHERE` clause pins both the expected current status and the
/// expected version; a zero-row update means either the task vanished or
/// someone else mutated it first, and [`get_task`] is used afterward to
/// tell the two apart.
pub async fn transition_task_status(
    pool: &PgPool,
    id: Uuid,
    from: TaskStatus,
    to: TaskStatus,
    expected_version: i32,
) -> Result<Task, TaskUpdateError> {
    let result = sqlx::query_as::<_, Task>(
        "UPDATE tasks \
         SET status = $1, version = version + 1, updated_at = now() \
         WHERE id = $2 AND status = $3 AND version = $4 \
         RETURNING *",
    )
    .bind(to)
    .bind(id)
    .bind(from)
    .bind(expected_version)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!(task_id = %id, error = %e, "task status transition query failed");
        TaskUpdateError::NotFound(id)
    })?;

    match result {
        Some(task) => Ok(task),
        None => {
            let existing = get_task(pool, id).await.ok().flatten();
            match existing {
                None => Err(TaskUpdateError::NotFound(id)),
                Some(_) => Err(TaskUpdateError::ConcurrentModification {
                    task_id: id,
                    expected: expected_version,
                }),
            }
        }
    }
}

/// Attach the parsed `task_spec` JSON and transition `parsing -> planned`.
pub async fn record_task_spec_and_plan(
    pool: &PgPool,
    id: Uuid,
    task_spec: serde_json::Value,
    expected_version: i32,
) -> Result<Task, TaskUpdateError> {
    let result = sqlx::query_as::<_, Task>(
        "UPDATE tasks \
         SET task_spec = $1, status = 'planned', version = version + 1, updated_at = now() \
         WHERE id = $2 AND status = 'parsing' AND version = $3 \
         RETURNING *",
    )
    .bind(task_spec)
    .bind(id)
    .bind(expected_version)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!(task_id = %id, error = %e, "task plan-recording query failed");
        TaskUpdateError::NotFound(id)
    })?;

    match result {
        Some(task) => Ok(task),
        None => {
            let existing = get_task(pool, id).await.ok().flatten();
            match existing {
                None => Err(TaskUpdateError::NotFound(id)),
                Some(_) => Err(TaskUpdateError::ConcurrentModification {
                    task_id: id,
                    expected: expected_version,
                }),
            }
        }
    }
}

/// Mark a task `failed` regardless of its current (non-terminal) status.
/// Used when the agent loop aborts (quota exceeded, did not converge).
pub async fn fail_task(pool: &PgPool, id: Uuid) -> Result<()> {
    let result = sqlx::query(
        "UPDATE tasks SET status = 'failed', version = version + 1, updated_at = now() \
         WHERE id = $1 AND status != 'failed'",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to mark task failed")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("task {id} not found or already failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_modification_error_message_names_task_and_version() {
        let id = Uuid::nil();
        let err = TaskUpdateError::ConcurrentModification {
            task_id: id,
            expected: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains('3'));
    }

    #[test]
    fn not_found_error_message_names_task() {
        let id = Uuid::nil();
        let err = TaskUpdateError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
