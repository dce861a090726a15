//! Database query functions for the `audit_events` append-only log.
//!
//! Writes here are best-effort-durable: a failed insert is logged and
//! swallowed by the caller rather than aborting the operation it is
//! auditing, so a database hiccup never blocks a task, plan, or run
//! transition. `seq` is a per-task monotonic counter assigned inside the
//! same statement as the insert, not read-then-written, so concurrent
//! writers for the same task cannot collide.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ActorKind, AuditEvent, AuditEventKind};

/// Append an audit event for a task, assigning the next sequence number
/// atomically via a correlated subquery against existing rows.
pub async fn append_event(
    pool: &PgPool,
    task_id: Uuid,
    kind: AuditEventKind,
    actor_kind: ActorKind,
    actor_id: &str,
    details: Value,
) -> Result<AuditEvent> {
    let event = sqlx::query_as::<_, AuditEvent>(
        "INSERT INTO audit_events (task_id, seq, kind, actor_kind, actor_id, details) \
         VALUES ( \
             $1, \
             COALESCE((SELECT MAX(seq) FROM audit_events WHERE task_id = $1), 0) + 1, \
             $2, $3, $4, $5 \
         ) \
         RETURNING *",
    )
    .bind(task_id)
    .bind(kind)
    .bind(actor_kind)
    .bind(actor_id)
    .bind(details)
    .fetch_one(pool)
    .await
    .context("failed to append audit event")?;

    Ok(event)
}

/// Full event history for a task, in sequence order.
pub async fn list_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<AuditEvent>> {
    let events = sqlx::query_as::<_, AuditEvent>(
        "SELECT * FROM audit_events WHERE task_id = $1 ORDER BY seq ASC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to list audit events for task")?;

    Ok(events)
}

/// Events of a given kind for a task, in sequence order -- used to
/// reconstruct, e.g., every HITL decision recorded against a task.
pub async fn list_for_task_by_kind(
    pool: &PgPool,
    task_id: Uuid,
    kind: AuditEventKind,
) -> Result<Vec<AuditEvent>> {
    let events = sqlx::query_as::<_, AuditEvent>(
        "SELECT * FROM audit_events WHERE task_id = $1 AND kind = $2 ORDER BY seq ASC",
    )
    .bind(task_id)
    .bind(kind)
    .fetch_all(pool)
    .await
    .context("failed to list audit events for task by kind")?;

    Ok(events)
}
