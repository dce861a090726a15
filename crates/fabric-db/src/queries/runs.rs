//! Database query functions for the `runs` table and `phase_executions`
//! activity-idempotency records.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Run, RunStatus};

/// Insert a new run row in `queued` state for an approved plan.
/// A `Run` exists only for a plan in `approved` -- enforced by a foreign
/// key plus a partial check at the call site (the Workflow Engine Adapter
/// never calls this before the plan transition commits).
pub async fn insert_run(pool: &PgPool, plan_id: Uuid, environment: &str) -> Result<Run> {
    let run = sqlx::query_as::<_, Run>(
        "INSERT INTO runs (plan_id, environment, assets_touched, status) \
         VALUES ($1, $2, '[]'::jsonb, 'queued') \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(environment)
    .fetch_one(pool)
    .await
    .context("failed to insert run")?;

    Ok(run)
}

pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<Option<Run>> {
    let run = sqlx::query_as::<_, Run>("SELECT * FROM runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch run")?;

    Ok(run)
}

/// Latest run for a plan (by creation time), if any.
pub async fn latest_run_for_plan(pool: &PgPool, plan_id: Uuid) -> Result<Option<Run>> {
    let run = sqlx::query_as::<_, Run>(
        "SELECT * FROM runs WHERE plan_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch latest run for plan")?;

    Ok(run)
}

/// Transition `queued -> executing` (first start) or `paused -> executing`
/// (resume after HITL signal).
pub async fn start_or_resume_executing(pool: &PgPool, id: Uuid) -> Result<Run> {
    let run = sqlx::query_as::<_, Run>(
        "UPDATE runs SET status = 'executing', version = version + 1, updated_at = now() \
         WHERE id = $1 AND status IN ('queued', 'paused') \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to start/resume run")?;

    run.with_context(|| format!("run {id} not found or not in a resumable state"))
}

pub async fn mark_paused(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE runs SET status = 'paused', version = version + 1, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to mark run paused")?;
    Ok(())
}

/// Advance a run's phase progress after a phase reports healthy.
pub async fn advance_phase(pool: &PgPool, id: Uuid, phase_index: i32) -> Result<Run> {
    let run = sqlx::query_as::<_, Run>(
        "UPDATE runs \
         SET current_phase_index = $1, phases_completed = $1 + 1, version = version + 1, updated_at = now() \
         WHERE id = $2 \
         RETURNING *",
    )
    .bind(phase_index)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to advance run phase")?;

    run.with_context(|| format!("run {id} not found"))
}

/// Record final metrics and transition to a terminal status
/// (`completed`, `rolled_back`, or `failed`).
pub async fn finish_run(
    pool: &PgPool,
    id: Uuid,
    status: RunStatus,
    duration_ms: i64,
    assets_changed: i32,
    error_rate: f64,
) -> Result<Run> {
    let run = sqlx::query_as::<_, Run>(
        "UPDATE runs \
         SET status = $1, duration_ms = $2, assets_changed = $3, error_rate = $4, \
             version = version + 1, updated_at = now() \
         WHERE id = $5 \
         RETURNING *",
    )
    .bind(status)
    .bind(duration_ms)
    .bind(assets_changed)
    .bind(error_rate)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to finish run")?;

    run.with_context(|| format!("run {id} not found"))
}

/// Runs stuck in `executing` with no live workflow worker -- used at
/// process startup to recover from a crash mid-execution. Reset to
/// `paused` so the adapter's resume path picks them back up instead of
/// silently abandoning them.
pub async fn reset_orphaned_runs(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE runs SET status = 'paused', version = version + 1, updated_at = now() \
         WHERE status = 'executing'",
    )
    .execute(pool)
    .await
    .context("failed to reset orphaned runs")?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_is_constructible_for_every_terminal_state() {
        for s in [RunStatus::Completed, RunStatus::RolledBack, RunStatus::Failed] {
            assert_ne!(s.to_string(), "");
        }
    }
}
