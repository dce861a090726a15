//! Database query functions for `drift_task_seeds`: the idempotency
//! record that stops the Drift Scheduler from opening the same task
//! twice for the same finding.
//!
//! The idempotency key is `(tenant_id, day_bucket, threshold_tier)` --
//! a UTC calendar date, not a rolling 24h window, so the key is stable
//! across DST transitions and does not depend on wall-clock time of day.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::DriftTaskSeed;

/// Record a new drift-seeded task, or return the existing seed if this
/// `(tenant, day, tier)` was already claimed today. `false` in the
/// second element of the tuple means the caller should not open a new
/// task -- one already exists for this key.
pub async fn claim_seed(
    pool: &PgPool,
    tenant_id: &str,
    day_bucket: NaiveDate,
    threshold_tier: &str,
    task_id: Uuid,
) -> Result<(DriftTaskSeed, bool)> {
    let inserted = sqlx::query_as::<_, DriftTaskSeed>(
        "INSERT INTO drift_task_seeds (tenant_id, day_bucket, threshold_tier, task_id) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (tenant_id, day_bucket, threshold_tier) DO NOTHING \
         RETURNING *",
    )
    .bind(tenant_id)
    .bind(day_bucket)
    .bind(threshold_tier)
    .bind(task_id)
    .fetch_optional(pool)
    .await
    .context("failed to claim drift seed")?;

    if let Some(seed) = inserted {
        return Ok((seed, true));
    }

    let existing = sqlx::query_as::<_, DriftTaskSeed>(
        "SELECT * FROM drift_task_seeds \
         WHERE tenant_id = $1 AND day_bucket = $2 AND threshold_tier = $3",
    )
    .bind(tenant_id)
    .bind(day_bucket)
    .bind(threshold_tier)
    .fetch_one(pool)
    .await
    .context("drift seed conflicted but no existing row found")?;

    Ok((existing, false))
}

/// `true` if a seed already exists for this `(tenant, day, tier)` --
/// checked before a new Task is created, so the common case of a tenant
/// stuck at one drift tier never opens and then discards a task.
pub async fn seed_exists(
    pool: &PgPool,
    tenant_id: &str,
    day_bucket: NaiveDate,
    threshold_tier: &str,
) -> Result<bool> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT 1 FROM drift_task_seeds \
         WHERE tenant_id = $1 AND day_bucket = $2 AND threshold_tier = $3",
    )
    .bind(tenant_id)
    .bind(day_bucket)
    .bind(threshold_tier)
    .fetch_optional(pool)
    .await
    .context("failed to check drift seed existence")?;

    Ok(row.is_some())
}

pub async fn seeds_for_tenant_on(
    pool: &PgPool,
    tenant_id: &str,
    day_bucket: NaiveDate,
) -> Result<Vec<DriftTaskSeed>> {
    let seeds = sqlx::query_as::<_, DriftTaskSeed>(
        "SELECT * FROM drift_task_seeds WHERE tenant_id = $1 AND day_bucket = $2 \
         ORDER BY threshold_tier",
    )
    .bind(tenant_id)
    .bind(day_bucket)
    .fetch_all(pool)
    .await
    .context("failed to list drift seeds for tenant")?;

    Ok(seeds)
}
