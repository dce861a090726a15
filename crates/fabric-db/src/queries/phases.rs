//! Database query functions for `phase_executions`: the idempotency
//! ledger the Workflow Engine Adapter consults before applying or
//! compensating a phase's effect on an asset.
//!
//! Activity contract: applying a phase to an asset is idempotent given
//! `(run_id, phase_index, asset_id)`, enforced by a unique constraint
//! rather than by the caller remembering what it already did.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

/// Record that a phase applied to an asset. Returns `false` if this
/// `(run_id, phase_index, asset_id)` was already recorded, so a retried
/// activity can detect it already ran and skip re-applying.
pub async fn record_application(
    pool: &PgPool,
    run_id: Uuid,
    phase_index: i32,
    asset_id: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO phase_executions (run_id, phase_index, asset_id) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (run_id, phase_index, asset_id) DO NOTHING",
    )
    .bind(run_id)
    .bind(phase_index)
    .bind(asset_id)
    .execute(pool)
    .await
    .context("failed to record phase application")?;

    Ok(result.rows_affected() == 1)
}

/// Record that a phase's effect on an asset was compensated (rolled back).
pub async fn record_compensation(
    pool: &PgPool,
    run_id: Uuid,
    phase_index: i32,
    asset_id: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE phase_executions SET compensated_at = now() \
         WHERE run_id = $1 AND phase_index = $2 AND asset_id = $3",
    )
    .bind(run_id)
    .bind(phase_index)
    .bind(asset_id)
    .execute(pool)
    .await
    .context("failed to record compensation")?;
    Ok(())
}

/// Asset ids a phase has applied to and not yet compensated -- the
/// rollback driver's worklist when a later phase fails.
pub async fn uncompensated_assets(
    pool: &PgPool,
    run_id: Uuid,
    phase_index: i32,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT asset_id FROM phase_executions \
         WHERE run_id = $1 AND phase_index = $2 AND compensated_at IS NULL \
         ORDER BY asset_id",
    )
    .bind(run_id)
    .bind(phase_index)
    .fetch_all(pool)
    .await
    .context("failed to list uncompensated assets for phase")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// All phase indexes (descending) that a run has touched, for driving a
/// full rollback from the highest completed phase back to zero.
pub async fn touched_phase_indexes(pool: &PgPool, run_id: Uuid) -> Result<Vec<i32>> {
    let rows: Vec<(i32,)> = sqlx::query_as(
        "SELECT DISTINCT phase_index FROM phase_executions \
         WHERE run_id = $1 ORDER BY phase_index DESC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("failed to list touched phase indexes")?;

    Ok(rows.into_iter().map(|(i,)| i).collect())
}
