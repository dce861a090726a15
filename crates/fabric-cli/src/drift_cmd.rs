//! `fabric drift tick`: manually trigger one drift-scheduler evaluation,
//! the same unit `fabric-core::drift::run_scheduler_loop` repeats on a
//! timer.

use anyhow::Result;
use sqlx::PgPool;

use fabric_core::clock::SystemClock;
use fabric_core::drift::{self, DriftThresholds, DriftTickResult};

use crate::assets::FileAssetQuery;

/// `fabric drift tick --tenant <t> --fixture <path> [--warning <f>] [--critical <f>]`.
///
/// `fixture` points at a JSON file describing the tenant's asset fleet
/// (see [`crate::assets`]); a missing fixture is treated as a fleet with
/// no assets, which always reports no drift.
pub async fn run_tick(
    pool: &PgPool,
    tenant_id: &str,
    fixture_path: &str,
    warning: f64,
    critical: f64,
) -> Result<()> {
    let asset_query = FileAssetQuery::new(fixture_path);
    let clock = SystemClock;
    let thresholds = DriftThresholds { warning, critical };

    let result = drift::tick_once(pool, &asset_query, &clock, tenant_id, thresholds).await?;

    match result {
        DriftTickResult::NoDrift { drift_score } => {
            println!("Tenant {tenant_id}: drift score {drift_score:.2}, within threshold.");
        }
        DriftTickResult::Seeded {
            drift_score,
            tier,
            task_id,
        } => {
            println!(
                "Tenant {tenant_id}: drift score {drift_score:.2} crossed {tier} threshold. \
                 Remediation task {task_id} seeded."
            );
        }
        DriftTickResult::AlreadySeeded { drift_score, tier } => {
            println!(
                "Tenant {tenant_id}: drift score {drift_score:.2} crossed {tier} threshold, \
                 but a remediation task for today already exists."
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    // Requires a live Postgres pool; covered by fabric-core's integration
    // test fixtures.
}
