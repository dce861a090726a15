//! Drift Scheduler (C8).
//!
//! Grounded on the teacher's scheduling-timer idiom: the periodic-tick
//! structure of `run_orchestrator`'s main loop, generalized from
//! "poll for runnable tasks" to "poll for tenants whose asset fleet has
//! drifted past a threshold." `tick_once` is the unit the timer loop
//! repeats forever; `fabric-cli`'s `drift tick` subcommand calls it
//! directly so the scheduler is testable and demoable without waiting
//! on the real interval.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use fabric_db::models::PlanType;
use fabric_db::queries::drift;

use crate::clock::Clock;
use crate::collaborators::{AssetFilter, AssetQuery};
use crate::task;

/// Default tick interval (SPEC_FULL §4.8): every 10 minutes.
pub const DEFAULT_TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

#[derive(Debug, Clone, Copy)]
pub struct DriftThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            warning: 0.10,
            critical: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriftTickResult {
    /// Fleet is within threshold; no task seeded.
    NoDrift { drift_score: f64 },
    /// Drift crossed a threshold and a new remediation task was seeded.
    Seeded {
        drift_score: f64,
        tier: &'static str,
        task_id: uuid::Uuid,
    },
    /// Drift crossed a threshold but a seed already exists for this
    /// tenant/day/tier -- no duplicate task opened.
    AlreadySeeded { drift_score: f64, tier: &'static str },
}

fn tier_for_score(score: f64, thresholds: DriftThresholds) -> Option<&'static str> {
    if score >= thresholds.critical {
        Some("critical")
    } else if score >= thresholds.warning {
        Some("warning")
    } else {
        None
    }
}

/// Evaluate drift for one tenant and seed a remediation task if the
/// score crosses a threshold and no seed exists yet today.
pub async fn tick_once(
    pool: &PgPool,
    asset_query: &dyn AssetQuery,
    clock: &dyn Clock,
    tenant_id: &str,
    thresholds: DriftThresholds,
) -> anyhow::Result<DriftTickResult> {
    let total = asset_query
        .list(&AssetFilter {
            tenant_id: tenant_id.to_string(),
            selector: "all".to_string(),
        })
        .await?;
    let drifted = asset_query
        .list(&AssetFilter {
            tenant_id: tenant_id.to_string(),
            selector: "drifted".to_string(),
        })
        .await?;

    let drift_score = if total.is_empty() {
        0.0
    } else {
        drifted.len() as f64 / total.len() as f64
    };

    let Some(tier) = tier_for_score(drift_score, thresholds) else {
        return Ok(DriftTickResult::NoDrift { drift_score });
    };

    let now: DateTime<Utc> = clock.now();
    let day_bucket = now.date_naive();

    if drift::seed_exists(pool, tenant_id, day_bucket, tier).await? {
        return Ok(DriftTickResult::AlreadySeeded { drift_score, tier });
    }

    let task = task::submit_task(
        pool,
        tenant_id,
        "drift-scheduler",
        "auto: remediate drift",
    )
    .await?;

    let (_seed, newly_claimed) = drift::claim_seed(pool, tenant_id, day_bucket, tier, task.id).await?;

    if !newly_claimed {
        // Lost a race against a concurrent tick that claimed the same
        // key between our existence check and this insert; fail the
        // duplicate task rather than leave a second live task racing
        // the original.
        task::fail_task(pool, task.id, "duplicate drift seed for tenant/day/tier").await.ok();
        return Ok(DriftTickResult::AlreadySeeded { drift_score, tier });
    }

    let task = task::begin_parsing(pool, &task).await?;
    let task_spec = serde_json::json!({
        "task_type": "drift_remediation",
        "drift_score": drift_score,
        "tier": tier,
    });
    task::record_spec_and_plan(
        pool,
        &task,
        task_spec,
        PlanType::DriftPlan,
        serde_json::json!({
            "summary": format!("remediate {tier} drift ({drift_score:.2}) for tenant {tenant_id}"),
            "affected_assets": drifted,
            "phases": [],
            "canary_required": true,
            "max_batch_percent": 10,
            "agent_quality_hint": 0,
        }),
    )
    .await
    .ok();

    Ok(DriftTickResult::Seeded {
        drift_score,
        tier,
        task_id: task.id,
    })
}

/// Run the periodic tick loop for a fixed set of tenants until
/// cancelled, the generalization of the teacher's orchestrator main
/// loop from "poll runnable tasks" to "poll tenant drift scores."
pub async fn run_scheduler_loop(
    pool: &PgPool,
    asset_query: &dyn AssetQuery,
    clock: &dyn Clock,
    tenant_ids: &[String],
    thresholds: DriftThresholds,
    interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for tenant_id in tenant_ids {
                    match tick_once(pool, asset_query, clock, tenant_id, thresholds).await {
                        Ok(DriftTickResult::Seeded { drift_score, tier, task_id }) => {
                            tracing::info!(tenant_id, drift_score, tier, %task_id, "drift remediation task seeded");
                        }
                        Ok(DriftTickResult::AlreadySeeded { drift_score, tier }) => {
                            tracing::debug!(tenant_id, drift_score, tier, "drift already has an open seed today");
                        }
                        Ok(DriftTickResult::NoDrift { drift_score }) => {
                            tracing::debug!(tenant_id, drift_score, "drift within threshold");
                        }
                        Err(e) => {
                            tracing::error!(tenant_id, error = %e, "drift tick failed");
                        }
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("drift scheduler loop stopping on cancel");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_for_score_picks_critical_over_warning() {
        let thresholds = DriftThresholds::default();
        assert_eq!(tier_for_score(0.30, thresholds), Some("critical"));
        assert_eq!(tier_for_score(0.15, thresholds), Some("warning"));
        assert_eq!(tier_for_score(0.01, thresholds), None);
    }

    #[test]
    fn tier_boundary_is_inclusive() {
        let thresholds = DriftThresholds::default();
        assert_eq!(tier_for_score(0.10, thresholds), Some("warning"));
        assert_eq!(tier_for_score(0.25, thresholds), Some("critical"));
    }

    #[test]
    fn default_thresholds_are_sane() {
        let thresholds = DriftThresholds::default();
        assert!(thresholds.warning < thresholds.critical);
    }
}
