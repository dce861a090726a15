//! `fabric submit-task` / `fabric task status` / `fabric task cancel` /
//! `fabric task run`.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use fabric_core::approval::SignalRegistry;
use fabric_core::orchestrator::{self, OrchestratorContext, OrchestratorOutcome};
use fabric_core::pricing::PricingTable;
use fabric_core::task;
use fabric_core::tools::ToolRegistry;
use fabric_db::models::PlanType;
use fabric_db::queries::tasks;

use crate::assets::{FileAssetQuery, FileHealthProbe};
use crate::llm::FileLlmProvider;
use crate::policy::FilePolicyEngine;

/// `fabric submit-task --tenant <t> --created-by <u> "<intent>"`.
pub async fn run_submit_task(
    pool: &PgPool,
    tenant_id: &str,
    created_by: &str,
    intent: &str,
) -> Result<()> {
    let task = task::submit_task(pool, tenant_id, created_by, intent).await?;
    println!("Task submitted.");
    println!("  ID:      {}", task.id);
    println!("  Tenant:  {}", task.tenant_id);
    println!("  Status:  {}", task.status);
    Ok(())
}

/// `fabric task status <task-id>`.
pub async fn run_status(pool: &PgPool, task_id_str: &str) -> Result<()> {
    let task_id: Uuid = task_id_str
        .parse()
        .with_context(|| format!("invalid task ID: {task_id_str:?}"))?;

    let view = task::get_task_view(pool, task_id)
        .await?
        .with_context(|| format!("task {task_id} not found"))?;

    println!("Task: {}", view.task.id);
    println!("  Tenant:   {}", view.task.tenant_id);
    println!("  Intent:   {}", view.task.intent);
    println!("  Status:   {}", view.task.status);
    println!(
        "  Created:  {}",
        view.task.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    match view.latest_plan {
        Some(plan) => {
            println!();
            println!("Latest plan: {}", plan.id);
            println!("  Type:      {}", plan.plan_type);
            println!("  Status:    {}", plan.status);
            println!(
                "  Gates:     schema={} policy={} safety={} overall={}",
                plan.schema_valid, plan.policy_valid, plan.safety_valid, plan.overall_valid
            );
            println!("  Quality:   {}", plan.quality_score);
        }
        None => println!("\nNo plan generated yet."),
    }

    match view.latest_run {
        Some(run) => {
            println!();
            println!("Latest run: {}", run.id);
            println!("  Environment: {}", run.environment);
            println!("  Status:      {}", run.status);
            println!(
                "  Phase:       {} ({} completed)",
                run.current_phase_index, run.phases_completed
            );
        }
        None => println!("\nNo run started yet."),
    }

    Ok(())
}

/// `fabric task cancel <task-id>`.
///
/// A task with no run yet (plan still draft/validated/awaiting approval)
/// is cancelled by failing it directly -- there is nothing else holding
/// state. A task whose plan has already been approved and is executing
/// or paused is owned by whichever process is currently driving its
/// workflow; this CLI invocation has no channel into that process's
/// in-memory signal registry, so it reports the situation honestly
/// instead of silently doing nothing.
pub async fn run_cancel(pool: &PgPool, task_id_str: &str) -> Result<()> {
    let task_id: Uuid = task_id_str
        .parse()
        .with_context(|| format!("invalid task ID: {task_id_str:?}"))?;

    let view = task::get_task_view(pool, task_id)
        .await?
        .with_context(|| format!("task {task_id} not found"))?;

    if let Some(run) = &view.latest_run {
        use fabric_db::models::RunStatus;
        if matches!(run.status, RunStatus::Executing | RunStatus::Paused) {
            anyhow::bail!(
                "task {task_id} has a run ({}) currently {}; this CLI process cannot \
                 reach the workflow worker driving it. Send it a cancel signal from the \
                 process that owns the run, or wait for it to reach a terminal state.",
                run.id,
                run.status
            );
        }
    }

    task::fail_task(pool, task_id, "cancelled by operator").await?;
    println!("Task {task_id} cancelled.");
    Ok(())
}

/// `fabric task run <task-id> --llm-fixture <path> --policy-fixture <path>
/// --assets-fixture <path> --agent-name <name> --model <model>
/// --environment <env> --plan-type <drift_plan|patch_plan|dr_runbook>
/// [--approval-deadline-secs <secs>]`.
///
/// Drives one `created` task through the agent loop, validation, and (if
/// the plan validates) a full workflow run, using fixture-backed
/// collaborators in place of real providers -- the manual, one-task
/// counterpart to [`fabric_core::orchestrator::run_worker_loop`], the way
/// `fabric drift tick` is the manual counterpart to the drift scheduler's
/// timer loop.
#[allow(clippy::too_many_arguments)]
pub async fn run_run(
    pool: &PgPool,
    task_id_str: &str,
    llm_fixture: &str,
    policy_fixture: &str,
    assets_fixture: &str,
    agent_name: &str,
    model: &str,
    environment: &str,
    plan_type_str: &str,
    approval_deadline_secs: u64,
) -> Result<()> {
    let task_id: Uuid = task_id_str
        .parse()
        .with_context(|| format!("invalid task ID: {task_id_str:?}"))?;

    let task = tasks::get_task(pool, task_id)
        .await?
        .with_context(|| format!("task {task_id} not found"))?;

    let plan_type: PlanType = plan_type_str
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid plan type: {plan_type_str:?}"))?;

    let provider = FileLlmProvider::new(llm_fixture);
    let policy = FilePolicyEngine::new(policy_fixture);
    let asset_query = FileAssetQuery::new(assets_fixture);
    let health = FileHealthProbe::new(assets_fixture);
    let tools = ToolRegistry::new();
    let pricing = PricingTable::empty();
    let registry = SignalRegistry::new();

    let ctx = OrchestratorContext {
        pricing: &pricing,
        provider: &provider,
        tools: &tools,
        policy: &policy,
        asset_query: &asset_query,
        health: &health,
        registry: &registry,
        agent_name,
        model,
        available_tools: vec![],
        environment,
        plan_type,
        approval_deadline: Duration::from_secs(approval_deadline_secs),
    };

    let outcome = orchestrator::run_task_to_completion(pool, task, &ctx).await?;

    match outcome {
        OrchestratorOutcome::AgentDidNotConverge => {
            println!("Task {task_id}: agent did not converge within its step budget.");
        }
        OrchestratorOutcome::PlanInvalid { denials } => {
            println!("Task {task_id}: plan rejected by the validator:");
            for denial in denials {
                println!("  - {denial}");
            }
        }
        OrchestratorOutcome::Workflow(result) => {
            println!("Task {task_id}: workflow finished with {result:?}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    // `run_submit_task`/`run_status`/`run_cancel` all require a live
    // Postgres pool; covered by fabric-core's integration test fixtures
    // rather than unit tests here.
}
