//! Task -> Plan -> Run orchestration glue.
//!
//! Wires the Agent Runtime (C4), Plan Validator (C5), and Workflow Engine
//! Adapter (C7) into one executable path per task, the way the teacher's
//! `run_orchestrator` drives `run_agent_lifecycle` forward for each task it
//! pops off its queue (`orchestrator/mod.rs`). `fabric-cli`'s `task run`
//! subcommand calls [`run_task_to_completion`] for one task at a time;
//! [`run_worker_loop`] is the generalization that polls for every `created`
//! task on a timer -- the background "workflow/activity worker loop"
//! alongside the drift scheduler and pricing refresh timers.

use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fabric_db::models::{PlanType, Task, TaskStatus};
use fabric_db::queries::{plans, tasks};

use crate::agent::{self, AgentLoopState, AgentOutcome};
use crate::approval::SignalRegistry;
use crate::collaborators::{AssetQuery, ChatMessage, HealthProbe, LLMProvider, PolicyEngine, ToolSpec};
use crate::pricing::PricingTable;
use crate::task;
use crate::tools::ToolRegistry;
use crate::validator::{self, PlanValidationVerdict};
use crate::workflow::{self, WorkflowOutcome};

/// The collaborators one task's run through the pipeline needs, bundled
/// the way [`crate::gateway::InvokeRequest`] bundles one gateway call's
/// inputs rather than passing each as its own argument.
pub struct OrchestratorContext<'a> {
    pub pricing: &'a PricingTable,
    pub provider: &'a dyn LLMProvider,
    pub tools: &'a ToolRegistry,
    pub policy: &'a dyn PolicyEngine,
    pub asset_query: &'a dyn AssetQuery,
    pub health: &'a dyn HealthProbe,
    pub registry: &'a SignalRegistry,
    pub agent_name: &'a str,
    pub model: &'a str,
    pub available_tools: Vec<ToolSpec>,
    pub environment: &'a str,
    pub plan_type: PlanType,
    pub approval_deadline: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorOutcome {
    AgentDidNotConverge,
    PlanInvalid { denials: Vec<String> },
    Workflow(WorkflowOutcome),
}

/// An agent's stop payload doubles as both the validated plan payload and
/// the carrier for `TaskSpec.hitl_required` -- read directly off the same
/// JSON object rather than re-deriving it from tool risk tags, since the
/// agent is in the best position to know whether its own plan needs human
/// sign-off.
fn hitl_required(payload: &serde_json::Value) -> bool {
    payload
        .get("hitl_required")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

/// Drive one task from `created` through the agent loop, validation, and
/// (if the plan validates) a full workflow run, returning whichever stage
/// the task stopped at.
pub async fn run_task_to_completion(
    pool: &PgPool,
    task: Task,
    ctx: &OrchestratorContext<'_>,
) -> Result<OrchestratorOutcome> {
    let task = task::begin_parsing(pool, &task).await?;

    let state = AgentLoopState {
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: "Produce a plan (phases, canary_required, max_batch_percent, \
                          rollback_if per phase, hitl_required) as your stop payload, \
                          calling tools first if you need more information."
                    .to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: task.intent.clone(),
            },
        ],
    };

    let outcome = agent::run_agent_loop(
        pool,
        ctx.pricing,
        ctx.provider,
        ctx.tools,
        task.id,
        &task.tenant_id,
        ctx.agent_name,
        ctx.model,
        ctx.available_tools.clone(),
        state,
    )
    .await?;

    let payload = match outcome {
        AgentOutcome::DidNotConverge => {
            task::fail_task(pool, task.id, "agent did not converge").await?;
            return Ok(OrchestratorOutcome::AgentDidNotConverge);
        }
        AgentOutcome::Plan(payload) => payload,
    };

    let (task, plan) = task::record_spec_and_plan(
        pool,
        &task,
        payload.clone(),
        ctx.plan_type,
        payload.clone(),
    )
    .await?;

    let verdict = validator::run_validation(pool, ctx.policy, &plan).await?;
    let denials = match verdict {
        PlanValidationVerdict::Valid { .. } => None,
        PlanValidationVerdict::Invalid { denials } => Some(denials),
    };
    if let Some(denials) = denials {
        task::fail_task(
            pool,
            task.id,
            &format!("plan invalid: {}", denials.join("; ")),
        )
        .await?;
        return Ok(OrchestratorOutcome::PlanInvalid { denials });
    }

    let hitl = hitl_required(&payload);
    if hitl {
        plans::mark_awaiting_approval(pool, plan.id).await?;
    }

    let (tx, rx) = mpsc::channel(4);
    ctx.registry.register(plan.id, tx).await;
    let cancel = CancellationToken::new();

    let result = workflow::run_workflow(
        pool,
        ctx.asset_query,
        ctx.health,
        &plan,
        &task.tenant_id,
        ctx.environment,
        hitl,
        ctx.approval_deadline,
        rx,
        cancel,
    )
    .await;

    ctx.registry.deregister(plan.id).await;

    Ok(OrchestratorOutcome::Workflow(result?))
}

/// Poll every `created` task on `interval` and drive each one forward,
/// the generalization of the teacher's `run_orchestrator` main loop and
/// the sibling of [`crate::drift::run_scheduler_loop`]. A task claimed by
/// a concurrent worker loses the `start_parsing` optimistic-version race
/// and is simply skipped this tick, not retried.
pub async fn run_worker_loop(
    pool: &PgPool,
    ctx: &OrchestratorContext<'_>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pending = match tasks::list_by_status(pool, TaskStatus::Created).await {
                    Ok(pending) => pending,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to list created tasks");
                        continue;
                    }
                };
                for task in pending {
                    let task_id = task.id;
                    match run_task_to_completion(pool, task, ctx).await {
                        Ok(outcome) => {
                            tracing::info!(task_id = %task_id, outcome = ?outcome, "task driven forward");
                        }
                        Err(e) => {
                            tracing::warn!(task_id = %task_id, error = %e, "task orchestration attempt failed");
                        }
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("workflow/activity worker loop stopping on cancel");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hitl_required_reads_flag_from_payload() {
        assert!(hitl_required(&serde_json::json!({"hitl_required": true})));
        assert!(!hitl_required(&serde_json::json!({"hitl_required": false})));
    }

    #[test]
    fn hitl_required_defaults_false_when_absent() {
        assert!(!hitl_required(&serde_json::json!({})));
    }
}
