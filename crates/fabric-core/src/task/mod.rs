//! Task Store glue (C6).
//!
//! `fabric-db::queries::tasks`/`plans`/`runs` already provide the
//! optimistic-versioned CRUD; this module is the thin layer that drives
//! those functions forward in response to Agent Runtime and Workflow
//! Adapter events, attaching an audit event to every transition the way
//! the teacher's `state::dispatch` functions are always paired with a
//! caller that also records progress.

use anyhow::Result;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use fabric_db::models::{ActorKind, AuditEventKind, PlanType, Run, Task};
use fabric_db::queries::{plans, runs, tasks};

use crate::audit;

/// `SubmitTask(intent, tenant, user) -> task_id`.
pub async fn submit_task(
    pool: &PgPool,
    tenant_id: &str,
    created_by: &str,
    intent: &str,
) -> Result<Task> {
    let task = tasks::insert_task(pool, tenant_id, created_by, intent).await?;
    audit::record(
        pool,
        task.id,
        AuditEventKind::TaskCreated,
        ActorKind::User,
        created_by,
        serde_json::json!({"intent": intent}),
    )
    .await;
    Ok(task)
}

/// Transition `created -> parsing` ahead of handing the task to the
/// Agent Runtime.
pub async fn begin_parsing(pool: &PgPool, task: &Task) -> Result<Task, tasks::TaskUpdateError> {
    tasks::start_parsing(pool, task.id, task.version).await
}

/// Attach the parsed `TaskSpec` and transition `parsing -> planned`,
/// then insert the generated plan in `draft` state. Both the task
/// transition and the plan insert are recorded to the audit log.
pub async fn record_spec_and_plan(
    pool: &PgPool,
    task: &Task,
    task_spec: Value,
    plan_type: PlanType,
    plan_payload: Value,
) -> Result<(Task, fabric_db::models::Plan)> {
    let updated = tasks::record_task_spec_and_plan(pool, task.id, task_spec, task.version).await?;
    audit::record(
        pool,
        task.id,
        AuditEventKind::TaskParsed,
        ActorKind::Agent,
        "agent-runtime",
        serde_json::json!({}),
    )
    .await;

    let plan = plans::insert_plan(pool, task.id, plan_type, plan_payload).await?;
    audit::record(
        pool,
        task.id,
        AuditEventKind::PlanGenerated,
        ActorKind::Agent,
        "agent-runtime",
        serde_json::json!({"plan_id": plan.id}),
    )
    .await;

    Ok((updated, plan))
}

/// Mark a task `failed` (agent did not converge, quota exceeded with no
/// plan produced) and record why.
pub async fn fail_task(pool: &PgPool, task_id: Uuid, reason: &str) -> Result<()> {
    tasks::fail_task(pool, task_id).await?;
    audit::record(
        pool,
        task_id,
        AuditEventKind::TaskFailed,
        ActorKind::System,
        "system",
        serde_json::json!({"reason": reason}),
    )
    .await;
    Ok(())
}

/// `GetTask(task_id) -> {task, latest_plan, latest_run}`.
pub struct TaskView {
    pub task: Task,
    pub latest_plan: Option<fabric_db::models::Plan>,
    pub latest_run: Option<Run>,
}

pub async fn get_task_view(pool: &PgPool, task_id: Uuid) -> Result<Option<TaskView>> {
    let Some(task) = tasks::get_task(pool, task_id).await? else {
        return Ok(None);
    };
    let latest_plan = plans::latest_plan_for_task(pool, task_id).await?;
    let latest_run = match &latest_plan {
        Some(plan) => runs::latest_run_for_plan(pool, plan.id).await?,
        None => None,
    };
    Ok(Some(TaskView {
        task,
        latest_plan,
        latest_run,
    }))
}
