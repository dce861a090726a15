//! Database query functions for the `plans` and `plan_approvals` tables.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ApprovalDecision, Plan, PlanApproval, PlanStatus, PlanType};

/// Insert a new plan row in `draft` state, not yet validated.
pub async fn insert_plan(
    pool: &PgPool,
    task_id: Uuid,
    plan_type: PlanType,
    payload: serde_json::Value,
) -> Result<Plan> {
    let plan = sqlx::query_as::<_, Plan>(
        "INSERT INTO plans (task_id, plan_type, payload, denials, status) \
         VALUES ($1, $2, $3, '[]'::jsonb, 'draft') \
         RETURNING *",
    )
    .bind(task_id)
    .bind(plan_type)
    .bind(payload)
    .fetch_one(pool)
    .await
    .context("failed to insert plan")?;

    Ok(plan)
}

pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// Latest plan for a task (by creation time), if any.
pub async fn latest_plan_for_task(pool: &PgPool, task_id: Uuid) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE task_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch latest plan for task")?;

    Ok(plan)
}

/// Record the three-gate validation outcome. Transitions `draft -> validated`
/// when all three pass; otherwise the plan stays `draft` with the denial
/// list attached (`overall_valid = schema_valid & policy_valid & safety_valid`
/// is computed and asserted here, not trusted from the caller).
pub async fn record_validation(
    pool: &PgPool,
    id: Uuid,
    schema_valid: bool,
    policy_valid: bool,
    safety_valid: bool,
    denials: serde_json::Value,
    quality_score: i16,
) -> Result<Plan> {
    let overall_valid = schema_valid && policy_valid && safety_valid;
    let new_status = if overall_valid {
        PlanStatus::Validated
    } else {
        PlanStatus::Draft
    };

    let plan = sqlx::query_as::<_, Plan>(
        "UPDATE plans \
         SET schema_valid = $1, policy_valid = $2, safety_valid = $3, overall_valid = $4, \
             denials = $5, quality_score = $6, status = $7, version = version + 1, updated_at = now() \
         WHERE id = $8 \
         RETURNING *",
    )
    .bind(schema_valid)
    .bind(policy_valid)
    .bind(safety_valid)
    .bind(overall_valid)
    .bind(denials)
    .bind(quality_score)
    .bind(new_status)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to record plan validation")?
    .with_context(|| format!("plan {id} not found"))?;

    Ok(plan)
}

/// Move a validated plan to `awaiting_approval` ahead of HITL suspension.
pub async fn mark_awaiting_approval(pool: &PgPool, id: Uuid) -> Result<Plan> {
    let plan = sqlx::query_as::<_, Plan>(
        "UPDATE plans SET status = 'awaiting_approval', version = version + 1, updated_at = now() \
         WHERE id = $1 AND status = 'validated' \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to mark plan awaiting approval")?;

    match plan {
        Some(p) => Ok(p),
        None => {
            let existing = get_plan(pool, id).await?;
            match existing {
                None => anyhow::bail!("plan {id} not found"),
                Some(p) => anyhow::bail!(
                    "plan {id} cannot await approval: current status is {} (must be validated)",
                    p.status
                ),
            }
        }
    }
}

/// Approve or reject a plan, recording the approval row in the same
/// transaction that flips plan status -- a plan in `approved` always has
/// exactly one approval record because the approval insert and the status
/// transition either both happen or neither does.
///
/// Returns `Ok(None)` if the plan is no longer `awaiting_approval` (an
/// already-decided plan): the caller treats this as the idempotent
/// "already decided" case rather than an error, matching the Approval
/// Gateway's `already_approved=true` contract.
pub async fn decide_plan(
    pool: &PgPool,
    plan_id: Uuid,
    approver_id: &str,
    decision: ApprovalDecision,
    note: Option<&str>,
) -> Result<Option<Plan>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let new_status = match decision {
        ApprovalDecision::Approved => PlanStatus::Approved,
        ApprovalDecision::Rejected => PlanStatus::Rejected,
    };

    let plan = sqlx::query_as::<_, Plan>(
        "UPDATE plans SET status = $1, version = version + 1, updated_at = now() \
         WHERE id = $2 AND status = 'awaiting_approval' \
         RETURNING *",
    )
    .bind(new_status)
    .bind(plan_id)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to transition plan on decision")?;

    let Some(plan) = plan else {
        tx.rollback().await.ok();
        return Ok(None);
    };

    sqlx::query(
        "INSERT INTO plan_approvals (plan_id, approver_id, decision, note) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (plan_id) DO NOTHING",
    )
    .bind(plan_id)
    .bind(approver_id)
    .bind(decision)
    .bind(note)
    .execute(&mut *tx)
    .await
    .context("failed to insert plan approval")?;

    tx.commit().await.context("failed to commit plan decision")?;
    Ok(Some(plan))
}

pub async fn get_approval(pool: &PgPool, plan_id: Uuid) -> Result<Option<PlanApproval>> {
    let approval = sqlx::query_as::<_, PlanApproval>(
        "SELECT * FROM plan_approvals WHERE plan_id = $1",
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch plan approval")?;

    Ok(approval)
}

/// List plans in `awaiting_approval` for a tenant (joins through `tasks`).
pub async fn list_pending_for_tenant(pool: &PgPool, tenant_id: &str) -> Result<Vec<Plan>> {
    let plans = sqlx::query_as::<_, Plan>(
        "SELECT p.* FROM plans p \
         JOIN tasks t ON t.id = p.task_id \
         WHERE t.tenant_id = $1 AND p.status = 'awaiting_approval' \
         ORDER BY p.created_at ASC",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
    .context("failed to list pending plans for tenant")?;

    Ok(plans)
}
