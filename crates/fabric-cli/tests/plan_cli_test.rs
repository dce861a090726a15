//! Integration tests for the functions backing the `fabric plan` and
//! `fabric task` CLI commands (`plan approve`, `plan reject`, `plan
//! pending`, `task cancel`, `task status`).
//!
//! `fabric-cli` is bin-only, so these exercise the `fabric-core` layer
//! the CLI handlers call directly -- the same thing `gator-cli`'s own
//! `plan_cli_test.rs` did against `gator-core`. Each test creates an
//! isolated temporary database and drops it on completion. A plan is
//! driven to `awaiting_approval` by calling the same `fabric-db` query
//! functions the Plan Validator uses, rather than going through the full
//! Agent Runtime -- these tests are about the approval surface, not plan
//! generation.

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use fabric_core::approval::{self, SignalRegistry};
use fabric_core::task;
use fabric_db::models::{Plan, PlanStatus, PlanType, RunStatus, Task, TaskStatus};
use fabric_db::queries::{plans, runs};
use fabric_test_utils::{create_test_db, drop_test_db};

async fn submit_test_task(pool: &PgPool) -> Task {
    task::submit_task(pool, "acme", "operator@acme.test", "rotate the staging TLS cert")
        .await
        .expect("submit_task should succeed")
}

/// Insert a plan and push it straight to `awaiting_approval`, bypassing
/// the validator -- all three gates pass.
async fn awaiting_approval_plan(pool: &PgPool, task_id: Uuid) -> Plan {
    let plan = plans::insert_plan(
        pool,
        task_id,
        PlanType::DriftPlan,
        json!({"steps": ["rotate cert", "reload ingress"]}),
    )
    .await
    .expect("insert_plan should succeed");

    plans::record_validation(pool, plan.id, true, true, true, json!([]), 82)
        .await
        .expect("record_validation should succeed");

    plans::mark_awaiting_approval(pool, plan.id)
        .await
        .expect("mark_awaiting_approval should succeed")
}

// -----------------------------------------------------------------------
// Tests: approve / reject (the `fabric plan approve`/`reject` handlers)
// -----------------------------------------------------------------------

#[tokio::test]
async fn approve_pending_plan_transitions_to_approved() {
    let (pool, db_name) = create_test_db().await;

    let task = submit_test_task(&pool).await;
    let plan = awaiting_approval_plan(&pool, task.id).await;
    assert_eq!(plan.status, PlanStatus::AwaitingApproval);

    let registry = SignalRegistry::new();
    let outcome = approval::approve(&pool, &registry, plan.id, "reviewer@acme.test", None)
        .await
        .expect("approve should succeed");
    assert!(!outcome.already_decided);

    let reloaded = plans::get_plan(&pool, plan.id)
        .await
        .expect("get_plan should succeed")
        .expect("plan should still exist");
    assert_eq!(reloaded.status, PlanStatus::Approved);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn reject_pending_plan_transitions_to_rejected() {
    let (pool, db_name) = create_test_db().await;

    let task = submit_test_task(&pool).await;
    let plan = awaiting_approval_plan(&pool, task.id).await;

    let registry = SignalRegistry::new();
    let outcome = approval::reject(
        &pool,
        &registry,
        plan.id,
        "reviewer@acme.test",
        Some("needs a maintenance window"),
    )
    .await
    .expect("reject should succeed");
    assert!(!outcome.already_decided);

    let reloaded = plans::get_plan(&pool, plan.id)
        .await
        .expect("get_plan should succeed")
        .expect("plan should still exist");
    assert_eq!(reloaded.status, PlanStatus::Rejected);

    let approval_row = plans::get_approval(&pool, plan.id)
        .await
        .expect("get_approval should succeed")
        .expect("approval row should have been recorded");
    assert_eq!(approval_row.note.as_deref(), Some("needs a maintenance window"));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn approving_an_already_decided_plan_is_idempotent() {
    let (pool, db_name) = create_test_db().await;

    let task = submit_test_task(&pool).await;
    let plan = awaiting_approval_plan(&pool, task.id).await;

    let registry = SignalRegistry::new();
    approval::approve(&pool, &registry, plan.id, "first@acme.test", None)
        .await
        .expect("first approval should succeed");

    // A second decision on the same plan is reported, not treated as an error.
    let second = approval::approve(&pool, &registry, plan.id, "second@acme.test", None)
        .await
        .expect("second approval should be a no-op, not an error");
    assert!(second.already_decided);

    let reloaded = plans::get_plan(&pool, plan.id)
        .await
        .expect("get_plan should succeed")
        .expect("plan should still exist");
    assert_eq!(reloaded.status, PlanStatus::Approved);

    // Exactly one approval row survives -- the reject attempt never wrote one.
    let approval_row = plans::get_approval(&pool, plan.id)
        .await
        .expect("get_approval should succeed")
        .expect("approval row should exist");
    assert_eq!(approval_row.approver_id, "first@acme.test");

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn deciding_a_draft_plan_reports_already_decided() {
    let (pool, db_name) = create_test_db().await;

    let task = submit_test_task(&pool).await;
    let plan = plans::insert_plan(&pool, task.id, PlanType::PatchPlan, json!({}))
        .await
        .expect("insert_plan should succeed");

    let registry = SignalRegistry::new();
    let outcome = approval::approve(&pool, &registry, plan.id, "reviewer@acme.test", None)
        .await
        .expect("approve should not error on a plan outside awaiting_approval");
    assert!(outcome.already_decided);

    let reloaded = plans::get_plan(&pool, plan.id)
        .await
        .expect("get_plan should succeed")
        .expect("plan should still exist");
    assert_eq!(reloaded.status, PlanStatus::Draft);

    drop_test_db(&db_name).await;
}

// -----------------------------------------------------------------------
// Tests: pending (the `fabric plan pending` handler)
// -----------------------------------------------------------------------

#[tokio::test]
async fn pending_lists_only_awaiting_approval_plans_for_tenant() {
    let (pool, db_name) = create_test_db().await;

    let task_a = submit_test_task(&pool).await;
    let pending_plan = awaiting_approval_plan(&pool, task_a.id).await;

    let task_b = submit_test_task(&pool).await;
    let draft_plan = plans::insert_plan(&pool, task_b.id, PlanType::PatchPlan, json!({}))
        .await
        .expect("insert_plan should succeed");

    let pending = approval::list_pending(&pool, "acme")
        .await
        .expect("list_pending should succeed");
    let pending_ids: Vec<Uuid> = pending.iter().map(|p| p.id).collect();
    assert!(pending_ids.contains(&pending_plan.id));
    assert!(!pending_ids.contains(&draft_plan.id));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn pending_is_empty_for_a_tenant_with_no_plans() {
    let (pool, db_name) = create_test_db().await;

    let pending = approval::list_pending(&pool, "nobody")
        .await
        .expect("list_pending should succeed");
    assert!(pending.is_empty());

    drop_test_db(&db_name).await;
}

// -----------------------------------------------------------------------
// Tests: task status / cancel (the `fabric task status`/`cancel` handlers)
// -----------------------------------------------------------------------

#[tokio::test]
async fn cancel_task_with_no_run_fails_it_directly() {
    let (pool, db_name) = create_test_db().await;

    let task = submit_test_task(&pool).await;

    task::fail_task(&pool, task.id, "cancelled by operator")
        .await
        .expect("fail_task should succeed for a task with no run");

    let view = task::get_task_view(&pool, task.id)
        .await
        .expect("get_task_view should succeed")
        .expect("task should exist");
    assert_eq!(view.task.status, TaskStatus::Failed);
    assert!(view.latest_run.is_none());

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn status_view_surfaces_plan_and_run_once_both_exist() {
    let (pool, db_name) = create_test_db().await;

    let task = submit_test_task(&pool).await;
    let plan = awaiting_approval_plan(&pool, task.id).await;

    let registry = SignalRegistry::new();
    approval::approve(&pool, &registry, plan.id, "reviewer@acme.test", None)
        .await
        .expect("approve should succeed");

    let run = runs::insert_run(&pool, plan.id, "staging")
        .await
        .expect("insert_run should succeed");

    let view = task::get_task_view(&pool, task.id)
        .await
        .expect("get_task_view should succeed")
        .expect("task should exist");

    let latest_plan = view.latest_plan.expect("plan should be present");
    assert_eq!(latest_plan.id, plan.id);
    assert_eq!(latest_plan.status, PlanStatus::Approved);

    let latest_run = view.latest_run.expect("run should be present");
    assert_eq!(latest_run.id, run.id);
    assert_eq!(latest_run.status, RunStatus::Queued);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn status_view_is_none_for_unknown_task() {
    let (pool, db_name) = create_test_db().await;

    let view = task::get_task_view(&pool, Uuid::new_v4())
        .await
        .expect("get_task_view should succeed");
    assert!(view.is_none());

    drop_test_db(&db_name).await;
}
