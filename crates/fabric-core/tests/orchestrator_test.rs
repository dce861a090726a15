//! End-to-end Task -> Plan -> Run scenarios, driven through
//! `orchestrator::run_task_to_completion` against a real (temporary)
//! database with fixture-backed collaborators standing in for the
//! model backend, policy service, asset inventory, and health probe.

use std::time::Duration;

use fabric_core::approval::{self, SignalRegistry};
use fabric_core::orchestrator::{run_task_to_completion, OrchestratorContext, OrchestratorOutcome};
use fabric_core::pricing::PricingTable;
use fabric_core::task;
use fabric_core::tools::ToolRegistry;
use fabric_core::workflow::WorkflowOutcome;
use fabric_db::models::PlanType;
use fabric_db::queries::quotas;
use fabric_test_utils::fakes::{ConfigurableHealthProbe, FixedAssetQuery, FixedPolicyEngine, ScriptedLlmProvider};
use fabric_test_utils::{create_test_db, drop_test_db};

fn plan_payload(phases: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "summary": "patch a fleet",
        "affected_assets": ["asset-1"],
        "phases": phases,
        "canary_required": false,
        "max_batch_percent": 100,
        "agent_quality_hint": 80,
    })
}

async fn setup_quota(pool: &sqlx::PgPool, tenant_id: &str) {
    quotas::set_quota(pool, tenant_id, 1_000_000, 1_000_000, 1000, 1_000_000, 80)
        .await
        .expect("quota should be set");
}

#[tokio::test]
async fn happy_path_completes_every_phase() {
    let (pool, db_name) = create_test_db().await;
    let tenant_id = "acme";
    setup_quota(&pool, tenant_id).await;

    let task = task::submit_task(&pool, tenant_id, "operator", "patch the fleet")
        .await
        .expect("task should submit");

    let payload = plan_payload(serde_json::json!([{
        "name": "rollout",
        "asset_selector": "all",
        "batch_percent": 100,
        "wait_time_secs": 0,
        "health_checks": [],
        "rollback_if": null,
        "environment": "staging",
    }]));

    let provider = ScriptedLlmProvider::stopping_with(payload);
    let policy = FixedPolicyEngine::allow();
    let asset_query = FixedAssetQuery::uniform(vec!["asset-1".to_string()]);
    let health = ConfigurableHealthProbe::all_healthy();
    let registry = SignalRegistry::new();
    let pricing = PricingTable::empty();
    let tools = ToolRegistry::new();

    let ctx = OrchestratorContext {
        pricing: &pricing,
        provider: &provider,
        tools: &tools,
        policy: &policy,
        asset_query: &asset_query,
        health: &health,
        registry: &registry,
        agent_name: "fabric-agent",
        model: "fixture-model",
        available_tools: vec![],
        environment: "staging",
        plan_type: PlanType::PatchPlan,
        approval_deadline: Duration::from_secs(5),
    };

    let outcome = run_task_to_completion(&pool, task, &ctx)
        .await
        .expect("orchestration should succeed");

    assert_eq!(outcome, OrchestratorOutcome::Workflow(WorkflowOutcome::Completed));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn unhealthy_rollout_rolls_back() {
    let (pool, db_name) = create_test_db().await;
    let tenant_id = "acme";
    setup_quota(&pool, tenant_id).await;

    let task = task::submit_task(&pool, tenant_id, "operator", "patch the fleet")
        .await
        .expect("task should submit");

    let payload = plan_payload(serde_json::json!([{
        "name": "rollout",
        "asset_selector": "all",
        "batch_percent": 100,
        "wait_time_secs": 0,
        "health_checks": [],
        "rollback_if": null,
        "environment": "staging",
    }]));

    let provider = ScriptedLlmProvider::stopping_with(payload);
    let policy = FixedPolicyEngine::allow();
    let asset_query = FixedAssetQuery::uniform(vec!["asset-1".to_string()]);
    let health = ConfigurableHealthProbe::new();
    health.fail("asset-1", 0.9);
    let registry = SignalRegistry::new();
    let pricing = PricingTable::empty();
    let tools = ToolRegistry::new();

    let ctx = OrchestratorContext {
        pricing: &pricing,
        provider: &provider,
        tools: &tools,
        policy: &policy,
        asset_query: &asset_query,
        health: &health,
        registry: &registry,
        agent_name: "fabric-agent",
        model: "fixture-model",
        available_tools: vec![],
        environment: "staging",
        plan_type: PlanType::PatchPlan,
        approval_deadline: Duration::from_secs(5),
    };

    let outcome = run_task_to_completion(&pool, task, &ctx)
        .await
        .expect("orchestration should run to a terminal state");

    match outcome {
        OrchestratorOutcome::Workflow(WorkflowOutcome::RolledBack { reason }) => {
            assert!(reason.contains("unhealthy"), "unexpected reason: {reason}");
        }
        other => panic!("expected a rollback, got {other:?}"),
    }

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn invalid_plan_is_rejected_by_the_validator() {
    let (pool, db_name) = create_test_db().await;
    let tenant_id = "acme";
    setup_quota(&pool, tenant_id).await;

    let task = task::submit_task(&pool, tenant_id, "operator", "do something risky")
        .await
        .expect("task should submit");

    let payload = plan_payload(serde_json::json!([{
        "name": "rollout",
        "asset_selector": "all",
        "batch_percent": 100,
        "wait_time_secs": 0,
        "health_checks": [],
        "rollback_if": null,
        "environment": "staging",
    }]));

    let provider = ScriptedLlmProvider::stopping_with(payload);
    let policy = FixedPolicyEngine::deny(vec!["touches a protected asset class".to_string()]);
    let asset_query = FixedAssetQuery::uniform(vec!["asset-1".to_string()]);
    let health = ConfigurableHealthProbe::all_healthy();
    let registry = SignalRegistry::new();
    let pricing = PricingTable::empty();
    let tools = ToolRegistry::new();

    let ctx = OrchestratorContext {
        pricing: &pricing,
        provider: &provider,
        tools: &tools,
        policy: &policy,
        asset_query: &asset_query,
        health: &health,
        registry: &registry,
        agent_name: "fabric-agent",
        model: "fixture-model",
        available_tools: vec![],
        environment: "staging",
        plan_type: PlanType::PatchPlan,
        approval_deadline: Duration::from_secs(5),
    };

    let outcome = run_task_to_completion(&pool, task, &ctx)
        .await
        .expect("validator rejection is not an orchestration error");

    match outcome {
        OrchestratorOutcome::PlanInvalid { denials } => {
            assert_eq!(denials, vec!["touches a protected asset class".to_string()]);
        }
        other => panic!("expected a validator rejection, got {other:?}"),
    }

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn quota_exhausted_fails_before_a_plan_is_produced() {
    let (pool, db_name) = create_test_db().await;
    let tenant_id = "acme";
    // A cap of zero denies the very first call.
    quotas::set_quota(&pool, tenant_id, 0, 0, 1000, 1_000_000, 80)
        .await
        .expect("quota should be set");

    let task = task::submit_task(&pool, tenant_id, "operator", "patch the fleet")
        .await
        .expect("task should submit");

    let provider = ScriptedLlmProvider::stopping_with(plan_payload(serde_json::json!([])));
    let policy = FixedPolicyEngine::allow();
    let asset_query = FixedAssetQuery::uniform(vec![]);
    let health = ConfigurableHealthProbe::all_healthy();
    let registry = SignalRegistry::new();
    let pricing = PricingTable::empty();
    let tools = ToolRegistry::new();

    let ctx = OrchestratorContext {
        pricing: &pricing,
        provider: &provider,
        tools: &tools,
        policy: &policy,
        asset_query: &asset_query,
        health: &health,
        registry: &registry,
        agent_name: "fabric-agent",
        model: "fixture-model",
        available_tools: vec![],
        environment: "staging",
        plan_type: PlanType::PatchPlan,
        approval_deadline: Duration::from_secs(5),
    };

    let result = run_task_to_completion(&pool, task, &ctx).await;
    assert!(result.is_err(), "a denied quota check should surface as an error, not a silent outcome");

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn approval_timeout_rolls_back_without_a_decision() {
    let (pool, db_name) = create_test_db().await;
    let tenant_id = "acme";
    setup_quota(&pool, tenant_id).await;

    let task = task::submit_task(&pool, tenant_id, "operator", "run a DR drill")
        .await
        .expect("task should submit");

    let mut payload = plan_payload(serde_json::json!([{
        "name": "rollout",
        "asset_selector": "all",
        "batch_percent": 100,
        "wait_time_secs": 0,
        "health_checks": [],
        "rollback_if": null,
        "environment": "staging",
    }]));
    payload["hitl_required"] = serde_json::json!(true);

    let provider = ScriptedLlmProvider::stopping_with(payload);
    let policy = FixedPolicyEngine::allow();
    let asset_query = FixedAssetQuery::uniform(vec!["asset-1".to_string()]);
    let health = ConfigurableHealthProbe::all_healthy();
    let registry = SignalRegistry::new();
    let pricing = PricingTable::empty();
    let tools = ToolRegistry::new();

    let ctx = OrchestratorContext {
        pricing: &pricing,
        provider: &provider,
        tools: &tools,
        policy: &policy,
        asset_query: &asset_query,
        health: &health,
        registry: &registry,
        agent_name: "fabric-agent",
        model: "fixture-model",
        available_tools: vec![],
        environment: "staging",
        plan_type: PlanType::DrRunbook,
        // Deliberately short so the test doesn't wait real minutes.
        approval_deadline: Duration::from_millis(200),
    };

    let outcome = run_task_to_completion(&pool, task, &ctx)
        .await
        .expect("a timed-out approval is a terminal workflow outcome, not an error");

    match outcome {
        OrchestratorOutcome::Workflow(WorkflowOutcome::RolledBack { reason }) => {
            assert_eq!(reason, "approval_timeout");
        }
        other => panic!("expected an approval timeout rollback, got {other:?}"),
    }

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn rejecting_an_already_decided_plan_is_idempotent() {
    let (pool, db_name) = create_test_db().await;
    let tenant_id = "acme";
    setup_quota(&pool, tenant_id).await;

    let task = task::submit_task(&pool, tenant_id, "operator", "patch the fleet")
        .await
        .expect("task should submit");
    let task = task::begin_parsing(&pool, &task).await.expect("begin_parsing should succeed");
    let payload = plan_payload(serde_json::json!([]));
    let (_task, plan) = task::record_spec_and_plan(&pool, &task, payload.clone(), PlanType::PatchPlan, payload)
        .await
        .expect("recording spec+plan should succeed");

    let registry = SignalRegistry::new();

    let first = approval::reject(&pool, &registry, plan.id, "operator-a", None)
        .await
        .expect("first rejection should succeed");
    assert!(!first.already_decided);

    let second = approval::reject(&pool, &registry, plan.id, "operator-b", None)
        .await
        .expect("second rejection should not error");
    assert!(second.already_decided);

    drop_test_db(&db_name).await;
}
