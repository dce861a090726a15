//! Approval Gateway (C10).
//!
//! `fabric_db::queries::plans::decide_plan` is the durable half of a
//! decision: it flips plan status and records the approval row in one
//! transaction. This module is the other half -- waking up whichever
//! workflow is currently suspended on `wait_for_signal("approval", ...)`
//! for that plan's task. The registry below is the in-process
//! generalization of the teacher's per-task signal channel
//! (`orchestrator`'s `LifecycleDone` sender map): a decision recorded
//! while no workflow is registered (the process restarted after the
//! plan suspended) is not lost, because the decision itself already
//! persisted -- the workflow's own resume path re-reads plan status
//! before waiting on a fresh channel.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use fabric_db::models::{ApprovalDecision, Plan};
use fabric_db::queries::plans;

use crate::workflow::WorkflowSignal;

/// Registry of live signal senders, keyed by plan id. A workflow
/// registers its sender when it suspends to await approval and
/// deregisters (implicitly, by the sender being dropped) once resumed.
#[derive(Clone, Default)]
pub struct SignalRegistry {
    senders: Arc<Mutex<HashMap<Uuid, mpsc::Sender<WorkflowSignal>>>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, plan_id: Uuid, sender: mpsc::Sender<WorkflowSignal>) {
        self.senders.lock().await.insert(plan_id, sender);
    }

    pub async fn deregister(&self, plan_id: Uuid) {
        self.senders.lock().await.remove(&plan_id);
    }

    async fn send(&self, plan_id: Uuid, signal: WorkflowSignal) -> bool {
        let senders = self.senders.lock().await;
        match senders.get(&plan_id) {
            Some(tx) => tx.send(signal).await.is_ok(),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub already_decided: bool,
    pub plan: Option<Plan>,
}

/// List plans awaiting a human decision for a tenant.
pub async fn list_pending(pool: &PgPool, tenant_id: &str) -> Result<Vec<Plan>> {
    Ok(plans::list_pending_for_tenant(pool, tenant_id).await?)
}

/// Approve a plan: persist the decision, then signal the waiting
/// workflow if one is currently registered. Idempotent -- approving an
/// already-decided plan is reported back as `already_decided`, not an
/// error, so a retried client request or a double-click in a UI never
/// produces a confusing failure.
pub async fn approve(
    pool: &PgPool,
    registry: &SignalRegistry,
    plan_id: Uuid,
    approver_id: &str,
    note: Option<&str>,
) -> Result<DecisionOutcome> {
    decide(pool, registry, plan_id, approver_id, ApprovalDecision::Approved, note).await
}

/// Reject a plan. Same idempotency contract as [`approve`].
pub async fn reject(
    pool: &PgPool,
    registry: &SignalRegistry,
    plan_id: Uuid,
    approver_id: &str,
    note: Option<&str>,
) -> Result<DecisionOutcome> {
    decide(pool, registry, plan_id, approver_id, ApprovalDecision::Rejected, note).await
}

async fn decide(
    pool: &PgPool,
    registry: &SignalRegistry,
    plan_id: Uuid,
    approver_id: &str,
    decision: ApprovalDecision,
    note: Option<&str>,
) -> Result<DecisionOutcome> {
    let plan = plans::decide_plan(pool, plan_id, approver_id, decision, note).await?;

    match plan {
        Some(plan) => {
            let signal = match decision {
                ApprovalDecision::Approved => WorkflowSignal::Approval(ApprovalDecision::Approved),
                ApprovalDecision::Rejected => WorkflowSignal::Approval(ApprovalDecision::Rejected),
            };
            let delivered = registry.send(plan_id, signal).await;
            if !delivered {
                tracing::info!(
                    plan_id = %plan_id,
                    "no workflow currently registered for this plan; decision persisted, \
                     the workflow will observe it on resume"
                );
            }
            Ok(DecisionOutcome {
                already_decided: false,
                plan: Some(plan),
            })
        }
        None => {
            tracing::info!(plan_id = %plan_id, "plan already decided, ignoring duplicate decision");
            Ok(DecisionOutcome {
                already_decided: true,
                plan: plans::get_plan(pool, plan_id).await?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_returns_false_when_no_sender_registered() {
        let registry = SignalRegistry::new();
        let delivered = registry
            .send(Uuid::new_v4(), WorkflowSignal::Approval(ApprovalDecision::Approved))
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn register_then_send_delivers_signal() {
        let registry = SignalRegistry::new();
        let plan_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(1);
        registry.register(plan_id, tx).await;

        let delivered = registry
            .send(plan_id, WorkflowSignal::Approval(ApprovalDecision::Approved))
            .await;
        assert!(delivered);
        assert!(matches!(
            rx.recv().await,
            Some(WorkflowSignal::Approval(ApprovalDecision::Approved))
        ));
    }

    #[tokio::test]
    async fn deregister_stops_delivery() {
        let registry = SignalRegistry::new();
        let plan_id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(1);
        registry.register(plan_id, tx).await;
        registry.deregister(plan_id).await;

        let delivered = registry
            .send(plan_id, WorkflowSignal::Cancel)
            .await;
        assert!(!delivered);
    }
}
