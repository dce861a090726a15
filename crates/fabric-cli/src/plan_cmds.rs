//! `fabric plan approve` / `fabric plan reject` / `fabric plan pending`.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use fabric_core::approval::{self, SignalRegistry};

/// `fabric plan approve <plan-id> --by <approver>`.
///
/// A one-shot CLI invocation never has a live workflow registered in its
/// own `SignalRegistry` -- the registry only matters to the long-running
/// process actually driving the workflow. The decision still lands
/// durably; that process observes it when it next polls or resumes.
pub async fn run_approve(pool: &PgPool, plan_id_str: &str, approver: &str) -> Result<()> {
    let plan_id: Uuid = plan_id_str
        .parse()
        .with_context(|| format!("invalid plan ID: {plan_id_str:?}"))?;

    let registry = SignalRegistry::new();
    let outcome = approval::approve(pool, &registry, plan_id, approver, None).await?;

    if outcome.already_decided {
        println!("Plan {plan_id} was already decided; no change made.");
    } else {
        println!("Plan {plan_id} approved by {approver}.");
    }
    Ok(())
}

/// `fabric plan reject <plan-id> --by <approver> [--note <text>]`.
pub async fn run_reject(
    pool: &PgPool,
    plan_id_str: &str,
    approver: &str,
    note: Option<&str>,
) -> Result<()> {
    let plan_id: Uuid = plan_id_str
        .parse()
        .with_context(|| format!("invalid plan ID: {plan_id_str:?}"))?;

    let registry = SignalRegistry::new();
    let outcome = approval::reject(pool, &registry, plan_id, approver, note).await?;

    if outcome.already_decided {
        println!("Plan {plan_id} was already decided; no change made.");
    } else {
        println!("Plan {plan_id} rejected by {approver}.");
    }
    Ok(())
}

/// `fabric plan pending --tenant <t>`.
pub async fn run_pending(pool: &PgPool, tenant_id: &str) -> Result<()> {
    let plans = approval::list_pending(pool, tenant_id).await?;

    if plans.is_empty() {
        println!("No plans awaiting approval for tenant {tenant_id}.");
        return Ok(());
    }

    println!("{:<36}  {:<12}  {:>7}  TASK", "PLAN ID", "TYPE", "QUALITY");
    for plan in &plans {
        println!(
            "{:<36}  {:<12}  {:>7}  {}",
            plan.id, plan.plan_type, plan.quality_score, plan.task_id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_uuid() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        let parsed: Uuid = id.parse().unwrap();
        assert_eq!(parsed.to_string(), id);
    }

    #[test]
    fn parse_invalid_uuid() {
        let id = "not-a-uuid";
        let result: Result<Uuid, _> = id.parse();
        assert!(result.is_err());
    }
}
