//! Plan Validator (C5).
//!
//! Grounded directly on the teacher's `GateRunner::run_gate` (gate/mod.rs):
//! a runner that evaluates a fixed sequence of checks against one entity,
//! and returns an aggregate verdict -- `PlanValidationVerdict::Valid |
//! Invalid { denials }` plays the role of `GateVerdict::Passed | Failed`.
//! Three independent gates replace the teacher's single invariant-running
//! gate: schema, policy, safety.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use fabric_db::models::Plan;
use fabric_db::queries::plans;

use crate::collaborators::{HealthCheckSpec, PolicyEngine, PolicyInput};
use crate::error::CoreError;

/// The subset of a plan's JSON payload the validator inspects. The rest
/// of the payload (summary, risk assessment prose) passes through
/// untouched -- only the fields with invariants attached are modeled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasePayload {
    pub name: String,
    pub asset_selector: String,
    pub batch_percent: u8,
    pub wait_time_secs: u32,
    /// Typed health checks for this phase; an agent that omits them gets
    /// the workflow adapter's default single error-rate check.
    #[serde(default)]
    pub health_checks: Vec<HealthCheckSpec>,
    pub rollback_if: Option<String>,
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPayload {
    pub summary: String,
    pub affected_assets: Vec<String>,
    pub phases: Vec<PhasePayload>,
    pub canary_required: bool,
    pub max_batch_percent: u8,
    /// The generating agent's own confidence in the plan, 0-100.
    pub agent_quality_hint: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanValidationVerdict {
    Valid { quality_score: i16 },
    Invalid { denials: Vec<String> },
}

/// Schema gate: the payload must parse into [`PlanPayload`] and declare at
/// least one phase. An external validator is assumed for full JSON Schema
/// dialect support (Non-goals) -- this gate only checks the shape the rest
/// of the validator and the workflow adapter depend on.
fn schema_gate(payload: &serde_json::Value) -> Result<PlanPayload, String> {
    let parsed: PlanPayload = serde_json::from_value(payload.clone())
        .map_err(|e| format!("plan payload does not match expected schema: {e}"))?;
    if parsed.phases.is_empty() {
        return Err("plan has no phases".to_string());
    }
    Ok(parsed)
}

/// Safety gate (SPEC_FULL §4.5): canary phase present when required,
/// batch size within bound, rollback condition syntactically parseable,
/// no phase spans more than one environment.
fn safety_gate(plan: &PlanPayload) -> Vec<String> {
    let mut denials = Vec::new();

    if plan.canary_required {
        let has_canary = plan
            .phases
            .first()
            .is_some_and(|p| p.name.to_lowercase().contains("canary"));
        if !has_canary {
            denials.push("canary_required but no canary phase present".to_string());
        }
    }

    for phase in &plan.phases {
        if phase.batch_percent > plan.max_batch_percent {
            denials.push(format!(
                "phase {} batch_percent {} exceeds max_batch_percent {}",
                phase.name, phase.batch_percent, plan.max_batch_percent
            ));
        }
        if let Some(expr) = &phase.rollback_if {
            if let Err(e) = parse_rollback_condition(expr) {
                denials.push(format!(
                    "phase {} rollback_if is not parseable: {e}",
                    phase.name
                ));
            }
        }
        if phase.environment.contains(',') {
            denials.push(format!(
                "phase {} targets more than one environment: {}",
                phase.name, phase.environment
            ));
        }
    }

    denials
}

/// A rollback condition is a metric comparison: `metric op value`, e.g.
/// `error_rate > 0.01`. Only the shape is checked here; evaluation
/// against live metrics happens in the workflow adapter (C7).
fn parse_rollback_condition(expr: &str) -> Result<(), String> {
    let tokens: Vec<&str> = expr.split_whitespace().collect();
    if tokens.len() != 3 {
        return Err(format!("expected `metric op value`, got `{expr}`"));
    }
    if !["<", "<=", ">", ">=", "=="].contains(&tokens[1]) {
        return Err(format!("unknown comparison operator `{}`", tokens[1]));
    }
    tokens[2]
        .parse::<f64>()
        .map_err(|_| format!("threshold `{}` is not a number", tokens[2]))?;
    Ok(())
}

/// Run all three gates for a plan and persist the verdict.
///
/// `overall_valid = schema_valid & policy_valid & safety_valid` is
/// computed here and asserted by the storage layer
/// (`fabric_db::queries::plans::record_validation`), never trusted from
/// a caller.
pub async fn run_validation(
    pool: &PgPool,
    policy: &dyn PolicyEngine,
    plan: &Plan,
) -> Result<PlanValidationVerdict, CoreError> {
    let mut denials = Vec::new();

    let parsed = match schema_gate(&plan.payload) {
        Ok(p) => Some(p),
        Err(e) => {
            denials.push(e);
            None
        }
    };
    let schema_valid = parsed.is_some();

    let policy_input = PolicyInput {
        tenant_id: String::new(),
        plan_payload: plan.payload.clone(),
    };
    let policy_verdict = policy.evaluate(&policy_input).await?;
    if !policy_verdict.allow {
        denials.extend(policy_verdict.denials.clone());
    }
    let policy_valid = policy_verdict.allow;

    let safety_valid = match &parsed {
        Some(p) => {
            let safety_denials = safety_gate(p);
            let ok = safety_denials.is_empty();
            denials.extend(safety_denials);
            ok
        }
        None => false,
    };

    let quality_score = if schema_valid && policy_valid && safety_valid {
        let agent_hint = parsed.as_ref().map(|p| p.agent_quality_hint).unwrap_or(0) as i16;
        // Weighted blend: validator confidence (always 100 once here,
        // since all three gates passed) and the agent's own self-rating.
        ((100 + agent_hint) / 2).clamp(0, 100)
    } else {
        0
    };

    let denials_json = serde_json::to_value(&denials).unwrap_or(serde_json::json!([]));
    plans::record_validation(
        pool,
        plan.id,
        schema_valid,
        policy_valid,
        safety_valid,
        denials_json,
        quality_score,
    )
    .await
    .map_err(|e| {
        tracing::error!(plan_id = %plan.id, error = %e, "failed to record plan validation");
        CoreError::ValidationFailed {
            plan_id: plan.id,
            denials: denials.clone(),
        }
    })?;

    if schema_valid && policy_valid && safety_valid {
        Ok(PlanValidationVerdict::Valid { quality_score })
    } else {
        Ok(PlanValidationVerdict::Invalid { denials })
    }
}

/// Pick a winning plan among competing candidates for the same task:
/// highest `TaskSpec.agents` priority wins outright; quality score is
/// only a tiebreaker between plans from agents of equal priority
/// (SPEC_FULL §9, resolved Open Question).
pub fn select_winning_plan(candidates: Vec<(Uuid, u8, i16)>) -> Option<Uuid> {
    candidates
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)))
        .map(|(plan_id, _, _)| plan_id)
}
