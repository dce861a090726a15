//! `CoreError` -- the structured error kinds surfaced across crate
//! boundaries. Call sites that only need to propagate use `anyhow::Result`
//! with `.context(...)`; call sites that need to match on a specific kind
//! (the agent loop on `QuotaExceeded`, the CLI on `ValidationFailed`) use
//! this enum instead.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("tenant {tenant_id} exceeded quota: {reason}")]
    QuotaExceeded { tenant_id: String, reason: String },

    #[error("plan {plan_id} failed validation: {denials:?}")]
    ValidationFailed { plan_id: Uuid, denials: Vec<String> },

    #[error("approval for task {task_id} timed out waiting for a signal")]
    ApprovalTimeout { task_id: Uuid },

    #[error("provider call failed transiently: {0}")]
    ProviderTransient(String),

    #[error("provider call failed permanently: {0}")]
    ProviderPermanent(String),

    #[error("policy denied plan {plan_id}: {denials:?}")]
    PolicyDenied { plan_id: Uuid, denials: Vec<String> },

    #[error("activity failed (transient) for run {run_id} phase {phase_index}: {message}")]
    ActivityTransient {
        run_id: Uuid,
        phase_index: i32,
        message: String,
    },

    #[error("activity failed (permanent) for run {run_id} phase {phase_index}: {message}")]
    ActivityPermanent {
        run_id: Uuid,
        phase_index: i32,
        message: String,
    },

    #[error("agent did not converge for task {task_id} after {steps} steps")]
    AgentDidNotConverge { task_id: Uuid, steps: u32 },
}
