//! Row types and state enums for every persisted entity.
//!
//! Every enum here follows the same shape: a `#[derive(sqlx::Type)]` backed
//! by `text`, a `serde` mapping with matching `rename_all`, a hand-written
//! `Display`/`FromStr` pair, and a dedicated `*ParseError` for invalid input.
//! This keeps the wire representation (JSON), the storage representation
//! (Postgres `text`), and Rust's own `Debug` output in lockstep without
//! pulling in a derive macro crate for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Parsing,
    Planned,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Created => "created",
            TaskStatus::Parsing => "parsing",
            TaskStatus::Planned => "planned",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {}", self.0)
    }
}
impl std::error::Error for TaskStatusParseError {}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(TaskStatus::Created),
            "parsing" => Ok(TaskStatus::Parsing),
            "planned" => Ok(TaskStatus::Planned),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(TaskStatusParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PlanStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Validated,
    AwaitingApproval,
    Approved,
    Rejected,
    Superseded,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Validated => "validated",
            PlanStatus::AwaitingApproval => "awaiting_approval",
            PlanStatus::Approved => "approved",
            PlanStatus::Rejected => "rejected",
            PlanStatus::Superseded => "superseded",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStatusParseError(pub String);

impl fmt::Display for PlanStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan status: {}", self.0)
    }
}
impl std::error::Error for PlanStatusParseError {}

impl FromStr for PlanStatus {
    type Err = PlanStatusParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PlanStatus::Draft),
            "validated" => Ok(PlanStatus::Validated),
            "awaiting_approval" => Ok(PlanStatus::AwaitingApproval),
            "approved" => Ok(PlanStatus::Approved),
            "rejected" => Ok(PlanStatus::Rejected),
            "superseded" => Ok(PlanStatus::Superseded),
            other => Err(PlanStatusParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PlanType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    DriftPlan,
    PatchPlan,
    DrRunbook,
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanType::DriftPlan => "drift_plan",
            PlanType::PatchPlan => "patch_plan",
            PlanType::DrRunbook => "dr_runbook",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTypeParseError(pub String);

impl fmt::Display for PlanTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan type: {}", self.0)
    }
}
impl std::error::Error for PlanTypeParseError {}

impl FromStr for PlanType {
    type Err = PlanTypeParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drift_plan" => Ok(PlanType::DriftPlan),
            "patch_plan" => Ok(PlanType::PatchPlan),
            "dr_runbook" => Ok(PlanType::DrRunbook),
            other => Err(PlanTypeParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Executing,
    Paused,
    Completed,
    RolledBack,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::Executing => "executing",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::RolledBack => "rolled_back",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatusParseError(pub String);

impl fmt::Display for RunStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid run status: {}", self.0)
    }
}
impl std::error::Error for RunStatusParseError {}

impl FromStr for RunStatus {
    type Err = RunStatusParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "executing" => Ok(RunStatus::Executing),
            "paused" => Ok(RunStatus::Paused),
            "completed" => Ok(RunStatus::Completed),
            "rolled_back" => Ok(RunStatus::RolledBack),
            "failed" => Ok(RunStatus::Failed),
            other => Err(RunStatusParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ToolRisk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ToolRisk {
    Read,
    MutateReversible,
    MutateIrreversible,
}

impl fmt::Display for ToolRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToolRisk::Read => "read",
            ToolRisk::MutateReversible => "mutate_reversible",
            ToolRisk::MutateIrreversible => "mutate_irreversible",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRiskParseError(pub String);

impl fmt::Display for ToolRiskParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid tool risk: {}", self.0)
    }
}
impl std::error::Error for ToolRiskParseError {}

impl FromStr for ToolRisk {
    type Err = ToolRiskParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(ToolRisk::Read),
            "mutate_reversible" => Ok(ToolRisk::MutateReversible),
            "mutate_irreversible" => Ok(ToolRisk::MutateIrreversible),
            other => Err(ToolRiskParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// UsageStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UsageStatus {
    Ok,
    Error,
    RateLimited,
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UsageStatus::Ok => "ok",
            UsageStatus::Error => "error",
            UsageStatus::RateLimited => "rate_limited",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageStatusParseError(pub String);

impl fmt::Display for UsageStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid usage status: {}", self.0)
    }
}
impl std::error::Error for UsageStatusParseError {}

impl FromStr for UsageStatus {
    type Err = UsageStatusParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(UsageStatus::Ok),
            "error" => Ok(UsageStatus::Error),
            "rate_limited" => Ok(UsageStatus::RateLimited),
            other => Err(UsageStatusParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditEventKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    TaskCreated,
    TaskParsed,
    TaskFailed,
    PlanGenerated,
    PlanValidated,
    PlanRejected,
    ApprovalGranted,
    ApprovalDenied,
    RunPhaseStarted,
    RunPhaseHealthy,
    RunPhaseFailed,
    RunRolledBack,
    RunCompleted,
    ToolInvoked,
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditEventKind::TaskCreated => "task.created",
            AuditEventKind::TaskParsed => "task.parsed",
            AuditEventKind::TaskFailed => "task.failed",
            AuditEventKind::PlanGenerated => "plan.generated",
            AuditEventKind::PlanValidated => "plan.validated",
            AuditEventKind::PlanRejected => "plan.rejected",
            AuditEventKind::ApprovalGranted => "approval.granted",
            AuditEventKind::ApprovalDenied => "approval.denied",
            AuditEventKind::RunPhaseStarted => "run.phase_started",
            AuditEventKind::RunPhaseHealthy => "run.phase_healthy",
            AuditEventKind::RunPhaseFailed => "run.phase_failed",
            AuditEventKind::RunRolledBack => "run.rolled_back",
            AuditEventKind::RunCompleted => "run.completed",
            AuditEventKind::ToolInvoked => "tool.invoked",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEventKindParseError(pub String);

impl fmt::Display for AuditEventKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid audit event kind: {}", self.0)
    }
}
impl std::error::Error for AuditEventKindParseError {}

impl FromStr for AuditEventKind {
    type Err = AuditEventKindParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task.created" => Ok(AuditEventKind::TaskCreated),
            "task.parsed" => Ok(AuditEventKind::TaskParsed),
            "task.failed" => Ok(AuditEventKind::TaskFailed),
            "plan.generated" => Ok(AuditEventKind::PlanGenerated),
            "plan.validated" => Ok(AuditEventKind::PlanValidated),
            "plan.rejected" => Ok(AuditEventKind::PlanRejected),
            "approval.granted" => Ok(AuditEventKind::ApprovalGranted),
            "approval.denied" => Ok(AuditEventKind::ApprovalDenied),
            "run.phase_started" => Ok(AuditEventKind::RunPhaseStarted),
            "run.phase_healthy" => Ok(AuditEventKind::RunPhaseHealthy),
            "run.phase_failed" => Ok(AuditEventKind::RunPhaseFailed),
            "run.rolled_back" => Ok(AuditEventKind::RunRolledBack),
            "run.completed" => Ok(AuditEventKind::RunCompleted),
            "tool.invoked" => Ok(AuditEventKind::ToolInvoked),
            other => Err(AuditEventKindParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ActorKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    User,
    Agent,
    System,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorKind::User => "user",
            ActorKind::Agent => "agent",
            ActorKind::System => "system",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorKindParseError(pub String);

impl fmt::Display for ActorKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid actor kind: {}", self.0)
    }
}
impl std::error::Error for ActorKindParseError {}

impl FromStr for ActorKind {
    type Err = ActorKindParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ActorKind::User),
            "agent" => Ok(ActorKind::Agent),
            "system" => Ok(ActorKind::System),
            other => Err(ActorKindParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ApprovalDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApprovalDecision::Approved => "approved",
            ApprovalDecision::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDecisionParseError(pub String);

impl fmt::Display for ApprovalDecisionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid approval decision: {}", self.0)
    }
}
impl std::error::Error for ApprovalDecisionParseError {}

impl FromStr for ApprovalDecision {
    type Err = ApprovalDecisionParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(ApprovalDecision::Approved),
            "rejected" => Ok(ApprovalDecision::Rejected),
            other => Err(ApprovalDecisionParseError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub tenant_id: String,
    pub created_by: String,
    pub intent: String,
    /// Parsed `TaskSpec`: task type, goal, risk level, hitl_required, etc.
    /// Stored as JSON rather than normalized -- it is read back whole and
    /// only ever written once, by the runtime that parsed the intent.
    pub task_spec: Option<serde_json::Value>,
    pub status: TaskStatus,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub task_id: Uuid,
    pub plan_type: PlanType,
    pub payload: serde_json::Value,
    pub schema_valid: bool,
    pub policy_valid: bool,
    pub safety_valid: bool,
    pub overall_valid: bool,
    pub denials: serde_json::Value,
    pub quality_score: i16,
    pub status: PlanStatus,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanApproval {
    pub plan_id: Uuid,
    pub approver_id: String,
    pub decision: ApprovalDecision,
    pub note: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Run {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub environment: String,
    pub current_phase_index: i32,
    pub phases_completed: i32,
    pub assets_touched: serde_json::Value,
    pub duration_ms: Option<i64>,
    pub assets_changed: i32,
    pub error_rate: Option<f64>,
    pub status: RunStatus,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PhaseExecution {
    pub run_id: Uuid,
    pub phase_index: i32,
    pub asset_id: String,
    pub applied_at: DateTime<Utc>,
    pub compensated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEvent {
    pub id: Uuid,
    pub task_id: Uuid,
    pub seq: i64,
    pub kind: AuditEventKind,
    pub actor_kind: ActorKind,
    pub actor_id: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub task_id: Option<Uuid>,
    pub agent_name: String,
    pub request_id: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
    pub cost_input_cents: i64,
    pub cost_output_cents: i64,
    pub cost_cache_creation_cents: i64,
    pub cost_cache_read_cents: i64,
    pub operation_type: String,
    pub latency_ms: i64,
    pub status: UsageStatus,
    pub prompt_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Sum of all four cost components, in integer cents.
    pub fn total_cost_cents(&self) -> i64 {
        self.cost_input_cents
            + self.cost_output_cents
            + self.cost_cache_creation_cents
            + self.cost_cache_read_cents
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModelPricing {
    pub provider: String,
    pub model: String,
    pub input_cents_per_mtok: i64,
    pub output_cents_per_mtok: i64,
    pub cache_creation_cents_per_mtok: i64,
    pub cache_read_cents_per_mtok: i64,
    pub updated_at: DateTime<Utc>,
}

impl ModelPricing {
    /// Conservative default applied when a `(provider, model)` pair has no
    /// pricing-table entry: 300¢/MTok in, 1500¢/MTok out.
    pub fn fallback(provider: &str, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            input_cents_per_mtok: 300,
            output_cents_per_mtok: 1500,
            cache_creation_cents_per_mtok: 300,
            cache_read_cents_per_mtok: 30,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrgLlmQuota {
    pub tenant_id: String,
    pub monthly_token_limit: i64,
    pub monthly_cost_cap_cents: i64,
    pub requests_per_minute: i32,
    pub tokens_per_minute: i32,
    pub alert_threshold_percent: i16,
    /// Start of the current fixed rate-limit window.
    pub window_started_at: DateTime<Utc>,
    /// Requests admitted so far in the current window.
    pub window_request_count: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DriftTaskSeed {
    pub tenant_id: String,
    pub day_bucket: chrono::NaiveDate,
    pub threshold_tier: String,
    pub task_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! roundtrip_test {
        ($name:ident, $ty:ty, $variants:expr) => {
            #[test]
            fn $name() {
                for v in $variants {
                    let s = v.to_string();
                    let parsed: $ty = s.parse().unwrap();
                    assert_eq!(parsed, v);
                }
            }
        };
    }

    roundtrip_test!(
        task_status_roundtrip,
        TaskStatus,
        [
            TaskStatus::Created,
            TaskStatus::Parsing,
            TaskStatus::Planned,
            TaskStatus::Failed,
        ]
    );

    roundtrip_test!(
        plan_status_roundtrip,
        PlanStatus,
        [
            PlanStatus::Draft,
            PlanStatus::Validated,
            PlanStatus::AwaitingApproval,
            PlanStatus::Approved,
            PlanStatus::Rejected,
            PlanStatus::Superseded,
        ]
    );

    roundtrip_test!(
        plan_type_roundtrip,
        PlanType,
        [PlanType::DriftPlan, PlanType::PatchPlan, PlanType::DrRunbook]
    );

    roundtrip_test!(
        run_status_roundtrip,
        RunStatus,
        [
            RunStatus::Queued,
            RunStatus::Executing,
            RunStatus::Paused,
            RunStatus::Completed,
            RunStatus::RolledBack,
            RunStatus::Failed,
        ]
    );

    roundtrip_test!(
        tool_risk_roundtrip,
        ToolRisk,
        [
            ToolRisk::Read,
            ToolRisk::MutateReversible,
            ToolRisk::MutateIrreversible,
        ]
    );

    roundtrip_test!(
        usage_status_roundtrip,
        UsageStatus,
        [UsageStatus::Ok, UsageStatus::Error, UsageStatus::RateLimited]
    );

    roundtrip_test!(
        actor_kind_roundtrip,
        ActorKind,
        [ActorKind::User, ActorKind::Agent, ActorKind::System]
    );

    roundtrip_test!(
        approval_decision_roundtrip,
        ApprovalDecision,
        [ApprovalDecision::Approved, ApprovalDecision::Rejected]
    );

    #[test]
    fn audit_event_kind_roundtrip() {
        let variants = [
            AuditEventKind::TaskCreated,
            AuditEventKind::TaskParsed,
            AuditEventKind::PlanGenerated,
            AuditEventKind::PlanValidated,
            AuditEventKind::PlanRejected,
            AuditEventKind::ApprovalGranted,
            AuditEventKind::ApprovalDenied,
            AuditEventKind::RunPhaseStarted,
            AuditEventKind::RunPhaseHealthy,
            AuditEventKind::RunPhaseFailed,
            AuditEventKind::RunRolledBack,
            AuditEventKind::RunCompleted,
            AuditEventKind::ToolInvoked,
        ];
        for v in variants {
            let s = v.to_string();
            let parsed: AuditEventKind = s.parse().unwrap();
            assert_eq!(parsed, v);
        }
    }

    #[test]
    fn invalid_task_status_is_rejected() {
        let result = "bogus".parse::<TaskStatus>();
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().0, "bogus");
    }

    #[test]
    fn invalid_plan_status_is_rejected() {
        assert!("bogus".parse::<PlanStatus>().is_err());
    }

    #[test]
    fn invalid_run_status_is_rejected() {
        assert!("bogus".parse::<RunStatus>().is_err());
    }

    #[test]
    fn invalid_tool_risk_is_rejected() {
        assert!("bogus".parse::<ToolRisk>().is_err());
    }

    #[test]
    fn fallback_pricing_matches_conservative_default() {
        let p = ModelPricing::fallback("unknown-provider", "unknown-model");
        assert_eq!(p.input_cents_per_mtok, 300);
        assert_eq!(p.output_cents_per_mtok, 1500);
    }

    #[test]
    fn usage_record_total_cost_sums_all_components() {
        let record = UsageRecord {
            id: Uuid::nil(),
            tenant_id: "t1".into(),
            task_id: None,
            agent_name: "drift-remediator".into(),
            request_id: "r1".into(),
            provider: "anthropic".into(),
            model: "claude".into(),
            input_tokens: 100,
            output_tokens: 50,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            cost_input_cents: 3,
            cost_output_cents: 7,
            cost_cache_creation_cents: 1,
            cost_cache_read_cents: 0,
            operation_type: "plan_generation".into(),
            latency_ms: 120,
            status: UsageStatus::Ok,
            prompt_hash: None,
            created_at: Utc::now(),
        };
        assert_eq!(record.total_cost_cents(), 11);
    }
}
