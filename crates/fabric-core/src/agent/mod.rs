//! Agent Runtime (C4).
//!
//! Implemented as a bounded iterative state machine -- a `for step in
//! 0..MAX_STEPS` loop over an owned [`AgentLoopState`] value, never mutual
//! recursion, matching the flat control flow of the teacher's
//! `run_agent_lifecycle` (`lifecycle/mod.rs`).

use sqlx::PgPool;
use uuid::Uuid;

use fabric_db::models::{ActorKind, AuditEventKind};

use crate::audit;
use crate::collaborators::{ChatMessage, LLMProvider, ToolSpec};
use crate::error::CoreError;
use crate::gateway::{self, InvokeRequest};
use crate::pricing::PricingTable;
use crate::tools::ToolRegistry;

/// Default bound on reasoning-loop iterations (SPEC_FULL §4.4).
pub const MAX_STEPS: u32 = 16;

#[derive(Debug, Clone)]
pub struct AgentLoopState {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Plan(serde_json::Value),
    DidNotConverge,
}

/// Run one agent's reasoning loop for a task.
///
/// Tie-break: if a response carries both a stop payload and tool calls,
/// the tool calls are executed first -- stop only applies when the
/// *next* round returns no tool calls (SPEC_FULL §4.4). `QuotaExceeded`
/// aborts the loop immediately rather than being retried like a
/// transient provider error.
pub async fn run_agent_loop(
    pool: &PgPool,
    pricing: &PricingTable,
    provider: &dyn LLMProvider,
    tools: &ToolRegistry,
    task_id: Uuid,
    tenant_id: &str,
    agent_name: &str,
    model: &str,
    available_tools: Vec<ToolSpec>,
    mut state: AgentLoopState,
) -> Result<AgentOutcome, CoreError> {
    for step in 0..MAX_STEPS {
        tracing::debug!(task_id = %task_id, step, "agent loop iteration");

        let response = gateway::invoke(
            pool,
            pricing,
            provider,
            InvokeRequest {
                tenant_id: tenant_id.to_string(),
                task_id: Some(task_id),
                agent_name: agent_name.to_string(),
                provider: provider.name().to_string(),
                model: model.to_string(),
                messages: state.messages.clone(),
                tools: available_tools.clone(),
                operation_type: "agent_step".to_string(),
            },
        )
        .await?;

        if !response.tool_calls.is_empty() {
            for call in &response.tool_calls {
                let observation = match tools.invoke(&call.tool, call.args.clone()).await {
                    Ok(result) => result,
                    Err(e) => serde_json::json!({"error": e.to_string()}),
                };
                audit::record(
                    pool,
                    task_id,
                    AuditEventKind::ToolInvoked,
                    ActorKind::Agent,
                    agent_name,
                    serde_json::json!({
                        "tool": call.tool,
                        "input_hash": audit::hash_tool_payload(&call.args),
                        "output_hash": audit::hash_tool_payload(&observation),
                    }),
                )
                .await;
                state.messages.push(ChatMessage {
                    role: "tool".to_string(),
                    content: serde_json::json!({
                        "tool": call.tool,
                        "observation": observation,
                    })
                    .to_string(),
                });
            }
            continue;
        }

        if let Some(payload) = response.stop_payload {
            return Ok(AgentOutcome::Plan(payload));
        }

        // No tool calls and no stop payload: nothing to append, but the
        // loop still counts the step toward the bound so a model that
        // never converges cannot spin forever.
    }

    tracing::warn!(task_id = %task_id, steps = MAX_STEPS, "agent did not converge");
    Ok(AgentOutcome::DidNotConverge)
}
