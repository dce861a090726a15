//! LLM Gateway (C2).
//!
//! Wraps every model call in a quota check, a bounded retry policy, and
//! usage accounting. The provider itself is an external collaborator
//! (`LLMProvider`, `collaborators.rs`) -- this module ships no concrete
//! backend.

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use fabric_db::models::UsageStatus;

use crate::collaborators::{ChatMessage, LLMProvider, LlmRequest, LlmResponse, ToolSpec};
use crate::error::CoreError;
use crate::pricing::{self, PricingTable, QuotaCheck, UsageInput};

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub tenant_id: String,
    pub task_id: Option<Uuid>,
    pub agent_name: String,
    pub provider: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub operation_type: String,
}

/// SHA-256 hash of the system prompt (the first message with
/// `role == "system"`, or the whole message list if none), used for
/// cache-analytics dedup. One-way, not a verifiable token -- unlike the
/// teacher's HMAC-based `token::generate_token`, no secret is needed here
/// because the hash is never validated, only compared.
pub fn hash_system_prompt(messages: &[ChatMessage]) -> String {
    let text = messages
        .iter()
        .find(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// `Invoke(ctx, request) -> response`: checks quota, retries transient
/// provider errors with exponential backoff and jitter, records usage
/// (scheduled before the response is returned, per the ordering
/// guarantee in SPEC_FULL §4.2), and returns the provider's response.
pub async fn invoke(
    pool: &PgPool,
    pricing: &PricingTable,
    provider: &dyn LLMProvider,
    request: InvokeRequest,
) -> Result<LlmResponse, CoreError> {
    let now = Utc::now();
    match pricing::check_quota(pool, &request.tenant_id, now).await {
        QuotaCheck::Allowed { .. } => {}
        QuotaCheck::Denied { reason, .. } => {
            record_denied(pool, pricing, &request, UsageStatus::RateLimited).await;
            return Err(CoreError::QuotaExceeded {
                tenant_id: request.tenant_id.clone(),
                reason,
            });
        }
    }

    let llm_request = LlmRequest {
        model: request.model.clone(),
        messages: request.messages.clone(),
        tools: request.tools.clone(),
    };
    let prompt_hash = hash_system_prompt(&request.messages);

    let started = std::time::Instant::now();
    let mut attempt = 0u32;
    let outcome = loop {
        attempt += 1;
        match provider.call(&llm_request).await {
            Ok(response) => break Ok(response),
            Err(CoreError::ProviderTransient(msg)) if attempt < MAX_ATTEMPTS => {
                let backoff_ms = 100u64 * 2u64.pow(attempt - 1);
                let jitter_ms = rand::rng().random_range(0..50);
                tracing::warn!(
                    attempt,
                    provider = %request.provider,
                    error = %msg,
                    "transient provider error, retrying"
                );
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms + jitter_ms)).await;
            }
            Err(e) => break Err(e),
        }
    };
    let latency_ms = started.elapsed().as_millis() as i64;

    let request_id = Uuid::new_v4().to_string();
    match &outcome {
        Ok(response) => {
            pricing::record_usage_background(
                pool.clone(),
                pricing.clone(),
                UsageInput {
                    tenant_id: request.tenant_id,
                    task_id: request.task_id,
                    agent_name: request.agent_name,
                    request_id,
                    provider: request.provider,
                    model: request.model,
                    input_tokens: response.usage.input_tokens,
                    output_tokens: response.usage.output_tokens,
                    cache_creation_tokens: response.usage.cache_creation_tokens,
                    cache_read_tokens: response.usage.cache_read_tokens,
                    operation_type: request.operation_type,
                    latency_ms,
                    status: UsageStatus::Ok,
                    prompt_hash: Some(prompt_hash),
                },
            );
        }
        Err(_) => {
            pricing::record_usage_background(
                pool.clone(),
                pricing.clone(),
                UsageInput {
                    tenant_id: request.tenant_id,
                    task_id: request.task_id,
                    agent_name: request.agent_name,
                    request_id,
                    provider: request.provider,
                    model: request.model,
                    input_tokens: 0,
                    output_tokens: 0,
                    cache_creation_tokens: 0,
                    cache_read_tokens: 0,
                    operation_type: request.operation_type,
                    latency_ms,
                    status: UsageStatus::Error,
                    prompt_hash: Some(prompt_hash),
                },
            );
        }
    }

    outcome
}

async fn record_denied(
    pool: &PgPool,
    pricing: &PricingTable,
    request: &InvokeRequest,
    status: UsageStatus,
) {
    pricing::record_usage_background(
        pool.clone(),
        pricing.clone(),
        UsageInput {
            tenant_id: request.tenant_id.clone(),
            task_id: request.task_id,
            agent_name: request.agent_name.clone(),
            request_id: Uuid::new_v4().to_string(),
            provider: request.provider.clone(),
            model: request.model.clone(),
            input_tokens: 0,
            output_tokens: 0,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            operation_type: request.operation_type.clone(),
            latency_ms: 0,
            status,
            prompt_hash: None,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_system_prompt_prefers_system_role() {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: "be terse".to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            },
        ];
        let hash_a = hash_system_prompt(&messages);
        let hash_b = hash_system_prompt(&[messages[0].clone()]);
        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn hash_system_prompt_differs_on_content() {
        let a = vec![ChatMessage {
            role: "system".to_string(),
            content: "be terse".to_string(),
        }];
        let b = vec![ChatMessage {
            role: "system".to_string(),
            content: "be verbose".to_string(),
        }];
        assert_ne!(hash_system_prompt(&a), hash_system_prompt(&b));
    }
}
