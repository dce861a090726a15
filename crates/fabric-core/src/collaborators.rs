//! External collaborators (SPEC_FULL §6): the core depends on these only
//! through traits, never on a concrete backend. Each is modeled the way
//! the teacher models `Harness` -- object-safe, asserted so at compile
//! time, with a trivial fake available for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// LLMProvider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// `Some` when the model wants to stop the reasoning loop and emit a
    /// result rather than call a tool.
    pub stop_payload: Option<serde_json::Value>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: LlmUsage,
}

/// Any model backend. `fabric-core` ships no concrete implementation --
/// only this trait and the gateway logic that wraps it.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, request: &LlmRequest) -> Result<LlmResponse, CoreError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn LLMProvider) {}
};

// ---------------------------------------------------------------------------
// PolicyEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyInput {
    pub tenant_id: String,
    pub plan_payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub allow: bool,
    pub denials: Vec<String>,
}

/// A separate, OPA-style policy service. `Evaluate(input) -> (allow,
/// denials[])`.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn evaluate(&self, input: &PolicyInput) -> Result<PolicyVerdict, CoreError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn PolicyEngine) {}
};

// ---------------------------------------------------------------------------
// AssetQuery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetFilter {
    pub tenant_id: String,
    pub selector: String,
}

/// Provided by cloud connectors (AWS/Azure/GCP/K8s asset discovery), out
/// of scope here -- the core only ever sees this trait.
#[async_trait]
pub trait AssetQuery: Send + Sync {
    async fn list(&self, filter: &AssetFilter) -> Result<Vec<String>, CoreError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn AssetQuery) {}
};

// ---------------------------------------------------------------------------
// HealthProbe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub kind: String,
    pub error_rate_threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthResult {
    pub healthy: bool,
    pub observed_error_rate: f64,
}

/// Provided by monitoring. `Check(asset, check) -> ok|fail`.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, asset: &str, spec: &HealthCheckSpec) -> Result<HealthResult, CoreError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn HealthProbe) {}
};

#[cfg(test)]
pub mod fakes {
    use super::*;

    pub struct NoopLlmProvider;

    #[async_trait]
    impl LLMProvider for NoopLlmProvider {
        fn name(&self) -> &str {
            "noop"
        }

        async fn call(&self, _request: &LlmRequest) -> Result<LlmResponse, CoreError> {
            Ok(LlmResponse {
                stop_payload: Some(serde_json::json!({})),
                tool_calls: vec![],
                usage: LlmUsage {
                    input_tokens: 0,
                    output_tokens: 0,
                    cache_creation_tokens: 0,
                    cache_read_tokens: 0,
                },
            })
        }
    }

    pub struct NoopPolicyEngine;

    #[async_trait]
    impl PolicyEngine for NoopPolicyEngine {
        async fn evaluate(&self, _input: &PolicyInput) -> Result<PolicyVerdict, CoreError> {
            Ok(PolicyVerdict {
                allow: true,
                denials: vec![],
            })
        }
    }

    pub struct NoopHealthProbe;

    #[async_trait]
    impl HealthProbe for NoopHealthProbe {
        async fn check(
            &self,
            _asset: &str,
            _spec: &HealthCheckSpec,
        ) -> Result<HealthResult, CoreError> {
            Ok(HealthResult {
                healthy: true,
                observed_error_rate: 0.0,
            })
        }
    }

    #[test]
    fn providers_are_object_safe() {
        let _llm: Box<dyn LLMProvider> = Box::new(NoopLlmProvider);
        let _policy: Box<dyn PolicyEngine> = Box::new(NoopPolicyEngine);
        let _health: Box<dyn HealthProbe> = Box::new(NoopHealthProbe);
    }
}
