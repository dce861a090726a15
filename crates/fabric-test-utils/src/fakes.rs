//! In-memory fakes for the Agent Runtime / Plan Validator / Workflow Engine
//! Adapter collaborators, grounded on `fabric-cli`'s fixture-backed
//! `FileLlmProvider`/`FilePolicyEngine`/`FileAssetQuery`/`FileHealthProbe`
//! but built from values passed in directly rather than read from a JSON
//! file on disk, since integration tests construct their scenarios in
//! code. [`create_test_db`] supplies the database side of the same tests;
//! these supply everything else `fabric_core::orchestrator::run_task_to_completion`
//! needs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use fabric_core::collaborators::{
    AssetFilter, AssetQuery, HealthCheckSpec, HealthProbe, HealthResult, LLMProvider, LlmRequest,
    LlmResponse, LlmUsage, PolicyEngine, PolicyInput, PolicyVerdict,
};
use fabric_core::error::CoreError;

/// Plays back a fixed script of responses in order, repeating the last
/// entry once exhausted. A one-entry script that stops immediately
/// covers most scenarios; [`ScriptedLlmProvider::stopping_with`] builds
/// that common case directly.
pub struct ScriptedLlmProvider {
    responses: Vec<LlmResponse>,
    cursor: AtomicUsize,
}

impl ScriptedLlmProvider {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses,
            cursor: AtomicUsize::new(0),
        }
    }

    /// A single-response script that stops immediately with `payload` as
    /// the plan, spending no tokens -- the shape most orchestration tests
    /// that don't care about the agent loop itself want.
    pub fn stopping_with(payload: serde_json::Value) -> Self {
        Self::new(vec![LlmResponse {
            stop_payload: Some(payload),
            tool_calls: vec![],
            usage: LlmUsage {
                input_tokens: 0,
                output_tokens: 0,
                cache_creation_tokens: 0,
                cache_read_tokens: 0,
            },
        }])
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlmProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, _request: &LlmRequest) -> Result<LlmResponse, CoreError> {
        if self.responses.is_empty() {
            return Ok(LlmResponse {
                stop_payload: Some(serde_json::json!({})),
                tool_calls: vec![],
                usage: LlmUsage {
                    input_tokens: 0,
                    output_tokens: 0,
                    cache_creation_tokens: 0,
                    cache_read_tokens: 0,
                },
            });
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        let index = index.min(self.responses.len() - 1);
        Ok(self.responses[index].clone())
    }
}

/// Returns a fixed verdict for every plan. Build with [`Self::allow`] or
/// [`Self::deny`] rather than poking at the fields, since a real policy
/// engine's answer doesn't depend on which plan it was asked about here.
pub struct FixedPolicyEngine {
    verdict: PolicyVerdict,
}

impl FixedPolicyEngine {
    pub fn allow() -> Self {
        Self {
            verdict: PolicyVerdict {
                allow: true,
                denials: vec![],
            },
        }
    }

    pub fn deny(denials: Vec<String>) -> Self {
        Self {
            verdict: PolicyVerdict {
                allow: false,
                denials,
            },
        }
    }
}

#[async_trait]
impl PolicyEngine for FixedPolicyEngine {
    async fn evaluate(&self, _input: &PolicyInput) -> Result<PolicyVerdict, CoreError> {
        Ok(self.verdict.clone())
    }
}

/// Asset inventory keyed by selector string, e.g. `{"canary": [...],
/// "all": [...]}` -- mirrors a plan's per-phase `asset_selector` field.
/// An unlisted selector returns an empty fleet rather than erroring.
pub struct FixedAssetQuery {
    by_selector: HashMap<String, Vec<String>>,
}

impl FixedAssetQuery {
    pub fn new(by_selector: HashMap<String, Vec<String>>) -> Self {
        Self { by_selector }
    }

    /// A single selector mapping to the same asset list regardless of
    /// which selector a phase asks for.
    pub fn uniform(assets: Vec<String>) -> Self {
        let mut by_selector = HashMap::new();
        by_selector.insert("all".to_string(), assets.clone());
        by_selector.insert("canary".to_string(), assets);
        Self { by_selector }
    }
}

#[async_trait]
impl AssetQuery for FixedAssetQuery {
    async fn list(&self, filter: &AssetFilter) -> Result<Vec<String>, CoreError> {
        Ok(self.by_selector.get(&filter.selector).cloned().unwrap_or_default())
    }
}

/// Health results keyed by asset name. An asset with no configured result
/// reports healthy with a zero error rate, so a test only needs to name
/// the assets it wants to fail.
pub struct ConfigurableHealthProbe {
    by_asset: Mutex<HashMap<String, HealthResult>>,
}

impl ConfigurableHealthProbe {
    pub fn new() -> Self {
        Self {
            by_asset: Mutex::new(HashMap::new()),
        }
    }

    pub fn all_healthy() -> Self {
        Self::new()
    }

    /// Mark `asset` unhealthy with `observed_error_rate`, for a test that
    /// wants one phase's rollout to trip the health gate.
    pub fn fail(&self, asset: &str, observed_error_rate: f64) {
        self.by_asset.lock().unwrap().insert(
            asset.to_string(),
            HealthResult {
                healthy: false,
                observed_error_rate,
            },
        );
    }
}

impl Default for ConfigurableHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for ConfigurableHealthProbe {
    async fn check(&self, asset: &str, _spec: &HealthCheckSpec) -> Result<HealthResult, CoreError> {
        Ok(self
            .by_asset
            .lock()
            .unwrap()
            .get(asset)
            .copied()
            .unwrap_or(HealthResult {
                healthy: true,
                observed_error_rate: 0.0,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::collaborators::ChatMessage;

    fn request() -> LlmRequest {
        LlmRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn scripted_provider_repeats_last_response() {
        let provider = ScriptedLlmProvider::stopping_with(serde_json::json!({"phases": []}));
        let first = provider.call(&request()).await.unwrap();
        let second = provider.call(&request()).await.unwrap();
        assert_eq!(first.stop_payload, second.stop_payload);
    }

    #[tokio::test]
    async fn configurable_health_probe_defaults_healthy() {
        let probe = ConfigurableHealthProbe::new();
        let result = probe
            .check(
                "asset-1",
                &HealthCheckSpec {
                    kind: "error_rate".to_string(),
                    error_rate_threshold: None,
                },
            )
            .await
            .unwrap();
        assert!(result.healthy);
    }

    #[tokio::test]
    async fn configurable_health_probe_reports_failed_assets() {
        let probe = ConfigurableHealthProbe::new();
        probe.fail("asset-1", 0.5);
        let result = probe
            .check(
                "asset-1",
                &HealthCheckSpec {
                    kind: "error_rate".to_string(),
                    error_rate_threshold: None,
                },
            )
            .await
            .unwrap();
        assert!(!result.healthy);
        assert_eq!(result.observed_error_rate, 0.5);
    }
}
