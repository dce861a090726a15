//! A scripted `LLMProvider` backed by a JSON fixture, used by `fabric task
//! run` so the Agent Runtime can be demoed and exercised manually without a
//! real model backend wired up -- the same role `assets::FileAssetQuery`
//! plays for the Drift Scheduler.
//!
//! Fixture shape: `{"responses": [{"stop_payload": null, "tool_calls":
//! [{"tool": "...", "args": {...}}]}, {"stop_payload": {...}}]}`. Each
//! call to `call()` returns the next scripted response; once the script
//! is exhausted, the final response repeats for every subsequent call, so
//! a one-entry fixture that just stops immediately is enough for the
//! common case.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;

use fabric_core::collaborators::{LlmRequest, LlmResponse, LlmUsage, ToolCall, LLMProvider};
use fabric_core::error::CoreError;

#[derive(Debug, Deserialize)]
struct ScriptedResponse {
    #[serde(default)]
    stop_payload: Option<serde_json::Value>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
    #[serde(default)]
    usage: ScriptedUsage,
}

#[derive(Debug, Default, Deserialize)]
struct ScriptedUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
    #[serde(default)]
    cache_creation_tokens: i64,
    #[serde(default)]
    cache_read_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct LlmFixture {
    #[serde(default)]
    responses: Vec<ScriptedResponse>,
}

/// A fixed script of responses played back in order. A fixture with no
/// responses at all always stops immediately with an empty plan payload
/// rather than erroring, matching `FileAssetQuery`'s "missing fixture is
/// an empty fleet" posture.
pub struct FileLlmProvider {
    name: String,
    responses: Vec<ScriptedResponse>,
    cursor: AtomicUsize,
}

impl FileLlmProvider {
    pub fn new(fixture_path: &str) -> Self {
        let fixture: LlmFixture = std::fs::read_to_string(fixture_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(LlmFixture { responses: vec![] });

        Self {
            name: "fixture".to_string(),
            responses: fixture.responses,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LLMProvider for FileLlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, _request: &LlmRequest) -> Result<LlmResponse, CoreError> {
        if self.responses.is_empty() {
            return Ok(LlmResponse {
                stop_payload: Some(serde_json::json!({"phases": []})),
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
        let response = &self.responses[index];

        Ok(LlmResponse {
            stop_payload: response.stop_payload.clone(),
            tool_calls: response.tool_calls.clone(),
            usage: LlmUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
                cache_creation_tokens: response.usage.cache_creation_tokens,
                cache_read_tokens: response.usage.cache_read_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_core::collaborators::ChatMessage;

    fn request() -> LlmRequest {
        LlmRequest {
            model: "fixture-model".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn missing_fixture_stops_immediately() {
        let provider = FileLlmProvider::new("/nonexistent/fixture.json");
        let response = provider.call(&request()).await.unwrap();
        assert!(response.stop_payload.is_some());
        assert!(response.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn plays_back_script_in_order_then_repeats_last() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"{"responses": [
                {"tool_calls": [{"tool": "query_assets", "args": {"selector": "all"}}]},
                {"stop_payload": {"phases": [], "done": true}}
            ]}"#,
        )
        .unwrap();
        let provider = FileLlmProvider::new(tmp.path().to_str().unwrap());

        let first = provider.call(&request()).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        assert!(first.stop_payload.is_none());

        let second = provider.call(&request()).await.unwrap();
        assert_eq!(second.stop_payload, Some(serde_json::json!({"phases": [], "done": true})));

        let third = provider.call(&request()).await.unwrap();
        assert_eq!(third.stop_payload, second.stop_payload);
    }
}
