//! A fixture-backed `PolicyEngine`, standing in for the real OPA-style
//! policy service so `fabric task run` can validate a plan without one
//! wired up. Reads fresh on every call, the same posture as
//! `assets::FileAssetQuery` -- a missing fixture allows everything,
//! rather than failing a task that has no policy fixture configured.

use async_trait::async_trait;
use serde::Deserialize;

use fabric_core::collaborators::{PolicyEngine, PolicyInput, PolicyVerdict};
use fabric_core::error::CoreError;

#[derive(Debug, Deserialize)]
struct PolicyFixture {
    #[serde(default = "default_allow")]
    allow: bool,
    #[serde(default)]
    denials: Vec<String>,
}

fn default_allow() -> bool {
    true
}

fn load_fixture(path: &str) -> PolicyFixture {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(PolicyFixture {
            allow: true,
            denials: vec![],
        })
}

/// Policy verdict backed by a JSON fixture: `{"allow": bool, "denials":
/// [...]}`. The same verdict is returned for every plan -- this stands in
/// for a real policy engine's per-plan evaluation, not a rules language.
pub struct FilePolicyEngine {
    fixture_path: String,
}

impl FilePolicyEngine {
    pub fn new(fixture_path: impl Into<String>) -> Self {
        Self {
            fixture_path: fixture_path.into(),
        }
    }
}

#[async_trait]
impl PolicyEngine for FilePolicyEngine {
    async fn evaluate(&self, _input: &PolicyInput) -> Result<PolicyVerdict, CoreError> {
        let fixture = load_fixture(&self.fixture_path);
        Ok(PolicyVerdict {
            allow: fixture.allow,
            denials: fixture.denials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_fixture_allows_by_default() {
        let engine = FilePolicyEngine::new("/nonexistent/fixture.json");
        let verdict = engine
            .evaluate(&PolicyInput {
                tenant_id: "acme".to_string(),
                plan_payload: serde_json::json!({}),
            })
            .await
            .unwrap();
        assert!(verdict.allow);
        assert!(verdict.denials.is_empty());
    }

    #[tokio::test]
    async fn fixture_can_deny() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), r#"{"allow": false, "denials": ["no prod writes"]}"#).unwrap();
        let engine = FilePolicyEngine::new(tmp.path().to_str().unwrap().to_string());
        let verdict = engine
            .evaluate(&PolicyInput {
                tenant_id: "acme".to_string(),
                plan_payload: serde_json::json!({}),
            })
            .await
            .unwrap();
        assert!(!verdict.allow);
        assert_eq!(verdict.denials, vec!["no prod writes".to_string()]);
    }
}
