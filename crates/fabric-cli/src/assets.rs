//! Local stand-ins for the cloud-connector `AssetQuery`/`HealthProbe`
//! collaborators, used by `fabric drift tick` so the scheduler can be
//! demoed and exercised manually without a real AWS/Azure/GCP/K8s
//! discovery backend wired up.
//!
//! Reads a JSON fixture describing the tenant's asset fleet; an absent
//! or unreadable fixture is treated as an empty fleet rather than an
//! error, so `drift tick` is still safe to run against a tenant with no
//! fixture configured.

use async_trait::async_trait;
use serde::Deserialize;

use fabric_core::collaborators::{AssetFilter, AssetQuery, HealthCheckSpec, HealthProbe, HealthResult};
use fabric_core::error::CoreError;

#[derive(Debug, Deserialize)]
struct AssetFixture {
    #[serde(default)]
    assets: Vec<String>,
    #[serde(default)]
    drifted: Vec<String>,
    #[serde(default)]
    unhealthy: Vec<String>,
}

fn load_fixture(path: &str) -> AssetFixture {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(AssetFixture {
            assets: vec![],
            drifted: vec![],
            unhealthy: vec![],
        })
}

/// Asset inventory backed by a JSON fixture file: `{"assets": [...],
/// "drifted": [...], "unhealthy": [...]}`. `list("all")` returns every
/// asset, `list("drifted")` returns the `drifted` subset.
pub struct FileAssetQuery {
    fixture_path: String,
}

impl FileAssetQuery {
    pub fn new(fixture_path: impl Into<String>) -> Self {
        Self {
            fixture_path: fixture_path.into(),
        }
    }
}

#[async_trait]
impl AssetQuery for FileAssetQuery {
    async fn list(&self, filter: &AssetFilter) -> Result<Vec<String>, CoreError> {
        let fixture = load_fixture(&self.fixture_path);
        match filter.selector.as_str() {
            "drifted" => Ok(fixture.drifted),
            _ => Ok(fixture.assets),
        }
    }
}

/// Health probe backed by the same fixture: any asset listed under
/// `unhealthy` fails its check, everything else reports healthy with a
/// zero error rate.
pub struct FileHealthProbe {
    fixture_path: String,
}

impl FileHealthProbe {
    pub fn new(fixture_path: impl Into<String>) -> Self {
        Self {
            fixture_path: fixture_path.into(),
        }
    }
}

#[async_trait]
impl HealthProbe for FileHealthProbe {
    async fn check(&self, asset: &str, _spec: &HealthCheckSpec) -> Result<HealthResult, CoreError> {
        let fixture = load_fixture(&self.fixture_path);
        let healthy = !fixture.unhealthy.iter().any(|a| a == asset);
        Ok(HealthResult {
            healthy,
            observed_error_rate: if healthy { 0.0 } else { 1.0 },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_fixture_yields_empty_fleet() {
        let query = FileAssetQuery::new("/nonexistent/fixture.json");
        let assets = query
            .list(&AssetFilter {
                tenant_id: "acme".to_string(),
                selector: "all".to_string(),
            })
            .await
            .unwrap();
        assert!(assets.is_empty());
    }

    #[tokio::test]
    async fn fixture_drives_list_and_health() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"{"assets": ["web-1", "web-2"], "drifted": ["web-2"], "unhealthy": ["web-2"]}"#,
        )
        .unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let query = FileAssetQuery::new(path.clone());
        let all = query
            .list(&AssetFilter {
                tenant_id: "acme".to_string(),
                selector: "all".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(all, vec!["web-1", "web-2"]);

        let drifted = query
            .list(&AssetFilter {
                tenant_id: "acme".to_string(),
                selector: "drifted".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(drifted, vec!["web-2"]);

        let probe = FileHealthProbe::new(path);
        let spec = HealthCheckSpec {
            kind: "error_rate".to_string(),
            error_rate_threshold: Some(0.05),
        };
        assert!(probe.check("web-1", &spec).await.unwrap().healthy);
        assert!(!probe.check("web-2", &spec).await.unwrap().healthy);
    }
}
