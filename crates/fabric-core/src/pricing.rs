//! Pricing & Usage Ledger (C1).
//!
//! A process-wide pricing table, refreshed in the background, and the
//! `RecordUsage`/`CheckQuota` operations every LLM call goes through.
//! Modeled after the teacher's general "process-wide `Arc` state plus a
//! `tokio::time::interval` background task" idiom (`orchestrator/mod.rs`'s
//! use of timers and shared state) -- the teacher has no pricing table of
//! its own to imitate directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;

use fabric_db::models::{ModelPricing, UsageStatus};
use fabric_db::queries::{quotas, usage};

/// `(provider, model) -> ModelPricing`, refreshed from `llm_pricing` every
/// `refresh_interval`. An unknown key falls back to a conservative default
/// rather than failing the call.
#[derive(Clone)]
pub struct PricingTable {
    inner: Arc<RwLock<HashMap<(String, String), ModelPricing>>>,
}

impl PricingTable {
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn refresh(&self, pool: &PgPool) -> Result<()> {
        let rows = usage::list_pricing(pool).await?;
        let mut map = HashMap::with_capacity(rows.len());
        for row in rows {
            map.insert((row.provider.clone(), row.model.clone()), row);
        }
        *self.inner.write().await = map;
        Ok(())
    }

    pub async fn get(&self, provider: &str, model: &str) -> ModelPricing {
        let guard = self.inner.read().await;
        match guard.get(&(provider.to_string(), model.to_string())) {
            Some(p) => p.clone(),
            None => {
                tracing::warn!(provider, model, "no pricing entry, using conservative default");
                ModelPricing::fallback(provider, model)
            }
        }
    }

    /// Spawn the background refresh loop. The returned handle is detached;
    /// callers that want graceful shutdown should `.abort()` it.
    pub fn spawn_refresh_loop(self, pool: PgPool, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh(&pool).await {
                    tracing::warn!(error = %e, "pricing table refresh failed, keeping stale data");
                }
            }
        })
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::empty()
    }
}

/// `cost = (tokens * price_per_mtok_cents) / 1_000_000`, integer
/// arithmetic, truncating. Pricing changes never rewrite history -- this
/// is computed once, at record time, from whatever `ModelPricing` is
/// current then.
pub fn compute_cost_cents(tokens: i64, price_per_mtok_cents: i64) -> i64 {
    (tokens * price_per_mtok_cents) / 1_000_000
}

/// One call's accounting input, before costs are computed.
pub struct UsageInput {
    pub tenant_id: String,
    pub task_id: Option<uuid::Uuid>,
    pub agent_name: String,
    pub request_id: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cache_read_tokens: i64,
    pub operation_type: String,
    pub latency_ms: i64,
    pub status: UsageStatus,
    pub prompt_hash: Option<String>,
}

/// `RecordUsage`: compute costs from the pricing table and persist one
/// row. Storage failure is logged and surfaced -- the ledger must not
/// silently drop usage (SPEC_FULL §4.1).
pub async fn record_usage(pool: &PgPool, pricing: &PricingTable, input: UsageInput) -> Result<()> {
    let price = pricing.get(&input.provider, &input.model).await;

    let record = usage::NewUsageRecord {
        tenant_id: input.tenant_id,
        task_id: input.task_id,
        agent_name: input.agent_name,
        request_id: input.request_id,
        provider: input.provider,
        model: input.model,
        input_tokens: input.input_tokens,
        output_tokens: input.output_tokens,
        cache_creation_tokens: input.cache_creation_tokens,
        cache_read_tokens: input.cache_read_tokens,
        cost_input_cents: compute_cost_cents(input.input_tokens, price.input_cents_per_mtok),
        cost_output_cents: compute_cost_cents(input.output_tokens, price.output_cents_per_mtok),
        cost_cache_creation_cents: compute_cost_cents(
            input.cache_creation_tokens,
            price.cache_creation_cents_per_mtok,
        ),
        cost_cache_read_cents: compute_cost_cents(
            input.cache_read_tokens,
            price.cache_read_cents_per_mtok,
        ),
        operation_type: input.operation_type,
        latency_ms: input.latency_ms,
        status: input.status,
        prompt_hash: input.prompt_hash,
    };

    usage::insert_usage_record(pool, record).await.map_err(|e| {
        tracing::error!(error = %e, "failed to persist usage record");
        e
    })?;

    Ok(())
}

/// Non-blocking variant: spawns a bounded background task with a 5-second
/// deadline rather than making the caller wait on the insert. Used once
/// the LLM response has already been handed back to the caller.
pub fn record_usage_background(pool: PgPool, pricing: PricingTable, input: UsageInput) {
    tokio::spawn(async move {
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            record_usage(&pool, &pricing, input),
        )
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "background usage recording failed"),
            Err(_) => tracing::error!("background usage recording timed out after 5s"),
        }
    });
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuotaCheck {
    /// `usage_percent` is the highest utilization ratio observed across
    /// whichever monthly/rate limits were checked, for alerting at
    /// `alert_threshold_percent` before a tenant actually hits a cap.
    Allowed { usage_percent: f64 },
    Denied { reason: String, usage_percent: f64 },
}

/// `CheckQuota`: evaluates monthly cost, monthly tokens, request rate,
/// and token rate; returns the first-violated limit as `reason`. Fails
/// closed -- any error while checking (including "no quota row") is
/// treated as denied, since runaway spend is worse than a false
/// rejection.
///
/// Token-rate enforcement reads tokens already recorded in the current
/// fixed window rather than pre-admitting an unknown-sized call: unlike
/// a request, a call's token count isn't known until the provider has
/// already answered.
pub async fn check_quota(pool: &PgPool, tenant_id: &str, now: DateTime<Utc>) -> QuotaCheck {
    let quota = match quotas::get_quota(pool, tenant_id).await {
        Ok(Some(q)) => q,
        Ok(None) => {
            return QuotaCheck::Denied {
                reason: format!("tenant {tenant_id} has no quota configured"),
                usage_percent: 1.0,
            };
        }
        Err(e) => {
            tracing::error!(tenant_id, error = %e, "quota lookup failed, failing closed");
            return QuotaCheck::Denied {
                reason: "quota lookup failed".to_string(),
                usage_percent: 1.0,
            };
        }
    };

    let month_start = match Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0) {
        chrono::LocalResult::Single(t) => t,
        _ => now,
    };

    let mut usage_percent: f64 = 0.0;

    match quotas::remaining_monthly_budget_cents(pool, tenant_id, month_start).await {
        Ok(remaining) => {
            if quota.monthly_cost_cap_cents > 0 {
                let spent = quota.monthly_cost_cap_cents - remaining;
                usage_percent =
                    usage_percent.max(spent as f64 / quota.monthly_cost_cap_cents as f64);
            }
            if remaining < 0 {
                return QuotaCheck::Denied {
                    reason: format!("monthly cost cap {}c exceeded", quota.monthly_cost_cap_cents),
                    usage_percent: 1.0,
                };
            }
        }
        Err(e) => {
            tracing::error!(tenant_id, error = %e, "budget lookup failed, failing closed");
            return QuotaCheck::Denied {
                reason: "budget lookup failed".to_string(),
                usage_percent: 1.0,
            };
        }
    }

    match quotas::remaining_monthly_token_budget(pool, tenant_id, month_start).await {
        Ok(remaining) => {
            if quota.monthly_token_limit > 0 {
                let spent = quota.monthly_token_limit - remaining;
                usage_percent =
                    usage_percent.max(spent as f64 / quota.monthly_token_limit as f64);
            }
            if remaining < 0 {
                return QuotaCheck::Denied {
                    reason: format!(
                        "monthly token limit {} exceeded",
                        quota.monthly_token_limit
                    ),
                    usage_percent: 1.0,
                };
            }
        }
        Err(e) => {
            tracing::error!(tenant_id, error = %e, "token budget lookup failed, failing closed");
            return QuotaCheck::Denied {
                reason: "token budget lookup failed".to_string(),
                usage_percent: 1.0,
            };
        }
    }

    match quotas::tokens_in_window(pool, tenant_id, quota.window_started_at).await {
        Ok(spent) if quota.tokens_per_minute > 0 && spent >= quota.tokens_per_minute as i64 => {
            return QuotaCheck::Denied {
                reason: format!(
                    "rate limit exceeded: {} tokens/minute",
                    quota.tokens_per_minute
                ),
                usage_percent: 1.0,
            };
        }
        Ok(spent) => {
            if quota.tokens_per_minute > 0 {
                usage_percent = usage_percent.max(spent as f64 / quota.tokens_per_minute as f64);
            }
        }
        Err(e) => {
            tracing::error!(tenant_id, error = %e, "token rate window check failed, failing closed");
            return QuotaCheck::Denied {
                reason: "token rate window check failed".to_string(),
                usage_percent: 1.0,
            };
        }
    }

    match quotas::try_admit_request(pool, tenant_id, now).await {
        Ok(true) => {
            if usage_percent * 100.0 >= quota.alert_threshold_percent as f64 {
                tracing::warn!(
                    tenant_id,
                    usage_percent,
                    alert_threshold_percent = quota.alert_threshold_percent,
                    "tenant approaching quota limit"
                );
            }
            QuotaCheck::Allowed { usage_percent }
        }
        Ok(false) => QuotaCheck::Denied {
            reason: format!(
                "rate limit exceeded: {} requests/minute",
                quota.requests_per_minute
            ),
            usage_percent: 1.0,
        },
        Err(e) => {
            tracing::error!(tenant_id, error = %e, "rate window check failed, failing closed");
            QuotaCheck::Denied {
                reason: "rate window check failed".to_string(),
                usage_percent: 1.0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_cost_cents_truncates() {
        // 999 tokens at 300c/MTok: 999 * 300 / 1_000_000 = 0 (truncated).
        assert_eq!(compute_cost_cents(999, 300), 0);
        // 1_000_000 tokens at 300c/MTok: exactly 300c.
        assert_eq!(compute_cost_cents(1_000_000, 300), 300);
        // 3_333_333 tokens at 1500c/MTok.
        assert_eq!(compute_cost_cents(3_333_333, 1500), 4_999);
    }

    #[test]
    fn pricing_table_starts_empty() {
        let table = PricingTable::empty();
        assert!(table.inner.try_read().unwrap().is_empty());
    }
}
