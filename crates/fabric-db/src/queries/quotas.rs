//! Database query functions for `org_llm_quotas`: per-tenant spend caps,
//! token limits, and the fixed-window rate counter `CheckQuota` consults.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::OrgLlmQuota;

pub async fn get_quota(pool: &PgPool, tenant_id: &str) -> Result<Option<OrgLlmQuota>> {
    let quota = sqlx::query_as::<_, OrgLlmQuota>(
        "SELECT * FROM org_llm_quotas WHERE tenant_id = $1",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch org quota")?;

    Ok(quota)
}

/// Create or replace a tenant's quota limits. Does not touch the
/// fixed-window counter -- raising a cap mid-window takes effect
/// immediately, lowering one does not retroactively fail in-flight calls.
pub async fn set_quota(
    pool: &PgPool,
    tenant_id: &str,
    monthly_token_limit: i64,
    monthly_cost_cap_cents: i64,
    requests_per_minute: i32,
    tokens_per_minute: i32,
    alert_threshold_percent: i16,
) -> Result<OrgLlmQuota> {
    let quota = sqlx::query_as::<_, OrgLlmQuota>(
        "INSERT INTO org_llm_quotas \
            (tenant_id, monthly_token_limit, monthly_cost_cap_cents, requests_per_minute, \
             tokens_per_minute, alert_threshold_percent, window_started_at, window_request_count) \
         VALUES ($1, $2, $3, $4, $5, $6, now(), 0) \
         ON CONFLICT (tenant_id) DO UPDATE SET \
             monthly_token_limit = EXCLUDED.monthly_token_limit, \
             monthly_cost_cap_cents = EXCLUDED.monthly_cost_cap_cents, \
             requests_per_minute = EXCLUDED.requests_per_minute, \
             tokens_per_minute = EXCLUDED.tokens_per_minute, \
             alert_threshold_percent = EXCLUDED.alert_threshold_percent, \
             updated_at = now() \
         RETURNING *",
    )
    .bind(tenant_id)
    .bind(monthly_token_limit)
    .bind(monthly_cost_cap_cents)
    .bind(requests_per_minute)
    .bind(tokens_per_minute)
    .bind(alert_threshold_percent)
    .fetch_one(pool)
    .await
    .context("failed to set org quota")?;

    Ok(quota)
}

/// Atomically test-and-increment the fixed-window request counter.
/// Rolls the window forward and resets the count to 1 if `now` has moved
/// a minute or more past the window's start; otherwise increments in
/// place. Returns `true` if the call is admitted (the window's count,
/// after this call, is within `requests_per_minute`).
///
/// The window roll, the increment, and the cap comparison all happen
/// inside one `UPDATE ... RETURNING`, so two concurrent callers cannot
/// both observe "under cap" and both proceed.
pub async fn try_admit_request(
    pool: &PgPool,
    tenant_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let row: Option<(i32, i32)> = sqlx::query_as(
        "UPDATE org_llm_quotas \
         SET window_started_at = CASE \
                 WHEN now() - window_started_at >= interval '1 minute' THEN $2 \
                 ELSE window_started_at \
             END, \
             window_request_count = CASE \
                 WHEN now() - window_started_at >= interval '1 minute' THEN 1 \
                 ELSE window_request_count + 1 \
             END, \
             updated_at = now() \
         WHERE tenant_id = $1 \
         RETURNING window_request_count, requests_per_minute",
    )
    .bind(tenant_id)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("failed to increment quota window")?;

    match row {
        Some((count, cap)) => Ok(count <= cap),
        None => anyhow::bail!("tenant {tenant_id} has no quota configured"),
    }
}

/// Current month-to-date spend against the tenant's monthly cost cap,
/// used alongside a planned call's estimated cost to decide whether it
/// would push the tenant over budget before the call is made.
pub async fn remaining_monthly_budget_cents(
    pool: &PgPool,
    tenant_id: &str,
    month_start: DateTime<Utc>,
) -> Result<i64> {
    let quota = get_quota(pool, tenant_id)
        .await?
        .with_context(|| format!("tenant {tenant_id} has no quota configured"))?;

    let (spent,): (Option<i64>,) = sqlx::query_as(
        "SELECT SUM(cost_input_cents + cost_output_cents + cost_cache_creation_cents + cost_cache_read_cents) \
         FROM llm_usage \
         WHERE tenant_id = $1 AND created_at >= $2 AND status = 'ok'",
    )
    .bind(tenant_id)
    .bind(month_start)
    .fetch_one(pool)
    .await
    .context("failed to compute month-to-date spend")?;

    Ok(quota.monthly_cost_cap_cents - spent.unwrap_or(0))
}

/// Month-to-date token usage against the tenant's monthly token limit,
/// mirroring `remaining_monthly_budget_cents`'s cost-sum shape.
pub async fn remaining_monthly_token_budget(
    pool: &PgPool,
    tenant_id: &str,
    month_start: DateTime<Utc>,
) -> Result<i64> {
    let quota = get_quota(pool, tenant_id)
        .await?
        .with_context(|| format!("tenant {tenant_id} has no quota configured"))?;

    let (spent,): (Option<i64>,) = sqlx::query_as(
        "SELECT SUM(input_tokens + output_tokens + cache_creation_tokens + cache_read_tokens) \
         FROM llm_usage \
         WHERE tenant_id = $1 AND created_at >= $2 AND status = 'ok'",
    )
    .bind(tenant_id)
    .bind(month_start)
    .fetch_one(pool)
    .await
    .context("failed to compute month-to-date token usage")?;

    Ok(quota.monthly_token_limit - spent.unwrap_or(0))
}

/// Tokens consumed within the tenant's current fixed rate window. Read,
/// not incremented: unlike request counts, a call's token count isn't
/// known until the provider has already answered, so this checks tokens
/// already spent in the window `try_admit_request` is about to roll or
/// extend, rather than pre-admitting an unknown-sized call.
pub async fn tokens_in_window(
    pool: &PgPool,
    tenant_id: &str,
    window_started_at: DateTime<Utc>,
) -> Result<i64> {
    let (spent,): (Option<i64>,) = sqlx::query_as(
        "SELECT SUM(input_tokens + output_tokens + cache_creation_tokens + cache_read_tokens) \
         FROM llm_usage \
         WHERE tenant_id = $1 AND created_at >= $2 AND status = 'ok'",
    )
    .bind(tenant_id)
    .bind(window_started_at)
    .fetch_one(pool)
    .await
    .context("failed to compute in-window token usage")?;

    Ok(spent.unwrap_or(0))
}
