//! Database query functions for `llm_usage` records and the `llm_pricing`
//! table that prices them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ModelPricing, UsageRecord, UsageStatus};

/// One completed (or failed) LLM call, ready to insert. Cost fields are
/// computed by the caller from [`ModelPricing`] before the call reaches
/// this layer -- this crate never recomputes cost from token counts.
#[derive(Debug, Clone)]
pub struct NewUsageRecord {
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
}

pub async fn insert_usage_record(pool: &PgPool, record: NewUsageRecord) -> Result<UsageRecord> {
    let row = sqlx::query_as::<_, UsageRecord>(
        "INSERT INTO llm_usage \
            (tenant_id, task_id, agent_name, request_id, provider, model, \
             input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens, \
             cost_input_cents, cost_output_cents, cost_cache_creation_cents, cost_cache_read_cents, \
             operation_type, latency_ms, status, prompt_hash) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
         RETURNING *",
    )
    .bind(record.tenant_id)
    .bind(record.task_id)
    .bind(record.agent_name)
    .bind(record.request_id)
    .bind(record.provider)
    .bind(record.model)
    .bind(record.input_tokens)
    .bind(record.output_tokens)
    .bind(record.cache_creation_tokens)
    .bind(record.cache_read_tokens)
    .bind(record.cost_input_cents)
    .bind(record.cost_output_cents)
    .bind(record.cost_cache_creation_cents)
    .bind(record.cost_cache_read_cents)
    .bind(record.operation_type)
    .bind(record.latency_ms)
    .bind(record.status)
    .bind(record.prompt_hash)
    .fetch_one(pool)
    .await
    .context("failed to insert usage record")?;

    Ok(row)
}

/// Sum of cost for a tenant within `[since, until)`, in cents. Drives
/// `GetMonthlyUsage` and `GetCostReport`.
pub async fn total_cost_cents_for_tenant(
    pool: &PgPool,
    tenant_id: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<i64> {
    let (total,): (Option<i64>,) = sqlx::query_as(
        "SELECT SUM(cost_input_cents + cost_output_cents + cost_cache_creation_cents + cost_cache_read_cents) \
         FROM llm_usage \
         WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3 AND status = 'ok'",
    )
    .bind(tenant_id)
    .bind(since)
    .bind(until)
    .fetch_one(pool)
    .await
    .context("failed to sum usage cost for tenant")?;

    Ok(total.unwrap_or(0))
}

/// All usage records for a single task -- `GetUsageByTask`.
pub async fn usage_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<UsageRecord>> {
    let records = sqlx::query_as::<_, UsageRecord>(
        "SELECT * FROM llm_usage WHERE task_id = $1 ORDER BY created_at ASC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .context("failed to fetch usage for task")?;

    Ok(records)
}

/// Per-model cost breakdown for a tenant within a window -- the detail
/// rows behind `GetCostReport`.
pub async fn cost_breakdown_by_model(
    pool: &PgPool,
    tenant_id: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, Option<i64>)> = sqlx::query_as(
        "SELECT model, SUM(cost_input_cents + cost_output_cents + cost_cache_creation_cents + cost_cache_read_cents) \
         FROM llm_usage \
         WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3 AND status = 'ok' \
         GROUP BY model ORDER BY model",
    )
    .bind(tenant_id)
    .bind(since)
    .bind(until)
    .fetch_all(pool)
    .await
    .context("failed to compute cost breakdown by model")?;

    Ok(rows
        .into_iter()
        .map(|(model, cost)| (model, cost.unwrap_or(0)))
        .collect())
}

pub async fn get_pricing(pool: &PgPool, provider: &str, model: &str) -> Result<Option<ModelPricing>> {
    let pricing = sqlx::query_as::<_, ModelPricing>(
        "SELECT * FROM llm_pricing WHERE provider = $1 AND model = $2",
    )
    .bind(provider)
    .bind(model)
    .fetch_optional(pool)
    .await
    .context("failed to fetch model pricing")?;

    Ok(pricing)
}

pub async fn list_pricing(pool: &PgPool) -> Result<Vec<ModelPricing>> {
    let pricing = sqlx::query_as::<_, ModelPricing>(
        "SELECT * FROM llm_pricing ORDER BY provider, model",
    )
    .fetch_all(pool)
    .await
    .context("failed to list model pricing")?;

    Ok(pricing)
}

/// Upsert a model's price point, used when refreshing the in-memory
/// pricing table from an operator-maintained source.
pub async fn upsert_pricing(pool: &PgPool, pricing: &ModelPricing) -> Result<ModelPricing> {
    let row = sqlx::query_as::<_, ModelPricing>(
        "INSERT INTO llm_pricing \
            (provider, model, input_cents_per_mtok, output_cents_per_mtok, \
             cache_creation_cents_per_mtok, cache_read_cents_per_mtok) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (provider, model) DO UPDATE SET \
             input_cents_per_mtok = EXCLUDED.input_cents_per_mtok, \
             output_cents_per_mtok = EXCLUDED.output_cents_per_mtok, \
             cache_creation_cents_per_mtok = EXCLUDED.cache_creation_cents_per_mtok, \
             cache_read_cents_per_mtok = EXCLUDED.cache_read_cents_per_mtok, \
             updated_at = now() \
         RETURNING *",
    )
    .bind(&pricing.provider)
    .bind(&pricing.model)
    .bind(pricing.input_cents_per_mtok)
    .bind(pricing.output_cents_per_mtok)
    .bind(pricing.cache_creation_cents_per_mtok)
    .bind(pricing.cache_read_cents_per_mtok)
    .fetch_one(pool)
    .await
    .context("failed to upsert model pricing")?;

    Ok(row)
}
