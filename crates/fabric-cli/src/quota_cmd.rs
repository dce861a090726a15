//! `fabric quota set`: create or update a tenant's LLM spend/rate caps.

use anyhow::Result;
use sqlx::PgPool;

use fabric_db::queries::quotas;

/// `fabric quota set --tenant <t> --monthly-tokens <n> --monthly-cost-cents <n>
/// --requests-per-minute <n> --tokens-per-minute <n> --alert-threshold-percent <n>`.
#[allow(clippy::too_many_arguments)]
pub async fn run_set(
    pool: &PgPool,
    tenant_id: &str,
    monthly_token_limit: i64,
    monthly_cost_cap_cents: i64,
    requests_per_minute: i32,
    tokens_per_minute: i32,
    alert_threshold_percent: i16,
) -> Result<()> {
    let quota = quotas::set_quota(
        pool,
        tenant_id,
        monthly_token_limit,
        monthly_cost_cap_cents,
        requests_per_minute,
        tokens_per_minute,
        alert_threshold_percent,
    )
    .await?;

    println!("Quota set for tenant {tenant_id}.");
    println!("  Monthly token limit:     {}", quota.monthly_token_limit);
    println!(
        "  Monthly cost cap:        ${:.2}",
        quota.monthly_cost_cap_cents as f64 / 100.0
    );
    println!("  Requests per minute:     {}", quota.requests_per_minute);
    println!("  Tokens per minute:       {}", quota.tokens_per_minute);
    println!(
        "  Alert threshold:         {}%",
        quota.alert_threshold_percent
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    // Requires a live Postgres pool; covered by fabric-core's integration
    // test fixtures.
}
