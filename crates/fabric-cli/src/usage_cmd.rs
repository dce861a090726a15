//! `fabric usage report`: cost and usage breakdown for a tenant over a
//! billing window.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use fabric_db::queries::usage;

/// `fabric usage report --tenant <t> [--days <n>]`.
///
/// Defaults to the last 30 days when `days` is not given.
pub async fn run_report(pool: &PgPool, tenant_id: &str, days: i64, now: DateTime<Utc>) -> Result<()> {
    let since = now - Duration::days(days);

    let total_cents = usage::total_cost_cents_for_tenant(pool, tenant_id, since, now).await?;
    let breakdown = usage::cost_breakdown_by_model(pool, tenant_id, since, now).await?;

    println!("Usage report for tenant {tenant_id}");
    println!(
        "  Window: {} to {} ({days} days)",
        since.format("%Y-%m-%d"),
        now.format("%Y-%m-%d")
    );
    println!("  Total cost: ${:.2}", total_cents as f64 / 100.0);
    println!();

    if breakdown.is_empty() {
        println!("No usage recorded in this window.");
        return Ok(());
    }

    println!("{:<30}  {:>12}", "MODEL", "COST");
    for (model, cents) in &breakdown {
        println!("{:<30}  ${:>10.2}", model, *cents as f64 / 100.0);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    // Requires a live Postgres pool; covered by fabric-core's integration
    // test fixtures.
}
