mod assets;
mod config;
mod drift_cmd;
mod llm;
mod plan_cmds;
mod policy;
mod quota_cmd;
mod task_cmds;
mod usage_cmd;

use clap::{Parser, Subcommand};

use fabric_db::pool;

use config::FabricConfig;

#[derive(Parser)]
#[command(name = "fabric", about = "AI task orchestration core: operator CLI")]
struct Cli {
    /// Database URL (overrides FABRIC_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a fabric config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/fabric")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the fabric database (create + run migrations)
    DbInit,
    /// Submit a new task from a natural-language intent
    SubmitTask {
        /// Tenant the task belongs to
        #[arg(long)]
        tenant: String,
        /// Identity recorded as the task's creator
        #[arg(long = "created-by")]
        created_by: String,
        /// Natural-language description of what should happen
        intent: String,
    },
    /// Task lifecycle commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Plan approval commands
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Usage and cost reporting
    Usage {
        #[command(subcommand)]
        command: UsageCommands,
    },
    /// Quota management
    Quota {
        #[command(subcommand)]
        command: QuotaCommands,
    },
    /// Drift-detection scheduler
    Drift {
        #[command(subcommand)]
        command: DriftCommands,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Show a task's current status, latest plan, and latest run
    Status {
        /// Task ID to show
        task_id: String,
    },
    /// Cancel a task that has not yet started executing
    Cancel {
        /// Task ID to cancel
        task_id: String,
    },
    /// Drive a `created` task through the agent loop, validation, and a
    /// workflow run, using fixture-backed collaborators
    Run {
        /// Task ID to run
        task_id: String,
        /// Path to a JSON LLM response script (see the `llm` module)
        #[arg(long = "llm-fixture")]
        llm_fixture: String,
        /// Path to a JSON policy verdict fixture (see the `policy` module)
        #[arg(long = "policy-fixture")]
        policy_fixture: String,
        /// Path to a JSON asset fixture (see the `assets` module)
        #[arg(long = "assets-fixture")]
        assets_fixture: String,
        /// Agent identity recorded against audit events
        #[arg(long = "agent-name", default_value = "fabric-agent")]
        agent_name: String,
        /// Model name passed to the LLM provider
        #[arg(long, default_value = "fixture-model")]
        model: String,
        /// Environment the workflow run applies to
        #[arg(long, default_value = "staging")]
        environment: String,
        /// Plan type: drift_plan, patch_plan, or dr_runbook
        #[arg(long = "plan-type", default_value = "patch_plan")]
        plan_type: String,
        /// Seconds to wait for HITL approval before timing out
        #[arg(long = "approval-deadline-secs", default_value_t = 3600)]
        approval_deadline_secs: u64,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Approve a plan awaiting human review
    Approve {
        /// Plan ID to approve
        plan_id: String,
        /// Identity of the approver
        #[arg(long = "by")]
        approver: String,
    },
    /// Reject a plan awaiting human review
    Reject {
        /// Plan ID to reject
        plan_id: String,
        /// Identity of the approver
        #[arg(long = "by")]
        approver: String,
        /// Optional rejection note
        #[arg(long)]
        note: Option<String>,
    },
    /// List plans currently awaiting approval for a tenant
    Pending {
        /// Tenant to list pending plans for
        #[arg(long)]
        tenant: String,
    },
}

#[derive(Subcommand)]
enum UsageCommands {
    /// Show cost and token usage for a tenant over a billing window
    Report {
        /// Tenant to report on
        #[arg(long)]
        tenant: String,
        /// Size of the reporting window in days
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

#[derive(Subcommand)]
enum QuotaCommands {
    /// Create or update a tenant's LLM spend and rate caps
    Set {
        /// Tenant to configure
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        monthly_tokens: i64,
        #[arg(long)]
        monthly_cost_cents: i64,
        #[arg(long, default_value_t = 60)]
        requests_per_minute: i32,
        #[arg(long, default_value_t = 100_000)]
        tokens_per_minute: i32,
        #[arg(long, default_value_t = 80)]
        alert_threshold_percent: i16,
    },
}

#[derive(Subcommand)]
enum DriftCommands {
    /// Run one drift-scheduler evaluation for a tenant
    Tick {
        /// Tenant to evaluate
        #[arg(long)]
        tenant: String,
        /// Path to a JSON asset fixture (see the `assets` module)
        #[arg(long)]
        fixture: String,
        /// Override the warning-tier threshold
        #[arg(long)]
        warning: Option<f64>,
        /// Override the critical-tier threshold
        #[arg(long)]
        critical: Option<f64>,
    },
}

/// Execute the `fabric init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        pricing: config::PricingSection::default(),
        scheduler: config::SchedulerSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `fabric db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `fabric db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = FabricConfig::resolve(cli_db_url)?;

    println!("Initializing fabric database...");

    pool::ensure_database_exists(&resolved.db_config).await?;

    let db_pool = pool::create_pool(&resolved.db_config).await?;

    let migrations_path = pool::default_migrations_path();
    pool::run_migrations(&db_pool, migrations_path).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("fabric db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::SubmitTask {
            tenant,
            created_by,
            intent,
        } => {
            let resolved = FabricConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = task_cmds::run_submit_task(&db_pool, &tenant, &created_by, &intent).await;
            db_pool.close().await;
            result?;
        }
        Commands::Task { command } => {
            let resolved = FabricConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                TaskCommands::Status { task_id } => task_cmds::run_status(&db_pool, &task_id).await,
                TaskCommands::Cancel { task_id } => task_cmds::run_cancel(&db_pool, &task_id).await,
                TaskCommands::Run {
                    task_id,
                    llm_fixture,
                    policy_fixture,
                    assets_fixture,
                    agent_name,
                    model,
                    environment,
                    plan_type,
                    approval_deadline_secs,
                } => {
                    task_cmds::run_run(
                        &db_pool,
                        &task_id,
                        &llm_fixture,
                        &policy_fixture,
                        &assets_fixture,
                        &agent_name,
                        &model,
                        &environment,
                        &plan_type,
                        approval_deadline_secs,
                    )
                    .await
                }
            };
            db_pool.close().await;
            result?;
        }
        Commands::Plan { command } => {
            let resolved = FabricConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                PlanCommands::Approve { plan_id, approver } => {
                    plan_cmds::run_approve(&db_pool, &plan_id, &approver).await
                }
                PlanCommands::Reject {
                    plan_id,
                    approver,
                    note,
                } => plan_cmds::run_reject(&db_pool, &plan_id, &approver, note.as_deref()).await,
                PlanCommands::Pending { tenant } => plan_cmds::run_pending(&db_pool, &tenant).await,
            };
            db_pool.close().await;
            result?;
        }
        Commands::Usage { command } => {
            let resolved = FabricConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                UsageCommands::Report { tenant, days } => {
                    usage_cmd::run_report(&db_pool, &tenant, days, chrono::Utc::now()).await
                }
            };
            db_pool.close().await;
            result?;
        }
        Commands::Quota { command } => {
            let resolved = FabricConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                QuotaCommands::Set {
                    tenant,
                    monthly_tokens,
                    monthly_cost_cents,
                    requests_per_minute,
                    tokens_per_minute,
                    alert_threshold_percent,
                } => {
                    quota_cmd::run_set(
                        &db_pool,
                        &tenant,
                        monthly_tokens,
                        monthly_cost_cents,
                        requests_per_minute,
                        tokens_per_minute,
                        alert_threshold_percent,
                    )
                    .await
                }
            };
            db_pool.close().await;
            result?;
        }
        Commands::Drift { command } => {
            let resolved = FabricConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                DriftCommands::Tick {
                    tenant,
                    fixture,
                    warning,
                    critical,
                } => {
                    drift_cmd::run_tick(
                        &db_pool,
                        &tenant,
                        &fixture,
                        warning.unwrap_or(resolved.warning_threshold),
                        critical.unwrap_or(resolved.critical_threshold),
                    )
                    .await
                }
            };
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
