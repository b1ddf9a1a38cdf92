//! gpu-planner - estimate, plan and gate GPU training jobs.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gpu_planner::{plan, EstimateAssumptions, PlanRequest, PriceTier, Sizing, Workload};
use gpu_planner_server::{CatalogArgs, Config};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// gpu-planner - Estimate and plan GPU training runs.
#[derive(Parser)]
#[command(name = "gpu-planner", version)]
#[command(about = "Estimate training cost, plan GPU configurations and attest submissions")]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "GPU_PLANNER_LOG_JSON", default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service.
    Serve(Config),

    /// List catalog GPUs.
    Catalog {
        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// Estimate one configuration.
    Estimate {
        #[command(flatten)]
        catalog: CatalogArgs,

        #[command(flatten)]
        workload: WorkloadArgs,

        /// GPU model (from `catalog` command).
        #[arg(long)]
        gpu_model: String,

        /// GPU count. Takes precedence over `--target-days`.
        #[arg(long)]
        num_gpus: Option<u32>,

        /// Derive the GPU count from a wall-clock target.
        #[arg(long)]
        target_days: Option<f64>,

        /// Price tier: on_demand, spot or reserved.
        #[arg(long, default_value = "on_demand")]
        tier: PriceTier,

        #[command(flatten)]
        assumptions: AssumptionArgs,
    },

    /// Rank configurations on the cost/time Pareto frontier.
    Plan {
        #[command(flatten)]
        catalog: CatalogArgs,

        #[command(flatten)]
        workload: WorkloadArgs,

        /// GPU models to consider (comma-separated, default all).
        #[arg(long, value_delimiter = ',')]
        gpu_models: Vec<String>,

        /// GPU counts to consider (comma-separated).
        #[arg(long, value_delimiter = ',')]
        num_gpus: Vec<u32>,

        /// Price tiers to consider (comma-separated).
        #[arg(long, value_delimiter = ',')]
        tiers: Vec<PriceTier>,

        /// Wall-clock target in days.
        #[arg(long)]
        target_days: Option<f64>,

        /// Compute budget in USD.
        #[arg(long)]
        budget_usd: Option<f64>,

        #[command(flatten)]
        assumptions: AssumptionArgs,
    },
}

#[derive(Args)]
struct WorkloadArgs {
    /// Model size in billions of parameters.
    #[arg(long)]
    params_b: f64,

    /// Training tokens in billions.
    #[arg(long)]
    tokens_b: f64,
}

impl WorkloadArgs {
    fn workload(&self) -> Workload {
        Workload::new(self.params_b, self.tokens_b)
    }
}

#[derive(Args)]
struct AssumptionArgs {
    /// Fraction of peak throughput achieved.
    #[arg(long, default_value_t = EstimateAssumptions::default().efficiency)]
    efficiency: f64,

    /// Fraction of wall time doing useful work.
    #[arg(long, default_value_t = EstimateAssumptions::default().utilization)]
    utilization: f64,
}

impl AssumptionArgs {
    fn assumptions(&self) -> EstimateAssumptions {
        EstimateAssumptions {
            efficiency: self.efficiency,
            utilization: self.utilization,
            ..EstimateAssumptions::default()
        }
    }
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    (!values.is_empty()).then_some(values)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Serve(config) => {
            info!(bind = %config.bind_addr, "Starting GPU planner service");
            gpu_planner_server::run(config).await?;
        }

        Commands::Catalog { catalog } => {
            let catalog = catalog.load()?;
            print_json(&catalog)?;
        }

        Commands::Estimate {
            catalog,
            workload,
            gpu_model,
            num_gpus,
            target_days,
            tier,
            assumptions,
        } => {
            let catalog = catalog.load()?;
            let sizing = Sizing {
                num_gpus,
                target_time_days: target_days,
            };
            let estimate = catalog.estimate(
                &gpu_model,
                &workload.workload(),
                sizing,
                &assumptions.assumptions(),
                tier,
            )?;
            print_json(&estimate)?;
        }

        Commands::Plan {
            catalog,
            workload,
            gpu_models,
            num_gpus,
            tiers,
            target_days,
            budget_usd,
            assumptions,
        } => {
            let catalog = catalog.load()?;
            let workload = workload.workload();
            workload.validate()?;

            let request = PlanRequest {
                gpu_models: non_empty(gpu_models),
                num_gpus_list: non_empty(num_gpus),
                price_tiers: non_empty(tiers),
                target_time_days: target_days,
                budget_usd,
                assumptions: assumptions.assumptions(),
            };
            let plans = plan(&catalog, &workload, &request)?;
            if plans.is_empty() {
                anyhow::bail!("No configuration could be costed for this workload");
            }
            print_json(&plans)?;
        }
    }

    Ok(())
}
