mod commands;
mod utils;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vplexflow_config::Settings;
use vplexflow_engine::FailurePolicy;

#[derive(Parser)]
#[command(name = "vplexflow")]
#[command(about = "Idempotent VPLEX storage provisioning and teardown", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Connection and settings options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Settings file (overrides discovery and VPLEXFLOW_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Management server address
    #[arg(long, env = "VPLEX_HOST", global = true)]
    pub host: Option<String>,

    #[arg(long, env = "VPLEX_PORT", global = true)]
    pub port: Option<u16>,

    #[arg(long, env = "VPLEX_USER", global = true)]
    pub user: Option<String>,

    #[arg(long, env = "VPLEX_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Verify the server certificate (requires --ssl-ca-cert); `--verify-cert false`
    /// turns off verification enabled in the settings file
    #[arg(
        long,
        env = "VPLEX_VERIFY_CERT",
        global = true,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub verify_cert: Option<bool>,

    /// PEM CA bundle used with --verify-cert
    #[arg(long, env = "VPLEX_SSL_CA_CERT", global = true)]
    pub ssl_ca_cert: Option<PathBuf>,

    /// Request timeout in seconds (1-3600)
    #[arg(long, env = "VPLEX_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Workflow tuning shared by provision and teardown
#[derive(Args, Debug, Clone)]
pub struct WorkflowArgs {
    /// Print the plan without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Operations of one stage run at most this many at a time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// fail-fast or best-effort-rollback
    #[arg(long)]
    pub failure_policy: Option<FailurePolicy>,

    /// Rebuild polls before giving up
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Seconds between rebuild polls
    #[arg(long)]
    pub delay_secs: Option<u64>,

    /// Print the workflow report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Claim volumes and export them through a storage view
    Provision(commands::provision::ProvisionArgs),
    /// Remove a storage view and everything under it
    Teardown(commands::teardown::TeardownArgs),
    /// List array resources as JSON
    #[command(name = "gather-facts")]
    GatherFacts(commands::facts::FactsArgs),
    /// Show version information
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

/// Logging and settings for commands that talk to the array
fn prepare(global: &GlobalArgs) -> anyhow::Result<Settings> {
    init_tracing(global.verbose);
    utils::load_settings(global.config.as_deref())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let global = &cli.global;

    match cli.command {
        // no settings file needed
        Commands::Version => {
            println!("vplexflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Provision(args) => {
            let settings = prepare(global)?;
            commands::provision::handle(global, &settings, args).await?;
        }
        Commands::Teardown(args) => {
            let settings = prepare(global)?;
            commands::teardown::handle(global, &settings, args).await?;
        }
        Commands::GatherFacts(args) => {
            let settings = prepare(global)?;
            commands::facts::handle(global, &settings, args).await?;
        }
    }

    Ok(())
}
