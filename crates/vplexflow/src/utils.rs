use crate::{GlobalArgs, WorkflowArgs};
use anyhow::Context;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vplexflow_config::Settings;
use vplexflow_core::ResourceClient;
use vplexflow_engine::{Intent, OrchestratorConfig, Outcome, Plan, WorkflowReport};
use vplexflow_rest::{ConnectionConfig, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS, VplexRestClient};

/// Settings from `--config`, or from discovery when not given
pub fn load_settings(explicit: Option<&Path>) -> anyhow::Result<Settings> {
    match explicit {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => {
            let (path, settings) = Settings::discover()?;
            if let Some(path) = path {
                info!(path = %path.display(), "Using settings file");
            }
            Ok(settings)
        }
    }
}

/// Flags and `VPLEX_*` variables win over the settings file
pub fn connection_config(
    global: &GlobalArgs,
    settings: &Settings,
) -> anyhow::Result<ConnectionConfig> {
    let file = &settings.connection;
    let host = global
        .host
        .clone()
        .or_else(|| file.host.clone())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no management server given: pass --host, set VPLEX_HOST or add connection.host to the settings file"
            )
        })?;
    let user = global
        .user
        .clone()
        .or_else(|| file.user.clone())
        .ok_or_else(|| anyhow::anyhow!("no user given: pass --user or set VPLEX_USER"))?;
    let password = global
        .password
        .clone()
        .or_else(|| file.password.clone())
        .ok_or_else(|| anyhow::anyhow!("no password given: set VPLEX_PASSWORD"))?;

    let config = ConnectionConfig {
        host,
        port: global.port.or(file.port).unwrap_or(DEFAULT_PORT),
        user,
        password,
        verify_cert: global.verify_cert.or(file.verify_cert).unwrap_or(false),
        ssl_ca_cert: global.ssl_ca_cert.clone().or_else(|| file.ssl_ca_cert.clone()),
        timeout_secs: global
            .timeout
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    };
    config.validate()?;
    Ok(config)
}

/// Build the REST client and check the server answers
pub async fn connect(
    global: &GlobalArgs,
    settings: &Settings,
) -> anyhow::Result<Arc<VplexRestClient>> {
    let config = connection_config(global, settings)?;
    info!(endpoint = %config.endpoint(), "Connecting");
    let client = VplexRestClient::new(&config)?;
    client
        .check_connection()
        .await
        .with_context(|| format!("could not reach {}", config.endpoint()))?;
    info!(host = %config.host, "Connected");
    Ok(Arc::new(client))
}

/// Cluster from the flag, falling back to the settings file
pub fn resolve_cluster(
    flag: Option<String>,
    fallback: Option<&String>,
    what: &str,
) -> anyhow::Result<String> {
    flag.or_else(|| fallback.cloned()).ok_or_else(|| {
        anyhow::anyhow!(
            "no {} given: pass it on the command line or set it under clusters in the settings file",
            what
        )
    })
}

pub fn orchestrator_config(settings: &Settings, args: &WorkflowArgs) -> OrchestratorConfig {
    let mut config = settings.orchestrator_config();
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency.max(1);
    }
    if let Some(policy) = args.failure_policy {
        config.failure_policy = policy;
    }
    if let Some(max_retries) = args.max_retries {
        config.wait.max_retries = max_retries.max(1);
    }
    if let Some(delay) = args.delay_secs {
        config.wait.delay = Duration::from_secs(delay);
    }
    config
}

/// Token cancelled on Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, letting in-flight operations finish");
            eprintln!("{}", "Interrupted. Waiting for in-flight operations...".yellow());
            trigger.cancel();
        }
    });
    token
}

pub fn print_plan(plan: &Plan) {
    let title = match plan.intent {
        Intent::Provision => "Provision plan",
        Intent::Teardown => "Teardown plan",
    };
    println!();
    println!("{}", format!("{}:", title).bold());
    if plan.is_empty() {
        println!("  {}", "nothing to do".dimmed());
        return;
    }
    for (index, stage) in plan.stages.iter().enumerate() {
        println!(
            "  {} {}",
            format!("[{}]", index + 1).dimmed(),
            stage.kind.to_string().cyan()
        );
        for op in &stage.operations {
            println!("      {} {}", op.verb().to_string().yellow(), op.description);
        }
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn outcome_marker(outcome: Outcome) -> colored::ColoredString {
    match outcome {
        Outcome::Created => "+".green(),
        Outcome::Modified => "~".yellow(),
        Outcome::Deleted => "-".red(),
        Outcome::Unchanged => "=".dimmed(),
    }
}

/// Print the report and turn a failed workflow into an error exit
pub fn finish(report: &WorkflowReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!();
        for step in &report.results {
            println!(
                "  {} {} {}",
                outcome_marker(step.outcome),
                step.reference,
                step.outcome.to_string().dimmed()
            );
        }
        for entry in &report.rollback {
            match (&entry.outcome, &entry.error) {
                (_, Some(error)) => println!(
                    "  {} rollback of {} failed: {}",
                    "!".red(),
                    entry.reference,
                    error
                ),
                (Some(outcome), None) => println!(
                    "  {} rolled back {} ({})",
                    outcome_marker(*outcome),
                    entry.reference,
                    outcome
                ),
                (None, None) => {}
            }
        }
        println!();
    }

    match &report.failure {
        None => {
            if !json {
                let status = if report.changed() {
                    "✓ Completed with changes".green()
                } else {
                    "✓ Already up to date".green()
                };
                println!("{}", status.bold());
            }
            Ok(())
        }
        Some(failure) => {
            let location = failure
                .reference
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| failure.kind.to_string());
            eprintln!(
                "{} stage {} ({}) failed at {}: {}",
                "✗".red().bold(),
                failure.stage + 1,
                failure.kind,
                location,
                failure.error
            );
            if report.rollback.is_empty() {
                eprintln!(
                    "{}",
                    "Resources created so far were left in place; run teardown to remove them."
                        .yellow()
                );
            }
            Err(anyhow::anyhow!("{} workflow failed", report.intent))
        }
    }
}
