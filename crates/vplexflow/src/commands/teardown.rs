use crate::utils;
use crate::{GlobalArgs, WorkflowArgs};
use clap::Args;
use colored::Colorize;
use tracing::info;
use vplexflow_config::Settings;
use vplexflow_core::ResourceClient;
use vplexflow_engine::{Orchestrator, TeardownRequest, plan_teardown};

#[derive(Args, Debug, Clone)]
pub struct TeardownArgs {
    #[arg(short, long)]
    pub cluster: Option<String>,

    /// Storage view to remove
    #[arg(long)]
    pub storage_view: String,

    /// Extra virtual volume to remove even if the view does not export it (repeatable)
    #[arg(long = "virtual-volume")]
    pub virtual_volumes: Vec<String>,

    /// Also unregister the view's initiators
    #[arg(long)]
    pub unregister_initiators: bool,

    #[command(flatten)]
    pub workflow: WorkflowArgs,
}

pub async fn handle(
    global: &GlobalArgs,
    settings: &Settings,
    args: TeardownArgs,
) -> anyhow::Result<()> {
    let cluster =
        utils::resolve_cluster(args.cluster, settings.clusters.source.as_ref(), "cluster")?;
    let mut request = TeardownRequest::new(cluster, args.storage_view);
    request.virtual_volumes = args.virtual_volumes;
    request.unregister_initiators = args.unregister_initiators;
    let workflow = args.workflow;

    // Teardown plans are discovered from the array, so even a dry run connects
    let client = utils::connect(global, settings).await?;
    client.verify_cluster(&request.cluster).await?;
    let plan = plan_teardown(client.as_ref(), &request).await?;

    if !workflow.json {
        utils::print_plan(&plan);
    }
    if workflow.dry_run {
        if workflow.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            println!("{}", "Dry run: nothing was changed".dimmed());
        }
        return Ok(());
    }

    info!(view = %request.storage_view, cluster = %request.cluster, "Tearing down");
    let orchestrator = Orchestrator::new(client, utils::orchestrator_config(settings, &workflow))
        .with_cancellation(utils::cancel_on_ctrl_c());
    let report = orchestrator.run(plan).await?;
    utils::finish(&report, workflow.json)
}
