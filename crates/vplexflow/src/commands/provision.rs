use crate::utils;
use crate::{GlobalArgs, WorkflowArgs};
use clap::Args;
use colored::Colorize;
use tracing::info;
use vplexflow_config::Settings;
use vplexflow_core::{ResourceClient, StripeDepth};
use vplexflow_engine::{
    InitiatorRequest, MetroTarget, Orchestrator, ProvisionRequest, plan_provision,
};

#[derive(Args, Debug, Clone)]
pub struct ProvisionArgs {
    /// Cluster the storage volumes live on
    #[arg(short, long)]
    pub cluster: Option<String>,

    /// Storage volume to claim (repeatable)
    #[arg(long = "storage-volume", required = true)]
    pub storage_volumes: Vec<String>,

    /// Storage view to create or extend
    #[arg(long)]
    pub storage_view: String,

    /// Front-end port of the view (repeatable)
    #[arg(long = "port", required = true)]
    pub ports: Vec<String>,

    /// Host initiator as name=wwn[:host_type] (repeatable)
    #[arg(long = "initiator")]
    pub initiators: Vec<InitiatorRequest>,

    /// Create thin virtual volumes
    #[arg(long)]
    pub thin: bool,

    /// Stripe depth of single-extent devices, e.g. 64KB
    #[arg(long)]
    pub stripe_depth: Option<StripeDepth>,

    /// Second cluster for a distributed (metro) provision
    #[arg(long)]
    pub target_cluster: Option<String>,

    /// Storage volume on the target cluster (repeatable)
    #[arg(long = "target-volume")]
    pub target_volumes: Vec<String>,

    /// Rule set of the distributed devices
    #[arg(long)]
    pub rule_set: Option<String>,

    /// Synchronize distributed device legs on creation
    #[arg(long)]
    pub sync: bool,

    #[command(flatten)]
    pub workflow: WorkflowArgs,
}

impl ProvisionArgs {
    fn into_request(self, settings: &Settings) -> anyhow::Result<ProvisionRequest> {
        let cluster = utils::resolve_cluster(
            self.cluster,
            settings.clusters.source.as_ref(),
            "cluster",
        )?;
        let mut request = ProvisionRequest::new(
            cluster,
            self.storage_volumes,
            self.storage_view,
            self.ports,
        )
        .with_initiators(self.initiators);
        request.thin = self.thin;
        request.stripe_depth = self.stripe_depth;

        if !self.target_volumes.is_empty() {
            let target = utils::resolve_cluster(
                self.target_cluster,
                settings.clusters.target.as_ref(),
                "target cluster",
            )?;
            request = request.with_metro(MetroTarget {
                cluster: target,
                storage_volumes: self.target_volumes,
                rule_set: self.rule_set,
                sync: self.sync,
            });
        } else if self.target_cluster.is_some() {
            anyhow::bail!("--target-cluster needs at least one --target-volume");
        }
        Ok(request)
    }
}

pub async fn handle(
    global: &GlobalArgs,
    settings: &Settings,
    args: ProvisionArgs,
) -> anyhow::Result<()> {
    let workflow = args.workflow.clone();
    let request = args.into_request(settings)?;
    let plan = plan_provision(&request)?;

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

    let client = utils::connect(global, settings).await?;
    client.verify_cluster(&request.cluster).await?;
    if let Some(metro) = &request.metro {
        client.verify_cluster(&metro.cluster).await?;
    }

    info!(view = %request.storage_view, cluster = %request.cluster, "Provisioning");
    let orchestrator = Orchestrator::new(client, utils::orchestrator_config(settings, &workflow))
        .with_cancellation(utils::cancel_on_ctrl_c());
    let report = orchestrator.run(plan).await?;
    utils::finish(&report, workflow.json)
}
