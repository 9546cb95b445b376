use crate::GlobalArgs;
use crate::utils;
use clap::Args;
use tracing::info;
use vplexflow_config::Settings;
use vplexflow_core::FilterSet;
use vplexflow_engine::{GatherSubset, gather_facts};

#[derive(Args, Debug, Clone)]
pub struct FactsArgs {
    /// Cluster to list; without it only distributed and system-wide resources are listed
    #[arg(short, long)]
    pub cluster: Option<String>,

    /// Subset to gather, e.g. stor_vol, dist_virt_vol or be_port (repeatable, default all)
    #[arg(long = "subset")]
    pub subsets: Vec<GatherSubset>,

    /// Filter as key:operator:value, e.g. capacity:greater:10GB (repeatable)
    #[arg(long = "filter")]
    pub filters: Vec<String>,
}

pub async fn handle(
    global: &GlobalArgs,
    settings: &Settings,
    args: FactsArgs,
) -> anyhow::Result<()> {
    // Bad filters are rejected before any request goes out
    let filters = FilterSet::parse_all(&args.filters)?;
    let subsets = if args.subsets.is_empty() {
        GatherSubset::ALL.to_vec()
    } else {
        args.subsets
    };
    let cluster = args.cluster.or_else(|| settings.clusters.source.clone());

    let client = utils::connect(global, settings).await?;
    let facts = gather_facts(client.as_ref(), cluster.as_deref(), &subsets, &filters).await?;
    info!(subsets = subsets.len(), "Gathered facts");
    println!("{}", serde_json::to_string_pretty(&facts)?);
    Ok(())
}
