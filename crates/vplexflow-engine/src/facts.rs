//! Fact gathering: filtered listings across resource kinds

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};
use vplexflow_core::{
    Filter, FilterSet, ResourceClient, ResourceDetails, ResourceKind, Result, VplexError,
};

/// One listing `gather-facts` can produce
///
/// The first eight are the kinds a workflow manages. The rest are read-only
/// listings of the surrounding system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatherSubset {
    StorVol,
    Extent,
    Device,
    DistDevice,
    VirtVol,
    StorView,
    Initiator,
    Port,
    StorArray,
    Cg,
    DistCg,
    DistVirtVol,
    Amp,
    BePort,
    DeviceMigJob,
    ExtentMigJob,
}

impl GatherSubset {
    pub const ALL: [GatherSubset; 16] = [
        GatherSubset::StorVol,
        GatherSubset::Extent,
        GatherSubset::Device,
        GatherSubset::DistDevice,
        GatherSubset::VirtVol,
        GatherSubset::StorView,
        GatherSubset::Initiator,
        GatherSubset::Port,
        GatherSubset::StorArray,
        GatherSubset::Cg,
        GatherSubset::DistCg,
        GatherSubset::DistVirtVol,
        GatherSubset::Amp,
        GatherSubset::BePort,
        GatherSubset::DeviceMigJob,
        GatherSubset::ExtentMigJob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatherSubset::StorVol => "stor_vol",
            GatherSubset::Extent => "extent",
            GatherSubset::Device => "device",
            GatherSubset::DistDevice => "dist_device",
            GatherSubset::VirtVol => "virt_vol",
            GatherSubset::StorView => "stor_view",
            GatherSubset::Initiator => "initiator",
            GatherSubset::Port => "port",
            GatherSubset::StorArray => "stor_array",
            GatherSubset::Cg => "cg",
            GatherSubset::DistCg => "dist_cg",
            GatherSubset::DistVirtVol => "dist_virt_vol",
            GatherSubset::Amp => "amp",
            GatherSubset::BePort => "be_port",
            GatherSubset::DeviceMigJob => "device_mig_job",
            GatherSubset::ExtentMigJob => "extent_mig_job",
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            GatherSubset::StorVol => ResourceKind::StorageVolume,
            GatherSubset::Extent => ResourceKind::Extent,
            GatherSubset::Device => ResourceKind::Device,
            GatherSubset::DistDevice => ResourceKind::DistributedDevice,
            GatherSubset::VirtVol => ResourceKind::VirtualVolume,
            GatherSubset::StorView => ResourceKind::StorageView,
            GatherSubset::Initiator => ResourceKind::Initiator,
            GatherSubset::Port => ResourceKind::Port,
            GatherSubset::StorArray => ResourceKind::StorageArray,
            GatherSubset::Cg => ResourceKind::ConsistencyGroup,
            GatherSubset::DistCg => ResourceKind::DistributedConsistencyGroup,
            GatherSubset::DistVirtVol => ResourceKind::DistributedVirtualVolume,
            GatherSubset::Amp => ResourceKind::ArrayManagementProvider,
            GatherSubset::BePort => ResourceKind::BackEndPort,
            GatherSubset::DeviceMigJob => ResourceKind::DeviceMigration,
            GatherSubset::ExtentMigJob => ResourceKind::ExtentMigration,
        }
    }

    /// Key of this subset in the gathered facts
    pub fn key(&self) -> &'static str {
        match self {
            GatherSubset::StorVol => "StorageVolumes",
            GatherSubset::Extent => "Extents",
            GatherSubset::Device => "Devices",
            GatherSubset::DistDevice => "DistributedDevices",
            GatherSubset::VirtVol => "VirtualVolumes",
            GatherSubset::StorView => "StorageViews",
            GatherSubset::Initiator => "Initiators",
            GatherSubset::Port => "Ports",
            GatherSubset::StorArray => "StorageArrays",
            GatherSubset::Cg => "ConsistencyGroups",
            GatherSubset::DistCg => "DistributedConsistencyGroups",
            GatherSubset::DistVirtVol => "DistributedVirtualVolumes",
            GatherSubset::Amp => "ArrayManagementProviders",
            GatherSubset::BePort => "BackEndPorts",
            GatherSubset::DeviceMigJob => "DeviceMigrationJobs",
            GatherSubset::ExtentMigJob => "ExtentMigrationJobs",
        }
    }

    /// Filter always applied to this subset on top of the user's
    fn implied_filter(&self) -> Option<&'static str> {
        match self {
            // /hardware/ports lists ports of every role
            GatherSubset::BePort => Some("role:equal:back-end"),
            _ => None,
        }
    }

    fn filters(&self, user: &FilterSet) -> Result<FilterSet> {
        let Some(raw) = self.implied_filter() else {
            return Ok(user.clone());
        };
        let mut filters: Vec<Filter> = user.iter().cloned().collect();
        filters.push(Filter::parse(raw)?);
        FilterSet::from_filters(filters)
    }
}

impl FromStr for GatherSubset {
    type Err = VplexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|subset| subset.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
                VplexError::validation(format!(
                    "unknown gather subset '{}', expected one of {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

impl std::fmt::Display for GatherSubset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gathered listings keyed by subset, plus the cluster names
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Facts {
    #[serde(rename = "Clusters")]
    pub clusters: Vec<String>,
    #[serde(flatten)]
    pub resources: BTreeMap<String, Vec<ResourceDetails>>,
}

impl Facts {
    pub fn get(&self, subset: GatherSubset) -> &[ResourceDetails] {
        self.resources
            .get(subset.key())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// List the requested subsets, applying `filters` to each
///
/// Cluster names are always gathered. Without a cluster only distributed and
/// system-wide subsets can be listed; cluster-scoped ones are skipped with a
/// warning.
pub async fn gather_facts(
    client: &dyn ResourceClient,
    cluster: Option<&str>,
    subsets: &[GatherSubset],
    filters: &FilterSet,
) -> Result<Facts> {
    let clusters = client.clusters().await?;
    if let Some(name) = cluster {
        if !clusters.iter().any(|c| c == name) {
            return Err(VplexError::not_found(format!("cluster '{}'", name)));
        }
    }

    let mut facts = Facts {
        clusters,
        resources: BTreeMap::new(),
    };
    for subset in subsets {
        let kind = subset.kind();
        if kind.is_clustered() && cluster.is_none() {
            warn!(subset = %subset, "No cluster given, skipping cluster-scoped subset");
            continue;
        }
        let items = client.list(kind, cluster, &subset.filters(filters)?).await?;
        debug!(subset = %subset, count = items.len(), "Gathered");
        facts.resources.insert(subset.key().to_string(), items);
    }
    Ok(facts)
}
