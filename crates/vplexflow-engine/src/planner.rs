//! Dependency graph builder
//!
//! Turns a provision or teardown request into a staged [`Plan`]. Provision
//! planning is pure; teardown planning walks the array's map lookups to find
//! what sits underneath a storage view.

use crate::plan::{Input, Intent, Operation, Plan, Stage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};
use vplexflow_core::{
    Geometry, HostType, ResourceClient, ResourceKind, ResourceRef, ResourceSpec, Result, Scope,
    StripeDepth, VplexError, validate_name,
};

/// Kinds touched by a workflow, in the order their stages run
pub fn stage_order(intent: Intent, metro: bool) -> Vec<ResourceKind> {
    let mut order = vec![
        ResourceKind::StorageVolume,
        ResourceKind::Extent,
        ResourceKind::Device,
    ];
    if metro {
        order.push(ResourceKind::DistributedDevice);
    }
    order.push(ResourceKind::VirtualVolume);
    if metro {
        order.push(ResourceKind::DistributedVirtualVolume);
    }
    order.extend([
        ResourceKind::Initiator,
        ResourceKind::StorageView,
    ]);
    if intent == Intent::Teardown {
        order.reverse();
    }
    order
}

/// Group extents into device legs
///
/// Consecutive extents pair up into mirrors; with an odd count the last
/// extent ends up alone.
pub fn pair_extents<T: Clone>(extents: &[T]) -> Vec<Vec<T>> {
    extents.chunks(2).map(|group| group.to_vec()).collect()
}

pub fn extent_name(storage_volume: &str) -> String {
    format!("extent_{}_1", storage_volume)
}

pub fn device_name(view: &str, n: usize) -> String {
    format!("{}_dev_{}", view, n)
}

pub fn target_device_name(view: &str, n: usize) -> String {
    format!("{}_rdev_{}", view, n)
}

pub fn distributed_device_name(view: &str, n: usize) -> String {
    format!("{}_dd_{}", view, n)
}

pub fn virtual_volume_name(device: &str) -> String {
    format!("{}_vol", device)
}

/// Second cluster of a metro (distributed) provision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetroTarget {
    pub cluster: String,
    pub storage_volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_set: Option<String>,
    #[serde(default)]
    pub sync: bool,
}

/// Host initiator to register and add to the view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiatorRequest {
    pub name: String,
    pub port_wwn: String,
    #[serde(default)]
    pub host_type: HostType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iscsi_name: Option<String>,
}

impl std::str::FromStr for InitiatorRequest {
    type Err = VplexError;

    /// Parse `name=wwn` or `name=wwn:host_type`
    fn from_str(s: &str) -> Result<Self> {
        let (name, rest) = s.split_once('=').ok_or_else(|| {
            VplexError::validation(format!(
                "initiator '{}' should be in the form name=port_wwn[:host_type]",
                s
            ))
        })?;
        let (port_wwn, host_type) = match rest.rsplit_once(':') {
            Some((wwn, ty)) if ty.parse::<HostType>().is_ok() => (wwn, ty.parse()?),
            _ => (rest, HostType::Default),
        };
        Ok(Self {
            name: name.to_string(),
            port_wwn: port_wwn.to_string(),
            host_type,
            iscsi_name: None,
        })
    }
}

/// Everything needed to export a set of storage volumes to a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub cluster: String,
    pub storage_volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metro: Option<MetroTarget>,
    pub storage_view: String,
    pub ports: Vec<String>,
    #[serde(default)]
    pub initiators: Vec<InitiatorRequest>,
    #[serde(default)]
    pub thin: bool,
    /// Applied to single-extent (raid-0) devices; 4KB when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_depth: Option<StripeDepth>,
}

impl ProvisionRequest {
    pub fn new(
        cluster: impl Into<String>,
        storage_volumes: Vec<String>,
        storage_view: impl Into<String>,
        ports: Vec<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            storage_volumes,
            metro: None,
            storage_view: storage_view.into(),
            ports,
            initiators: Vec::new(),
            thin: false,
            stripe_depth: None,
        }
    }

    pub fn with_metro(mut self, metro: MetroTarget) -> Self {
        self.metro = Some(metro);
        self
    }

    pub fn with_initiators(mut self, initiators: Vec<InitiatorRequest>) -> Self {
        self.initiators = initiators;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster.is_empty() {
            return Err(VplexError::validation("cluster name can not be empty"));
        }
        validate_name(&self.storage_view, "storage_view_name")?;
        check_volumes(&self.storage_volumes, &self.cluster)?;
        if self.ports.is_empty() {
            return Err(VplexError::validation(
                "at least one port is required to create a storage view",
            ));
        }

        let groups = pair_extents(&self.storage_volumes).len();
        if let Some(metro) = &self.metro {
            if metro.cluster.is_empty() || metro.cluster == self.cluster {
                return Err(VplexError::validation(
                    "metro target cluster must differ from the source cluster",
                ));
            }
            check_volumes(&metro.storage_volumes, &metro.cluster)?;
            let target_groups = pair_extents(&metro.storage_volumes).len();
            if groups != target_groups {
                return Err(VplexError::validation(format!(
                    "source cluster yields {} devices but target cluster yields {}, metro legs must pair up",
                    groups, target_groups
                )));
            }
        }

        for n in 1..=groups {
            let device = device_name(&self.storage_view, n);
            validate_name(&device, "device_name")?;
            if self.metro.is_some() {
                validate_name(&target_device_name(&self.storage_view, n), "device_name")?;
                let dd = distributed_device_name(&self.storage_view, n);
                validate_name(&dd, "distributed_device_name")?;
                validate_name(&virtual_volume_name(&dd), "virtual_volume_name")?;
            } else {
                validate_name(&virtual_volume_name(&device), "virtual_volume_name")?;
            }
        }

        let mut seen = HashSet::new();
        for initiator in &self.initiators {
            validate_name(&initiator.name, "initiator_name")?;
            if initiator.port_wwn.is_empty() && initiator.iscsi_name.is_none() {
                return Err(VplexError::validation(format!(
                    "initiator '{}' needs a port WWN or an iSCSI name",
                    initiator.name
                )));
            }
            if !seen.insert(initiator.name.as_str()) {
                return Err(VplexError::validation(format!(
                    "initiator '{}' is listed twice",
                    initiator.name
                )));
            }
        }
        Ok(())
    }
}

fn check_volumes(volumes: &[String], cluster: &str) -> Result<()> {
    if volumes.is_empty() {
        return Err(VplexError::validation(format!(
            "no storage volumes given for {}",
            cluster
        )));
    }
    let mut seen = HashSet::new();
    for volume in volumes {
        if volume.is_empty() {
            return Err(VplexError::validation("storage volume name can not be empty"));
        }
        if !seen.insert(volume.as_str()) {
            return Err(VplexError::validation(format!(
                "storage volume '{}' is listed twice for {}",
                volume, cluster
            )));
        }
    }
    Ok(())
}

/// Claim, carve and group one cluster's volumes into devices
///
/// Returns the device operations in group order.
fn plan_cluster_devices(
    stages: &mut BTreeMap<ResourceKind, Stage>,
    cluster: &str,
    volumes: &[String],
    stripe_depth: StripeDepth,
    name_device: impl Fn(usize) -> String,
) -> Vec<Operation> {
    let mut extents = Vec::with_capacity(volumes.len());
    for volume in volumes {
        let claim = Operation::present(
            ResourceRef::storage_volume(cluster, volume.as_str()),
            ResourceSpec::StorageVolume { claim: true },
        );
        let extent = Operation::present(
            ResourceRef::extent(cluster, extent_name(volume)),
            ResourceSpec::Extent {
                storage_volume: Input::output_of(&claim),
            },
        );
        extents.push(Input::output_of(&extent));
        stage(stages, ResourceKind::StorageVolume).push(claim);
        stage(stages, ResourceKind::Extent).push(extent);
    }

    let mut devices = Vec::new();
    for (index, legs) in pair_extents(&extents).into_iter().enumerate() {
        let spec = if legs.len() == 2 {
            ResourceSpec::Device {
                geometry: Geometry::Raid1,
                legs,
                stripe_depth: None,
            }
        } else {
            ResourceSpec::Device {
                geometry: Geometry::Raid0,
                legs,
                stripe_depth: Some(stripe_depth),
            }
        };
        let device = Operation::present(
            ResourceRef::device(cluster, name_device(index + 1)),
            spec,
        );
        devices.push(device.clone());
        stage(stages, ResourceKind::Device).push(device);
    }
    devices
}

fn stage(stages: &mut BTreeMap<ResourceKind, Stage>, kind: ResourceKind) -> &mut Stage {
    stages.entry(kind).or_insert_with(|| Stage::new(kind))
}

fn assemble(intent: Intent, metro: bool, mut stages: BTreeMap<ResourceKind, Stage>) -> Plan {
    let mut plan = Plan::new(intent);
    for kind in stage_order(intent, metro) {
        if let Some(stage) = stages.remove(&kind) {
            plan.push_stage(stage);
        }
    }
    plan
}

/// Build the provision plan for `request`
pub fn plan_provision(request: &ProvisionRequest) -> Result<Plan> {
    request.validate()?;
    let view = request.storage_view.as_str();
    let cluster = request.cluster.as_str();
    let stripe_depth = request.stripe_depth.unwrap_or(StripeDepth::Kb4);
    let mut stages = BTreeMap::new();

    let devices = plan_cluster_devices(
        &mut stages,
        cluster,
        &request.storage_volumes,
        stripe_depth,
        |n| device_name(view, n),
    );

    // What each virtual volume sits on: local devices, or the distributed
    // devices joining them with the target cluster's devices
    let supporting: Vec<Operation> = match &request.metro {
        None => devices,
        Some(metro) => {
            let target_devices = plan_cluster_devices(
                &mut stages,
                &metro.cluster,
                &metro.storage_volumes,
                stripe_depth,
                |n| target_device_name(view, n),
            );
            devices
                .iter()
                .zip(&target_devices)
                .enumerate()
                .map(|(index, (source, target))| {
                    let dd = Operation::present(
                        ResourceRef::distributed_device(distributed_device_name(view, index + 1)),
                        ResourceSpec::DistributedDevice {
                            source: Input::output_of(source),
                            target: Input::output_of(target),
                            rule_set: metro.rule_set.clone(),
                            sync: metro.sync,
                        },
                    );
                    stage(&mut stages, ResourceKind::DistributedDevice).push(dd.clone());
                    dd
                })
                .collect()
        }
    };

    let mut volumes = Vec::new();
    for device in &supporting {
        let name = virtual_volume_name(&device.reference.name);
        let reference = match device.reference.kind {
            ResourceKind::DistributedDevice => ResourceRef::distributed_virtual_volume(name),
            _ => ResourceRef::virtual_volume(cluster, name),
        };
        let kind = reference.kind;
        let volume = Operation::present(
            reference,
            ResourceSpec::VirtualVolume {
                supporting_device: Input::output_of(device),
                thin: request.thin,
            },
        );
        volumes.push(Input::output_of(&volume));
        stage(&mut stages, kind).push(volume);
    }

    let mut initiators = Vec::new();
    for initiator in &request.initiators {
        let register = Operation::present(
            ResourceRef::initiator(cluster, initiator.name.as_str()),
            ResourceSpec::Initiator {
                port_wwn: initiator.port_wwn.clone(),
                host_type: initiator.host_type,
                iscsi_name: initiator.iscsi_name.clone(),
            },
        );
        initiators.push(Input::output_of(&register));
        stage(&mut stages, ResourceKind::Initiator).push(register);
    }

    let ports = request
        .ports
        .iter()
        .map(|p| Input::Fixed(ResourceRef::port(cluster, p.as_str())))
        .collect();
    stage(&mut stages, ResourceKind::StorageView).push(Operation::present(
        ResourceRef::storage_view(cluster, view),
        ResourceSpec::StorageView {
            ports,
            initiators,
            virtual_volumes: volumes,
        },
    ));

    let plan = assemble(Intent::Provision, request.metro.is_some(), stages);
    plan.validate()?;
    info!(
        view = %view,
        stages = plan.stages.len(),
        operations = plan.len(),
        "Planned provision"
    );
    Ok(plan)
}

/// What to take apart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeardownRequest {
    pub cluster: String,
    pub storage_view: String,
    /// Virtual volumes to remove even if they are not in the view
    #[serde(default)]
    pub virtual_volumes: Vec<String>,
    #[serde(default)]
    pub unregister_initiators: bool,
}

impl TeardownRequest {
    pub fn new(cluster: impl Into<String>, storage_view: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            storage_view: storage_view.into(),
            virtual_volumes: Vec::new(),
            unregister_initiators: false,
        }
    }
}

/// Build the teardown plan by discovering what the view is made of
///
/// A view that no longer exists yields an empty plan, so running teardown
/// twice is harmless. Anything still used by a resource outside the
/// teardown (a volume exported by another view, a device under a foreign
/// volume) is left in place together with everything beneath it.
pub async fn plan_teardown(client: &dyn ResourceClient, request: &TeardownRequest) -> Result<Plan> {
    validate_name(&request.storage_view, "storage_view_name")?;
    let cluster = request.cluster.as_str();
    let view_ref = ResourceRef::storage_view(cluster, request.storage_view.as_str());

    let mut candidates: BTreeSet<ResourceRef> = BTreeSet::new();
    let mut roots = Vec::new();

    match client.find(&view_ref).await? {
        Some(view) => {
            roots.extend(view.volumes().cloned());
            if request.unregister_initiators {
                roots.extend(view.children_of_kind(ResourceKind::Initiator).cloned());
            }
            candidates.insert(view_ref.clone());
        }
        None => debug!(view = %view_ref, "Storage view not found"),
    }

    for name in &request.virtual_volumes {
        match find_volume(client, cluster, name).await? {
            Some(volume) => roots.push(volume),
            None => debug!(volume = %name, "Virtual volume not found"),
        }
    }

    // Depth-first down to the storage volumes, remembering who uses what
    let mut parents: HashMap<ResourceRef, Vec<ResourceRef>> = HashMap::new();
    let mut stack = roots;
    while let Some(current) = stack.pop() {
        if parents.contains_key(&current) {
            continue;
        }
        let map = client.map(&current).await?;
        stack.extend(map.children.into_iter().filter(|c| {
            matches!(
                c.kind,
                ResourceKind::Extent
                    | ResourceKind::Device
                    | ResourceKind::DistributedDevice
                    | ResourceKind::StorageVolume
            )
        }));
        parents.insert(current.clone(), map.parents);
        candidates.insert(current);
    }

    // Drop whatever has a user outside the set until nothing changes; a
    // dropped resource takes its descendants with it
    loop {
        let kept: Vec<(ResourceRef, ResourceRef)> = candidates
            .iter()
            .filter_map(|candidate| {
                parents
                    .get(candidate)?
                    .iter()
                    .find(|p| !candidates.contains(*p))
                    .map(|user| (candidate.clone(), user.clone()))
            })
            .collect();
        if kept.is_empty() {
            break;
        }
        for (resource, user) in kept {
            warn!(
                resource = %resource,
                used_by = %user,
                "Still in use outside the teardown, keeping"
            );
            candidates.remove(&resource);
        }
    }

    let metro = candidates.iter().any(|r| r.kind.scope() == Scope::Distributed);
    let mut by_kind: BTreeMap<ResourceKind, Vec<ResourceRef>> = BTreeMap::new();
    for reference in candidates {
        by_kind.entry(reference.kind).or_default().push(reference);
    }
    let mut plan = Plan::new(Intent::Teardown);
    for kind in stage_order(Intent::Teardown, metro) {
        let mut stage = Stage::new(kind);
        for reference in by_kind.remove(&kind).unwrap_or_default() {
            stage.push(Operation::absent(reference));
        }
        plan.push_stage(stage);
    }
    plan.validate()?;
    info!(
        view = %view_ref,
        operations = plan.len(),
        "Planned teardown"
    );
    Ok(plan)
}

/// A named volume on `cluster`, falling back to a distributed one
async fn find_volume(
    client: &dyn ResourceClient,
    cluster: &str,
    name: &str,
) -> Result<Option<ResourceRef>> {
    for volume in [
        ResourceRef::virtual_volume(cluster, name),
        ResourceRef::distributed_virtual_volume(name),
    ] {
        if client.find(&volume).await?.is_some() {
            return Ok(Some(volume));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Verb;

    fn volumes(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("sv{}", i)).collect()
    }

    fn request(n: usize) -> ProvisionRequest {
        ProvisionRequest::new("cluster-1", volumes(n), "esx", vec!["P0-FC00".to_string()])
    }

    #[test]
    fn test_pairing_law() {
        for n in 0..12usize {
            let items: Vec<usize> = (0..n).collect();
            let groups = pair_extents(&items);
            assert_eq!(groups.len(), n.div_ceil(2));
            let singles: Vec<&Vec<usize>> = groups.iter().filter(|g| g.len() == 1).collect();
            assert!(groups.iter().all(|g| g.len() == 1 || g.len() == 2));
            assert!(singles.len() <= 1);
            if let Some(single) = singles.first() {
                assert_eq!(single[0], n - 1);
                assert_eq!(groups.last().map(|g| g.len()), Some(1));
            }
        }
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(
            stage_order(Intent::Provision, true),
            vec![
                ResourceKind::StorageVolume,
                ResourceKind::Extent,
                ResourceKind::Device,
                ResourceKind::DistributedDevice,
                ResourceKind::VirtualVolume,
                ResourceKind::DistributedVirtualVolume,
                ResourceKind::Initiator,
                ResourceKind::StorageView,
            ]
        );
        let teardown = stage_order(Intent::Teardown, false);
        assert_eq!(teardown.first(), Some(&ResourceKind::StorageView));
        assert_eq!(teardown.last(), Some(&ResourceKind::StorageVolume));
        assert!(!teardown.contains(&ResourceKind::DistributedDevice));
        assert!(!teardown.contains(&ResourceKind::DistributedVirtualVolume));
    }

    #[test]
    fn test_odd_volume_count_gets_raid0_tail() {
        let plan = plan_provision(&request(3)).unwrap();
        let devices: Vec<&Operation> = plan
            .operations()
            .filter(|op| op.reference.kind == ResourceKind::Device)
            .collect();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].reference.name, "esx_dev_1");
        match &devices[1].spec {
            Some(ResourceSpec::Device {
                geometry,
                legs,
                stripe_depth,
            }) => {
                assert_eq!(*geometry, Geometry::Raid0);
                assert_eq!(legs, &vec![Input::Output("extent/cluster-1/extent_sv3_1".to_string())]);
                assert_eq!(*stripe_depth, Some(StripeDepth::Kb4));
            }
            other => panic!("unexpected spec {:?}", other),
        }
    }

    #[test]
    fn test_metro_plan_shape() {
        let req = request(2).with_metro(MetroTarget {
            cluster: "cluster-2".to_string(),
            storage_volumes: vec!["tv1".to_string(), "tv2".to_string()],
            rule_set: Some("cluster-1-detaches".to_string()),
            sync: true,
        });
        let plan = plan_provision(&req).unwrap();
        let kinds: Vec<ResourceKind> = plan.stages.iter().map(|s| s.kind).collect();
        // no initiators requested, so no initiator stage
        assert_eq!(
            kinds,
            vec![
                ResourceKind::StorageVolume,
                ResourceKind::Extent,
                ResourceKind::Device,
                ResourceKind::DistributedDevice,
                ResourceKind::DistributedVirtualVolume,
                ResourceKind::StorageView,
            ]
        );

        let names: Vec<String> = plan
            .operations()
            .filter(|op| op.reference.kind.is_device_class())
            .map(|op| op.reference.name.clone())
            .collect();
        assert_eq!(names, vec!["esx_dev_1", "esx_rdev_1", "esx_dd_1"]);

        let vv = plan
            .operations()
            .find(|op| op.reference.kind.is_volume_class())
            .unwrap();
        assert_eq!(
            vv.reference,
            ResourceRef::distributed_virtual_volume("esx_dd_1_vol")
        );
    }

    #[test]
    fn test_metro_unequal_groups_rejected() {
        let req = request(4).with_metro(MetroTarget {
            cluster: "cluster-2".to_string(),
            storage_volumes: vec!["tv1".to_string()],
            rule_set: None,
            sync: false,
        });
        assert!(matches!(
            plan_provision(&req),
            Err(VplexError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_names_rejected_before_planning() {
        let mut req = request(2);
        req.storage_view = "bad view".to_string();
        assert!(plan_provision(&req).is_err());

        let mut req = request(2);
        req.storage_view = "v".repeat(60);
        assert!(plan_provision(&req).is_err());

        let mut req = request(2);
        req.ports.clear();
        assert!(plan_provision(&req).is_err());

        let mut req = request(2);
        req.storage_volumes.push("sv1".to_string());
        assert!(plan_provision(&req).is_err());
    }

    #[test]
    fn test_summary_for_dry_run() {
        let req = request(4).with_initiators(vec!["host1_hba0=10000000c9a1b2c3".parse().unwrap()]);
        let summary = plan_provision(&req).unwrap().summary();
        assert_eq!(summary.claim, 4);
        // 4 extents, 2 devices, 2 virtual volumes, 1 initiator, 1 view
        assert_eq!(summary.create, 10);
        assert_eq!(summary.delete, 0);
    }

    #[test]
    fn test_initiator_request_parsing() {
        let plain: InitiatorRequest = "h1=10000000c9a1b2c3".parse().unwrap();
        assert_eq!(plain.host_type, HostType::Default);
        let typed: InitiatorRequest = "h1=10000000c9a1b2c3:hpux".parse().unwrap();
        assert_eq!(typed.host_type, HostType::Hpux);
        assert_eq!(typed.port_wwn, "10000000c9a1b2c3");
        assert!("h1".parse::<InitiatorRequest>().is_err());
    }

    #[test]
    fn test_teardown_verbs() {
        let op = Operation::absent(ResourceRef::initiator("cluster-1", "h1"));
        assert_eq!(op.verb(), Verb::Unregister);
    }
}
