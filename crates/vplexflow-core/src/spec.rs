//! Desired parameters per resource kind

use crate::model::{
    ClaimState, Geometry, HostType, ResourceDetails, ResourceKind, ResourceRef, StripeDepth,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a resource should look like once it is present
///
/// Generic over the reference type so a plan can carry unresolved
/// bindings and resolve them into [`ResourceRef`]s at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec<R = ResourceRef> {
    StorageVolume {
        claim: bool,
    },
    Extent {
        storage_volume: R,
    },
    Device {
        geometry: Geometry,
        legs: Vec<R>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stripe_depth: Option<StripeDepth>,
    },
    DistributedDevice {
        source: R,
        target: R,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rule_set: Option<String>,
        #[serde(default)]
        sync: bool,
    },
    VirtualVolume {
        supporting_device: R,
        #[serde(default)]
        thin: bool,
    },
    Initiator {
        port_wwn: String,
        #[serde(default)]
        host_type: HostType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iscsi_name: Option<String>,
    },
    StorageView {
        ports: Vec<R>,
        initiators: Vec<R>,
        virtual_volumes: Vec<R>,
    },
}

impl<R> ResourceSpec<R> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::StorageVolume { .. } => ResourceKind::StorageVolume,
            ResourceSpec::Extent { .. } => ResourceKind::Extent,
            ResourceSpec::Device { .. } => ResourceKind::Device,
            ResourceSpec::DistributedDevice { .. } => ResourceKind::DistributedDevice,
            ResourceSpec::VirtualVolume { .. } => ResourceKind::VirtualVolume,
            ResourceSpec::Initiator { .. } => ResourceKind::Initiator,
            ResourceSpec::StorageView { .. } => ResourceKind::StorageView,
        }
    }

    /// Whether this spec can describe an entity of `kind`
    ///
    /// Local and distributed virtual volumes share one spec.
    pub fn applies_to(&self, kind: ResourceKind) -> bool {
        match self {
            ResourceSpec::VirtualVolume { .. } => kind.is_volume_class(),
            other => other.kind() == kind,
        }
    }

    /// Every reference this spec points at
    pub fn references(&self) -> Vec<&R> {
        match self {
            ResourceSpec::StorageVolume { .. } | ResourceSpec::Initiator { .. } => Vec::new(),
            ResourceSpec::Extent { storage_volume } => vec![storage_volume],
            ResourceSpec::Device { legs, .. } => legs.iter().collect(),
            ResourceSpec::DistributedDevice { source, target, .. } => vec![source, target],
            ResourceSpec::VirtualVolume {
                supporting_device, ..
            } => vec![supporting_device],
            ResourceSpec::StorageView {
                ports,
                initiators,
                virtual_volumes,
            } => ports
                .iter()
                .chain(initiators.iter())
                .chain(virtual_volumes.iter())
                .collect(),
        }
    }

    /// Rewrite every reference, failing on the first one `f` rejects
    pub fn try_map_refs<S, E>(
        &self,
        mut f: impl FnMut(&R) -> Result<S, E>,
    ) -> Result<ResourceSpec<S>, E> {
        let spec = match self {
            ResourceSpec::StorageVolume { claim } => ResourceSpec::StorageVolume { claim: *claim },
            ResourceSpec::Extent { storage_volume } => ResourceSpec::Extent {
                storage_volume: f(storage_volume)?,
            },
            ResourceSpec::Device {
                geometry,
                legs,
                stripe_depth,
            } => ResourceSpec::Device {
                geometry: *geometry,
                legs: legs.iter().map(&mut f).collect::<Result<_, _>>()?,
                stripe_depth: *stripe_depth,
            },
            ResourceSpec::DistributedDevice {
                source,
                target,
                rule_set,
                sync,
            } => ResourceSpec::DistributedDevice {
                source: f(source)?,
                target: f(target)?,
                rule_set: rule_set.clone(),
                sync: *sync,
            },
            ResourceSpec::VirtualVolume {
                supporting_device,
                thin,
            } => ResourceSpec::VirtualVolume {
                supporting_device: f(supporting_device)?,
                thin: *thin,
            },
            ResourceSpec::Initiator {
                port_wwn,
                host_type,
                iscsi_name,
            } => ResourceSpec::Initiator {
                port_wwn: port_wwn.clone(),
                host_type: *host_type,
                iscsi_name: iscsi_name.clone(),
            },
            ResourceSpec::StorageView {
                ports,
                initiators,
                virtual_volumes,
            } => ResourceSpec::StorageView {
                ports: ports.iter().map(&mut f).collect::<Result<_, _>>()?,
                initiators: initiators.iter().map(&mut f).collect::<Result<_, _>>()?,
                virtual_volumes: virtual_volumes
                    .iter()
                    .map(&mut f)
                    .collect::<Result<_, _>>()?,
            },
        };
        Ok(spec)
    }

    /// Storage volume claim and storage view membership can be changed
    /// without recreating the resource
    pub fn updatable_in_place(&self) -> bool {
        matches!(
            self,
            ResourceSpec::StorageVolume { .. } | ResourceSpec::StorageView { .. }
        )
    }
}

impl ResourceSpec<ResourceRef> {
    /// Describe how `current` differs from this spec, if it does
    pub fn mismatch(&self, current: &ResourceDetails) -> Option<String> {
        match self {
            ResourceSpec::StorageVolume { claim } => {
                let state = current.claim_state.unwrap_or(ClaimState::Unclaimed);
                match (claim, state.is_claimed()) {
                    (true, false) => Some("storage volume is unclaimed".to_string()),
                    (false, true) => Some(format!("storage volume is {}", state)),
                    _ => None,
                }
            }
            ResourceSpec::Extent { storage_volume } => {
                let actual = ref_set(current.children_of_kind(ResourceKind::StorageVolume));
                (actual != BTreeSet::from([storage_volume])).then(|| {
                    format!(
                        "extent is carved from {}, requested {}",
                        describe(&actual),
                        storage_volume
                    )
                })
            }
            ResourceSpec::Device {
                geometry,
                legs,
                stripe_depth,
            } => {
                let actual_geometry = current.get_attribute::<Geometry>("geometry");
                if actual_geometry != Some(*geometry) {
                    return Some(format!(
                        "device geometry is {}, requested {}",
                        actual_geometry.map(|g| g.to_string()).unwrap_or_default(),
                        geometry
                    ));
                }
                let actual = ref_set(current.children_of_kind(ResourceKind::Extent));
                if actual != ref_set(legs.iter()) {
                    return Some(format!(
                        "device legs are {}, requested {}",
                        describe(&actual),
                        describe(&ref_set(legs.iter()))
                    ));
                }
                if let (Some(depth), Some(blocks)) =
                    (stripe_depth, current.get_attribute::<u32>("stripe_depth"))
                {
                    if depth.blocks() != blocks {
                        return Some(format!(
                            "stripe depth is {} blocks, requested {}",
                            blocks,
                            depth.blocks()
                        ));
                    }
                }
                None
            }
            ResourceSpec::DistributedDevice {
                source,
                target,
                rule_set,
                ..
            } => {
                let actual = ref_set(current.children_of_kind(ResourceKind::Device));
                if actual != BTreeSet::from([source, target]) {
                    return Some(format!(
                        "distributed device legs are {}, requested {} and {}",
                        describe(&actual),
                        source,
                        target
                    ));
                }
                match (rule_set, current.get_attribute::<String>("rule_set_name")) {
                    (Some(wanted), Some(actual)) if *wanted != actual => Some(format!(
                        "rule set is {}, requested {}",
                        actual, wanted
                    )),
                    _ => None,
                }
            }
            ResourceSpec::VirtualVolume {
                supporting_device,
                thin,
            } => {
                let actual: BTreeSet<&ResourceRef> = current
                    .children
                    .iter()
                    .filter(|c| c.kind.is_device_class())
                    .collect();
                if actual != BTreeSet::from([supporting_device]) {
                    return Some(format!(
                        "virtual volume is supported by {}, requested {}",
                        describe(&actual),
                        supporting_device
                    ));
                }
                let actual_thin = current.get_attribute::<bool>("thin").unwrap_or(false);
                (actual_thin != *thin)
                    .then(|| format!("thin is {}, requested {}", actual_thin, thin))
            }
            ResourceSpec::Initiator { port_wwn, .. } => {
                let actual = current
                    .get_attribute::<String>("port_wwn")
                    .unwrap_or_default();
                (normalize_wwn(&actual) != normalize_wwn(port_wwn)).then(|| {
                    format!("initiator port WWN is {}, requested {}", actual, port_wwn)
                })
            }
            ResourceSpec::StorageView {
                ports,
                initiators,
                virtual_volumes,
            } => {
                let members = [
                    ("ports", ref_set(current.children_of_kind(ResourceKind::Port)), ports),
                    (
                        "initiators",
                        ref_set(current.children_of_kind(ResourceKind::Initiator)),
                        initiators,
                    ),
                    ("virtual volumes", ref_set(current.volumes()), virtual_volumes),
                ];
                for (label, actual, wanted) in members {
                    let wanted = ref_set(wanted.iter());
                    if actual != wanted {
                        return Some(format!(
                            "storage view {} are {}, requested {}",
                            label,
                            describe(&actual),
                            describe(&wanted)
                        ));
                    }
                }
                None
            }
        }
    }

    pub fn is_satisfied_by(&self, current: &ResourceDetails) -> bool {
        self.mismatch(current).is_none()
    }
}

fn ref_set<'a>(refs: impl Iterator<Item = &'a ResourceRef>) -> BTreeSet<&'a ResourceRef> {
    refs.collect()
}

fn describe(refs: &BTreeSet<&ResourceRef>) -> String {
    if refs.is_empty() {
        return "[]".to_string();
    }
    let names: Vec<String> = refs.iter().map(|r| r.to_string()).collect();
    format!("[{}]", names.join(", "))
}

fn normalize_wwn(wwn: &str) -> String {
    wwn.trim_start_matches("0x")
        .replace(':', "")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claimed_and_used_satisfy_claim() {
        let spec = ResourceSpec::StorageVolume { claim: true };
        let sv = ResourceRef::storage_volume("cluster-1", "sv1");

        let claimed = ResourceDetails::new(sv.clone()).with_claim_state(ClaimState::Claimed);
        let used = ResourceDetails::new(sv.clone()).with_claim_state(ClaimState::Used);
        let unclaimed = ResourceDetails::new(sv).with_claim_state(ClaimState::Unclaimed);

        assert!(spec.is_satisfied_by(&claimed));
        assert!(spec.is_satisfied_by(&used));
        assert!(!spec.is_satisfied_by(&unclaimed));
    }

    #[test]
    fn test_device_legs_compared_as_set() {
        let e1 = ResourceRef::extent("cluster-1", "extent_sv1_1");
        let e2 = ResourceRef::extent("cluster-1", "extent_sv2_1");
        let spec = ResourceSpec::Device {
            geometry: Geometry::Raid1,
            legs: vec![e1.clone(), e2.clone()],
            stripe_depth: None,
        };
        let current = ResourceDetails::new(ResourceRef::device("cluster-1", "v_dev_1"))
            .with_children(vec![e2, e1.clone()])
            .with_attribute("geometry", serde_json::json!("raid-1"));
        assert!(spec.is_satisfied_by(&current));

        let single = ResourceDetails::new(ResourceRef::device("cluster-1", "v_dev_1"))
            .with_children(vec![e1])
            .with_attribute("geometry", serde_json::json!("raid-1"));
        let reason = spec.mismatch(&single).unwrap();
        assert!(reason.contains("legs"));
    }

    #[test]
    fn test_geometry_mismatch_reported() {
        let e1 = ResourceRef::extent("cluster-1", "extent_sv1_1");
        let spec = ResourceSpec::Device {
            geometry: Geometry::Raid0,
            legs: vec![e1.clone()],
            stripe_depth: None,
        };
        let current = ResourceDetails::new(ResourceRef::device("cluster-1", "v_dev_1"))
            .with_children(vec![e1])
            .with_attribute("geometry", serde_json::json!("raid-1"));
        assert!(spec.mismatch(&current).unwrap().contains("geometry"));
    }

    #[test]
    fn test_try_map_refs_propagates_failure() {
        let spec: ResourceSpec<&str> = ResourceSpec::StorageView {
            ports: vec!["p1"],
            initiators: vec![],
            virtual_volumes: vec!["vol1", "missing"],
        };
        let mapped = spec.try_map_refs(|name| {
            if *name == "missing" {
                Err(format!("unbound {}", name))
            } else {
                Ok(name.len())
            }
        });
        assert_eq!(mapped.unwrap_err(), "unbound missing");

        let ok = ResourceSpec::Extent { storage_volume: "sv1" }.try_map_refs(|n| {
            Ok::<_, String>(ResourceRef::storage_volume("cluster-1", *n))
        });
        assert_eq!(
            ok.unwrap().references(),
            vec![&ResourceRef::storage_volume("cluster-1", "sv1")]
        );
    }

    #[test]
    fn test_view_membership_counts_distributed_volumes() {
        let port = ResourceRef::port("cluster-1", "P0-FC00");
        let dvv = ResourceRef::distributed_virtual_volume("esx_dd_1_vol");
        let spec = ResourceSpec::StorageView {
            ports: vec![port.clone()],
            initiators: vec![],
            virtual_volumes: vec![dvv.clone()],
        };
        let current = ResourceDetails::new(ResourceRef::storage_view("cluster-1", "esx"))
            .with_children(vec![port.clone(), dvv]);
        assert!(spec.is_satisfied_by(&current));

        let empty = ResourceDetails::new(ResourceRef::storage_view("cluster-1", "esx"))
            .with_children(vec![port]);
        assert!(spec.mismatch(&empty).unwrap().contains("virtual volumes"));
    }

    #[test]
    fn test_volume_spec_applies_to_both_volume_kinds() {
        let spec = ResourceSpec::VirtualVolume {
            supporting_device: ResourceRef::distributed_device("esx_dd_1"),
            thin: false,
        };
        assert!(spec.applies_to(ResourceKind::VirtualVolume));
        assert!(spec.applies_to(ResourceKind::DistributedVirtualVolume));
        assert!(!spec.applies_to(ResourceKind::Device));
        assert!(ResourceSpec::<ResourceRef>::StorageVolume { claim: true }
            .applies_to(ResourceKind::StorageVolume));
    }

    #[test]
    fn test_wwn_comparison_ignores_format() {
        let spec = ResourceSpec::Initiator {
            port_wwn: "0x10000000C9A1B2C3".to_string(),
            host_type: HostType::Default,
            iscsi_name: None,
        };
        let current = ResourceDetails::new(ResourceRef::initiator("cluster-1", "host1_hba0"))
            .with_attribute("port_wwn", serde_json::json!("10:00:00:00:c9:a1:b2:c3"));
        assert!(spec.is_satisfied_by(&current));
    }
}
