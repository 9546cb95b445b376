//! In-memory storage array
//!
//! Enforces the reference rules of a real array (claim before carve, no
//! delete while referenced, no export while rebuilding) and simulates
//! device rebuilds that settle after a number of reads. Every call is
//! recorded so tests can assert on ordering.

use crate::client::ResourceClient;
use crate::error::{Result, VplexError};
use crate::filter::FilterSet;
use crate::model::{
    ClaimState, Geometry, RebuildStatus, ResourceDetails, ResourceKind, ResourceMap, ResourceRef,
};
use crate::spec::ResourceSpec;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallVerb {
    Clusters,
    Get,
    List,
    Create,
    Update,
    Delete,
    Map,
}

impl CallVerb {
    pub fn is_mutation(&self) -> bool {
        matches!(self, CallVerb::Create | CallVerb::Update | CallVerb::Delete)
    }
}

/// One recorded client call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub verb: CallVerb,
    /// `None` for cluster and list queries
    pub reference: Option<ResourceRef>,
}

#[derive(Debug)]
struct Entry {
    details: ResourceDetails,
    /// Reads left before an in-progress rebuild reports done
    rebuild_polls: u32,
}

#[derive(Debug, Default)]
struct ArrayState {
    clusters: Vec<String>,
    resources: BTreeMap<ResourceRef, Entry>,
    failing: BTreeSet<ResourceRef>,
    calls: Vec<Call>,
    rebuild_polls: u32,
}

impl ArrayState {
    fn record(&mut self, verb: CallVerb, reference: Option<&ResourceRef>) {
        self.calls.push(Call {
            verb,
            reference: reference.cloned(),
        });
    }

    fn check_injected(&self, reference: &ResourceRef) -> Result<()> {
        if self.failing.contains(reference) {
            return Err(VplexError::Api {
                status: 500,
                message: format!("injected failure on {}", reference),
            });
        }
        Ok(())
    }

    fn check_cluster(&self, reference: &ResourceRef) -> Result<()> {
        match reference.cluster() {
            Some(cluster) if !self.clusters.iter().any(|c| c == cluster) => Err(
                VplexError::not_found(format!("cluster '{}'", cluster)),
            ),
            _ => Ok(()),
        }
    }

    fn details(&self, reference: &ResourceRef) -> Result<&ResourceDetails> {
        self.resources
            .get(reference)
            .map(|e| &e.details)
            .ok_or_else(|| VplexError::not_found(reference))
    }

    fn details_mut(&mut self, reference: &ResourceRef) -> Result<&mut ResourceDetails> {
        self.resources
            .get_mut(reference)
            .map(|e| &mut e.details)
            .ok_or_else(|| VplexError::not_found(reference))
    }

    fn require_unused(&self, reference: &ResourceRef) -> Result<&ResourceDetails> {
        let details = self.details(reference)?;
        if let Some(user) = details.used_by.first() {
            return Err(VplexError::conflict(
                reference,
                format!("already in use by {}", user),
            ));
        }
        Ok(details)
    }

    fn link(&mut self, child: &ResourceRef, parent: &ResourceRef) -> Result<()> {
        let details = self.details_mut(child)?;
        if !details.used_by.contains(parent) {
            details.used_by.push(parent.clone());
        }
        Ok(())
    }

    fn unlink(&mut self, child: &ResourceRef, parent: &ResourceRef) {
        if let Some(entry) = self.resources.get_mut(child) {
            entry.details.used_by.retain(|r| r != parent);
        }
    }

    fn build(&self, reference: &ResourceRef, spec: &ResourceSpec) -> Result<ResourceDetails> {
        let mut details = ResourceDetails::new(reference.clone());
        match spec {
            ResourceSpec::StorageVolume { .. } => {
                return Err(VplexError::validation(format!(
                    "storage volume {} can not be created, it must be discovered from the backend array",
                    reference
                )));
            }
            ResourceSpec::Extent { storage_volume } => {
                let volume = self.details(storage_volume)?;
                match volume.claim_state {
                    Some(ClaimState::Claimed) => {}
                    Some(ClaimState::Used) => {
                        return Err(VplexError::conflict(
                            storage_volume,
                            "storage volume already carries an extent",
                        ));
                    }
                    _ => {
                        return Err(VplexError::conflict(
                            storage_volume,
                            "storage volume must be claimed before an extent is created",
                        ));
                    }
                }
                details.capacity = volume.capacity;
                details.children = vec![storage_volume.clone()];
            }
            ResourceSpec::Device {
                geometry,
                legs,
                stripe_depth,
            } => {
                if legs.is_empty() {
                    return Err(VplexError::validation("a device needs at least one extent"));
                }
                let mut capacities = Vec::with_capacity(legs.len());
                for leg in legs {
                    if leg.kind != ResourceKind::Extent || leg.cluster != reference.cluster {
                        return Err(VplexError::validation(format!(
                            "{} is not an extent on the device's cluster",
                            leg
                        )));
                    }
                    capacities.push(self.require_unused(leg)?.capacity.unwrap_or(0));
                }
                details.capacity = Some(match geometry {
                    Geometry::Raid1 => capacities.iter().copied().min().unwrap_or(0),
                    Geometry::Raid0 | Geometry::RaidC => capacities.iter().sum(),
                });
                details.children = legs.clone();
                details.set_attribute("geometry", serde_json::json!(geometry.as_str()));
                if let Some(depth) = stripe_depth {
                    details.set_attribute("stripe_depth", serde_json::json!(depth.blocks()));
                }
                details.rebuild_status = Some(self.initial_rebuild_status());
            }
            ResourceSpec::DistributedDevice {
                source,
                target,
                rule_set,
                sync,
            } => {
                if source.cluster.is_none() || source.cluster == target.cluster {
                    return Err(VplexError::validation(
                        "distributed device legs must be devices on two different clusters",
                    ));
                }
                let source_capacity = self.require_unused(source)?.capacity;
                let target_capacity = self.require_unused(target)?.capacity;
                details.capacity = source_capacity.min(target_capacity);
                details.children = vec![source.clone(), target.clone()];
                if let Some(rule_set) = rule_set {
                    details.set_attribute("rule_set_name", serde_json::json!(rule_set));
                }
                details.set_attribute("sync", serde_json::json!(sync));
                details.rebuild_status = Some(self.initial_rebuild_status());
            }
            ResourceSpec::VirtualVolume {
                supporting_device,
                thin,
            } => {
                if (supporting_device.kind == ResourceKind::DistributedDevice)
                    != (reference.kind == ResourceKind::DistributedVirtualVolume)
                {
                    return Err(VplexError::validation(format!(
                        "{} can not be built on {}",
                        reference, supporting_device
                    )));
                }
                let device = self.require_unused(supporting_device)?;
                if device
                    .rebuild_status
                    .is_some_and(|s| s.is_in_progress())
                {
                    return Err(VplexError::conflict(
                        supporting_device,
                        "supporting device is still rebuilding",
                    ));
                }
                details.capacity = device.capacity;
                details.children = vec![supporting_device.clone()];
                details.set_attribute("thin", serde_json::json!(thin));
            }
            ResourceSpec::Initiator {
                port_wwn,
                host_type,
                iscsi_name,
            } => {
                let duplicate = self.resources.values().find(|e| {
                    e.details.reference.kind == ResourceKind::Initiator
                        && e.details.reference.cluster == reference.cluster
                        && e.details.get_attribute::<String>("port_wwn").as_deref()
                            == Some(port_wwn.as_str())
                });
                if let Some(existing) = duplicate {
                    return Err(VplexError::conflict(
                        reference,
                        format!(
                            "port WWN {} is already registered as {}",
                            port_wwn, existing.details.reference.name
                        ),
                    ));
                }
                details.set_attribute("port_wwn", serde_json::json!(port_wwn));
                details.set_attribute("host_type", serde_json::json!(host_type.as_str()));
                if let Some(iscsi) = iscsi_name {
                    details.set_attribute("iscsi_name", serde_json::json!(iscsi));
                }
            }
            ResourceSpec::StorageView {
                ports,
                initiators,
                virtual_volumes,
            } => {
                for member in ports.iter().chain(initiators).chain(virtual_volumes) {
                    self.details(member)?;
                }
                details.children = ports
                    .iter()
                    .chain(initiators)
                    .chain(virtual_volumes)
                    .cloned()
                    .collect();
            }
        }
        Ok(details)
    }

    fn initial_rebuild_status(&self) -> RebuildStatus {
        if self.rebuild_polls > 0 {
            RebuildStatus::Rebuilding
        } else {
            RebuildStatus::Done
        }
    }
}

/// Storage array held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryArray {
    state: Mutex<ArrayState>,
}

impl MemoryArray {
    pub fn new<S: AsRef<str>>(clusters: &[S]) -> Self {
        Self {
            state: Mutex::new(ArrayState {
                clusters: clusters.iter().map(|c| c.as_ref().to_string()).collect(),
                ..ArrayState::default()
            }),
        }
    }

    /// Devices created from now on report `rebuilding` for `polls` reads
    pub fn with_rebuild_polls(mut self, polls: u32) -> Self {
        self.state.get_mut().rebuild_polls = polls;
        self
    }

    /// Seed an unclaimed storage volume
    pub fn with_storage_volume(
        mut self,
        cluster: &str,
        name: &str,
        capacity: u64,
    ) -> Self {
        let reference = ResourceRef::storage_volume(cluster, name);
        let details = ResourceDetails::new(reference.clone())
            .with_claim_state(ClaimState::Unclaimed)
            .with_capacity(capacity);
        self.insert(details);
        self
    }

    /// Seed a front-end port
    pub fn with_port(mut self, cluster: &str, name: &str) -> Self {
        let details = ResourceDetails::new(ResourceRef::port(cluster, name))
            .with_attribute("export_status", serde_json::json!("ok"));
        self.insert(details);
        self
    }

    fn insert(&mut self, details: ResourceDetails) {
        self.state.get_mut().resources.insert(
            details.reference.clone(),
            Entry {
                details,
                rebuild_polls: 0,
            },
        );
    }

    /// Place a resource on the array as if it was made out of band
    ///
    /// Its children must already exist and get linked back to it.
    pub async fn seed(&self, details: ResourceDetails) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.resources.contains_key(&details.reference) {
            return Err(VplexError::conflict(&details.reference, "already exists"));
        }
        for child in &details.children {
            state.link(child, &details.reference)?;
        }
        state.resources.insert(
            details.reference.clone(),
            Entry {
                details,
                rebuild_polls: 0,
            },
        );
        Ok(())
    }

    /// Force a rebuild status; it sticks until changed again
    pub async fn set_rebuild_status(&self, reference: &ResourceRef, status: RebuildStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let entry = state
            .resources
            .get_mut(reference)
            .ok_or_else(|| VplexError::not_found(reference))?;
        entry.details.rebuild_status = Some(status);
        entry.rebuild_polls = 0;
        Ok(())
    }

    /// Make every mutation of `reference` fail with a 500 until cleared
    pub async fn inject_failure(&self, reference: ResourceRef) {
        self.state.lock().await.failing.insert(reference);
    }

    pub async fn clear_failure(&self, reference: &ResourceRef) {
        self.state.lock().await.failing.remove(reference);
    }

    /// Current state of a resource without recording a call
    pub async fn peek(&self, reference: &ResourceRef) -> Option<ResourceDetails> {
        let state = self.state.lock().await;
        state.resources.get(reference).map(|e| e.details.clone())
    }

    /// Every resource currently on the array
    pub async fn inventory(&self) -> Vec<ResourceRef> {
        self.state.lock().await.resources.keys().cloned().collect()
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    pub async fn mutations(&self) -> Vec<Call> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.verb.is_mutation())
            .cloned()
            .collect()
    }

    /// Number of `get` calls issued for `reference`
    pub async fn polls(&self, reference: &ResourceRef) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.verb == CallVerb::Get && c.reference.as_ref() == Some(reference))
            .count()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }
}

#[async_trait]
impl ResourceClient for MemoryArray {
    fn name(&self) -> &str {
        "memory"
    }

    async fn clusters(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        state.record(CallVerb::Clusters, None);
        Ok(state.clusters.clone())
    }

    async fn get(&self, reference: &ResourceRef) -> Result<ResourceDetails> {
        let mut state = self.state.lock().await;
        state.record(CallVerb::Get, Some(reference));
        let entry = state
            .resources
            .get_mut(reference)
            .ok_or_else(|| VplexError::not_found(reference))?;
        if entry.rebuild_polls > 0 {
            entry.rebuild_polls -= 1;
            if entry.rebuild_polls == 0 {
                entry.details.rebuild_status = Some(RebuildStatus::Done);
            }
        }
        Ok(entry.details.clone())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        cluster: Option<&str>,
        filters: &FilterSet,
    ) -> Result<Vec<ResourceDetails>> {
        let mut state = self.state.lock().await;
        state.record(CallVerb::List, None);
        let items = state
            .resources
            .values()
            .map(|e| &e.details)
            .filter(|d| d.reference.kind == kind)
            .filter(|d| !kind.is_clustered() || cluster.is_none() || d.reference.cluster() == cluster)
            .cloned()
            .collect();
        Ok(filters.apply(items))
    }

    async fn create(&self, reference: &ResourceRef, spec: &ResourceSpec) -> Result<ResourceDetails> {
        let mut state = self.state.lock().await;
        state.record(CallVerb::Create, Some(reference));
        state.check_injected(reference)?;
        state.check_cluster(reference)?;
        if !spec.applies_to(reference.kind) {
            return Err(VplexError::validation(format!(
                "{} spec can not create {}",
                spec.kind(),
                reference
            )));
        }
        if state.resources.contains_key(reference) {
            return Err(VplexError::conflict(reference, "already exists"));
        }

        let details = state.build(reference, spec)?;
        for child in &details.children {
            state.link(child, reference)?;
        }
        if let ResourceSpec::Extent { storage_volume } = spec {
            state.details_mut(storage_volume)?.claim_state = Some(ClaimState::Used);
        }
        let rebuild_polls = if reference.kind.is_device_class() {
            state.rebuild_polls
        } else {
            0
        };
        debug!(resource = %reference, "memory array: created");
        state.resources.insert(
            reference.clone(),
            Entry {
                details: details.clone(),
                rebuild_polls,
            },
        );
        Ok(details)
    }

    async fn update(&self, reference: &ResourceRef, spec: &ResourceSpec) -> Result<ResourceDetails> {
        let mut state = self.state.lock().await;
        state.record(CallVerb::Update, Some(reference));
        state.check_injected(reference)?;
        let current = state.details(reference)?.clone();

        match spec {
            ResourceSpec::StorageVolume { claim } => {
                let next = match (claim, current.claim_state) {
                    (true, Some(s)) if s.is_claimed() => s,
                    (true, _) => ClaimState::Claimed,
                    (false, Some(ClaimState::Used)) => {
                        return Err(VplexError::conflict(
                            reference,
                            "storage volume carries an extent and can not be unclaimed",
                        ));
                    }
                    (false, _) => ClaimState::Unclaimed,
                };
                state.details_mut(reference)?.claim_state = Some(next);
            }
            ResourceSpec::StorageView {
                ports,
                initiators,
                virtual_volumes,
            } => {
                let wanted: Vec<ResourceRef> = ports
                    .iter()
                    .chain(initiators)
                    .chain(virtual_volumes)
                    .cloned()
                    .collect();
                for member in &wanted {
                    state.details(member)?;
                }
                for old in current.children.iter().filter(|c| !wanted.contains(c)) {
                    state.unlink(old, reference);
                }
                for member in &wanted {
                    state.link(member, reference)?;
                }
                state.details_mut(reference)?.children = wanted;
            }
            other => {
                return Err(VplexError::validation(format!(
                    "{} can not be modified in place",
                    other.kind()
                )));
            }
        }
        debug!(resource = %reference, "memory array: updated");
        state.details(reference).cloned()
    }

    async fn delete(&self, reference: &ResourceRef) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(CallVerb::Delete, Some(reference));
        state.check_injected(reference)?;
        let current = state.details(reference)?.clone();

        if reference.kind == ResourceKind::StorageVolume {
            return Err(VplexError::validation(format!(
                "storage volume {} can not be deleted, unclaim it instead",
                reference
            )));
        }
        if let Some(user) = current.used_by.first() {
            return Err(VplexError::conflict(
                reference,
                format!("still referenced by {}", user),
            ));
        }
        if current.rebuild_status.is_some_and(|s| s.is_in_progress()) {
            return Err(VplexError::conflict(
                reference,
                "device is rebuilding and can not be deleted",
            ));
        }

        for child in &current.children {
            state.unlink(child, reference);
            if reference.kind == ResourceKind::Extent && child.kind == ResourceKind::StorageVolume {
                state.details_mut(child)?.claim_state = Some(ClaimState::Claimed);
            }
        }
        state.resources.remove(reference);
        debug!(resource = %reference, "memory array: deleted");
        Ok(())
    }

    async fn map(&self, reference: &ResourceRef) -> Result<ResourceMap> {
        let mut state = self.state.lock().await;
        state.record(CallVerb::Map, Some(reference));
        let details = state.details(reference)?;
        Ok(ResourceMap {
            parents: details.used_by.clone(),
            children: details.children.clone(),
        })
    }
}
