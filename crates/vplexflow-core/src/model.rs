//! Resource model for VPLEX entities
//!
//! A [`ResourceRef`] names an entity and renders to its `/vplex/v2` URI.
//! [`ResourceDetails`] is what a client hands back after reading one.

use crate::error::{Result, VplexError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

pub const API_ROOT: &str = "/vplex/v2";

/// Longest name VPLEX accepts for user-named entities
pub const MAX_NAME_LEN: usize = 63;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][\w\-]*$").expect("static name pattern"));

/// Where entities of a kind live in the `/vplex/v2` tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// `/clusters/<cluster>/...`
    Cluster,
    /// `/distributed_storage/...`
    Distributed,
    /// Directly under the API root
    System,
}

/// Kind of VPLEX entity
///
/// The first nine kinds take part in provisioning and teardown; the rest
/// are only ever listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    StorageVolume,
    Extent,
    Device,
    DistributedDevice,
    VirtualVolume,
    DistributedVirtualVolume,
    Initiator,
    StorageView,
    Port,
    StorageArray,
    ConsistencyGroup,
    DistributedConsistencyGroup,
    ArrayManagementProvider,
    BackEndPort,
    DeviceMigration,
    ExtentMigration,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 16] = [
        ResourceKind::StorageVolume,
        ResourceKind::Extent,
        ResourceKind::Device,
        ResourceKind::DistributedDevice,
        ResourceKind::VirtualVolume,
        ResourceKind::DistributedVirtualVolume,
        ResourceKind::Initiator,
        ResourceKind::StorageView,
        ResourceKind::Port,
        ResourceKind::StorageArray,
        ResourceKind::ConsistencyGroup,
        ResourceKind::DistributedConsistencyGroup,
        ResourceKind::ArrayManagementProvider,
        ResourceKind::BackEndPort,
        ResourceKind::DeviceMigration,
        ResourceKind::ExtentMigration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::StorageVolume => "storage_volume",
            ResourceKind::Extent => "extent",
            ResourceKind::Device => "device",
            ResourceKind::DistributedDevice => "distributed_device",
            ResourceKind::VirtualVolume => "virtual_volume",
            ResourceKind::DistributedVirtualVolume => "distributed_virtual_volume",
            ResourceKind::Initiator => "initiator",
            ResourceKind::StorageView => "storage_view",
            ResourceKind::Port => "port",
            ResourceKind::StorageArray => "storage_array",
            ResourceKind::ConsistencyGroup => "consistency_group",
            ResourceKind::DistributedConsistencyGroup => "distributed_consistency_group",
            ResourceKind::ArrayManagementProvider => "array_management_provider",
            ResourceKind::BackEndPort => "back_end_port",
            ResourceKind::DeviceMigration => "device_migration",
            ResourceKind::ExtentMigration => "extent_migration",
        }
    }

    /// Path of the collection holding this kind, relative to its scope
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::StorageVolume => "storage_volumes",
            ResourceKind::Extent => "extents",
            ResourceKind::Device => "devices",
            ResourceKind::DistributedDevice => "distributed_devices",
            ResourceKind::VirtualVolume => "virtual_volumes",
            ResourceKind::DistributedVirtualVolume => "distributed_virtual_volumes",
            ResourceKind::Initiator => "exports/initiator_ports",
            ResourceKind::StorageView => "exports/storage_views",
            ResourceKind::Port => "exports/ports",
            ResourceKind::StorageArray => "storage_arrays",
            ResourceKind::ConsistencyGroup => "consistency_groups",
            ResourceKind::DistributedConsistencyGroup => "distributed_consistency_groups",
            ResourceKind::ArrayManagementProvider => "array_management_providers",
            ResourceKind::BackEndPort => "hardware/ports",
            ResourceKind::DeviceMigration => "data_migrations/device_migrations",
            ResourceKind::ExtentMigration => "data_migrations/extent_migrations",
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            ResourceKind::DistributedDevice
            | ResourceKind::DistributedVirtualVolume
            | ResourceKind::DistributedConsistencyGroup => Scope::Distributed,
            ResourceKind::BackEndPort
            | ResourceKind::DeviceMigration
            | ResourceKind::ExtentMigration => Scope::System,
            _ => Scope::Cluster,
        }
    }

    fn from_collection(scope: Scope, collection: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.scope() == scope && k.collection() == collection)
    }

    /// Whether entities of this kind live under a cluster
    pub fn is_clustered(&self) -> bool {
        self.scope() == Scope::Cluster
    }

    /// Devices and distributed devices rebuild asynchronously after creation
    pub fn is_device_class(&self) -> bool {
        matches!(
            self,
            ResourceKind::Device | ResourceKind::DistributedDevice
        )
    }

    /// Local and distributed virtual volumes, the things a view exports
    pub fn is_volume_class(&self) -> bool {
        matches!(
            self,
            ResourceKind::VirtualVolume | ResourceKind::DistributedVirtualVolume
        )
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = VplexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| VplexError::validation(format!("unknown resource kind '{}'", s)))
    }
}

/// Identity of a VPLEX entity, unique per (kind, cluster, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    /// `None` for distributed and system-wide kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    pub name: String,
}

impl ResourceRef {
    /// Reference to an entity that lives under `cluster`
    pub fn new(kind: ResourceKind, cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            cluster: Some(cluster.into()),
            name: name.into(),
        }
    }

    /// Reference to an entity that belongs to no single cluster
    pub fn unscoped(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            cluster: None,
            name: name.into(),
        }
    }

    pub fn distributed_device(name: impl Into<String>) -> Self {
        Self::unscoped(ResourceKind::DistributedDevice, name)
    }

    pub fn distributed_virtual_volume(name: impl Into<String>) -> Self {
        Self::unscoped(ResourceKind::DistributedVirtualVolume, name)
    }

    pub fn storage_volume(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ResourceKind::StorageVolume, cluster, name)
    }

    pub fn extent(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Extent, cluster, name)
    }

    pub fn device(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Device, cluster, name)
    }

    pub fn virtual_volume(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ResourceKind::VirtualVolume, cluster, name)
    }

    pub fn initiator(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Initiator, cluster, name)
    }

    pub fn storage_view(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ResourceKind::StorageView, cluster, name)
    }

    pub fn port(cluster: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Port, cluster, name)
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    /// Full REST URI, e.g. `/vplex/v2/clusters/cluster-1/devices/dev_1`
    pub fn uri(&self) -> String {
        let collection = self.kind.collection();
        match (self.kind.scope(), &self.cluster) {
            (Scope::Cluster, Some(cluster)) => format!(
                "{}/clusters/{}/{}/{}",
                API_ROOT, cluster, collection, self.name
            ),
            (Scope::Distributed, _) => format!(
                "{}/distributed_storage/{}/{}",
                API_ROOT, collection, self.name
            ),
            (Scope::System, _) | (Scope::Cluster, None) => {
                format!("{}/{}/{}", API_ROOT, collection, self.name)
            }
        }
    }

    /// Parse a REST URI back into a reference
    ///
    /// URIs of entities with no [`ResourceKind`] (logical units, directors,
    /// ...) yield `None`.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let path = match uri.split_once("/vplex/v2/") {
            Some((_, rest)) => rest,
            None => uri.trim_start_matches('/'),
        };
        let parts: Vec<&str> = path.split('/').collect();

        match parts.as_slice() {
            ["distributed_storage", collection, name] => {
                let kind = ResourceKind::from_collection(Scope::Distributed, collection)?;
                Some(Self::unscoped(kind, decode_name(name)))
            }
            ["clusters", cluster, "exports", collection, name] => {
                let collection = format!("exports/{}", collection);
                let kind = ResourceKind::from_collection(Scope::Cluster, &collection)?;
                Some(Self::new(kind, *cluster, decode_name(name)))
            }
            ["clusters", cluster, collection, name] => {
                let kind = ResourceKind::from_collection(Scope::Cluster, collection)?;
                Some(Self::new(kind, *cluster, decode_name(name)))
            }
            [group, collection, name] => {
                let collection = format!("{}/{}", group, collection);
                let kind = ResourceKind::from_collection(Scope::System, &collection)?;
                Some(Self::unscoped(kind, decode_name(name)))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.cluster {
            Some(cluster) => write!(f, "{}/{}/{}", self.kind, cluster, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

// Storage volume names carry VPD identifiers with escaped colons
fn decode_name(raw: &str) -> String {
    raw.replace("%3A", ":").replace("%3a", ":")
}

/// Claim state of a storage volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimState {
    Unclaimed,
    Claimed,
    /// Claimed and carrying an extent
    Used,
}

impl ClaimState {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimState::Claimed | ClaimState::Used)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimState::Unclaimed => "unclaimed",
            ClaimState::Claimed => "claimed",
            ClaimState::Used => "used",
        }
    }
}

impl std::fmt::Display for ClaimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimState {
    type Err = VplexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unclaimed" => Ok(ClaimState::Unclaimed),
            "claimed" => Ok(ClaimState::Claimed),
            "used" => Ok(ClaimState::Used),
            other => Err(VplexError::validation(format!(
                "unknown claim state '{}'",
                other
            ))),
        }
    }
}

/// Rebuild status of a device or distributed device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildStatus {
    #[serde(alias = "ready")]
    Done,
    Rebuilding,
    Queued,
    Degraded,
    Error,
    #[serde(other)]
    Unknown,
}

impl RebuildStatus {
    /// Dependents must not be built while this holds
    pub fn is_in_progress(&self) -> bool {
        matches!(self, RebuildStatus::Rebuilding | RebuildStatus::Queued)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RebuildStatus::Done => "done",
            RebuildStatus::Rebuilding => "rebuilding",
            RebuildStatus::Queued => "queued",
            RebuildStatus::Degraded => "degraded",
            RebuildStatus::Error => "error",
            RebuildStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RebuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RAID geometry of a local device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Geometry {
    #[serde(rename = "raid-0")]
    Raid0,
    #[serde(rename = "raid-1")]
    Raid1,
    #[serde(rename = "raid-c")]
    RaidC,
}

impl Geometry {
    pub fn as_str(&self) -> &'static str {
        match self {
            Geometry::Raid0 => "raid-0",
            Geometry::Raid1 => "raid-1",
            Geometry::RaidC => "raid-c",
        }
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Geometry {
    type Err = VplexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raid-0" => Ok(Geometry::Raid0),
            "raid-1" => Ok(Geometry::Raid1),
            "raid-c" => Ok(Geometry::RaidC),
            other => Err(VplexError::validation(format!(
                "unsupported geometry '{}', expected raid-0, raid-1 or raid-c",
                other
            ))),
        }
    }
}

/// Stripe depth of a raid-0 device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StripeDepth {
    #[serde(rename = "4KB")]
    Kb4,
    #[serde(rename = "8KB")]
    Kb8,
    #[serde(rename = "16KB")]
    Kb16,
    #[serde(rename = "32KB")]
    Kb32,
    #[serde(rename = "64KB")]
    Kb64,
    #[serde(rename = "128KB")]
    Kb128,
    #[serde(rename = "256KB")]
    Kb256,
    #[serde(rename = "512KB")]
    Kb512,
    #[serde(rename = "1MB")]
    Mb1,
}

impl StripeDepth {
    const TABLE: [(StripeDepth, &'static str, u32); 9] = [
        (StripeDepth::Kb4, "4KB", 1),
        (StripeDepth::Kb8, "8KB", 2),
        (StripeDepth::Kb16, "16KB", 4),
        (StripeDepth::Kb32, "32KB", 8),
        (StripeDepth::Kb64, "64KB", 16),
        (StripeDepth::Kb128, "128KB", 32),
        (StripeDepth::Kb256, "256KB", 64),
        (StripeDepth::Kb512, "512KB", 128),
        (StripeDepth::Mb1, "1MB", 256),
    ];

    /// Depth in 4KB blocks, the unit the management API expects
    pub fn blocks(&self) -> u32 {
        Self::TABLE
            .iter()
            .find(|(depth, _, _)| depth == self)
            .map(|(_, _, blocks)| *blocks)
            .unwrap_or(1)
    }
}

impl FromStr for StripeDepth {
    type Err = VplexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::TABLE
            .iter()
            .find(|(_, label, _)| *label == s)
            .map(|(depth, _, _)| *depth)
            .ok_or_else(|| {
                VplexError::validation(format!(
                    "unsupported stripe depth '{}', supported values are 4KB, 8KB, 16KB, 32KB, 64KB, 128KB, 256KB, 512KB, 1MB",
                    s
                ))
            })
    }
}

/// Host type recorded on an initiator port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostType {
    #[default]
    Default,
    Hpux,
    SunVcs,
    Aix,
    Recoverpoint,
}

impl HostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostType::Default => "default",
            HostType::Hpux => "hpux",
            HostType::SunVcs => "sun-vcs",
            HostType::Aix => "aix",
            HostType::Recoverpoint => "recoverpoint",
        }
    }
}

impl FromStr for HostType {
    type Err = VplexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(HostType::Default),
            "hpux" => Ok(HostType::Hpux),
            "sun-vcs" => Ok(HostType::SunVcs),
            "aix" => Ok(HostType::Aix),
            "recoverpoint" => Ok(HostType::Recoverpoint),
            other => Err(VplexError::validation(format!(
                "unknown host type '{}'",
                other
            ))),
        }
    }
}

/// Whether a resource should exist after an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Present,
    Absent,
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesiredState::Present => write!(f, "present"),
            DesiredState::Absent => write!(f, "absent"),
        }
    }
}

/// Current state of a resource as read from the array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDetails {
    pub reference: ResourceRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_state: Option<ClaimState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebuild_status: Option<RebuildStatus>,

    /// Capacity in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u64>,

    /// Resources this one is built from (legs, supporting device, members)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ResourceRef>,

    /// Resources that reference this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used_by: Vec<ResourceRef>,

    /// Per-kind extras (geometry, thin, port_wwn, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ResourceDetails {
    pub fn new(reference: ResourceRef) -> Self {
        Self {
            reference,
            claim_state: None,
            rebuild_status: None,
            capacity: None,
            children: Vec::new(),
            used_by: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_claim_state(mut self, state: ClaimState) -> Self {
        self.claim_state = Some(state);
        self
    }

    pub fn with_rebuild_status(mut self, status: RebuildStatus) -> Self {
        self.rebuild_status = Some(status);
        self
    }

    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_children(mut self, children: Vec<ResourceRef>) -> Self {
        self.children = children;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    /// Local and distributed virtual volumes among the children
    pub fn volumes(&self) -> impl Iterator<Item = &ResourceRef> {
        self.children.iter().filter(|c| c.kind.is_volume_class())
    }

    pub fn children_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceRef> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    /// Field lookup used by filters
    ///
    /// Typed fields take precedence over attributes with the same key.
    pub fn field(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "name" => Some(serde_json::json!(self.reference.name)),
            "cluster" => self.reference.cluster.as_ref().map(|c| serde_json::json!(c)),
            "use" => self.claim_state.map(|s| serde_json::json!(s.as_str())),
            "rebuild_status" => self.rebuild_status.map(|s| serde_json::json!(s.as_str())),
            "capacity" => self.capacity.map(|c| serde_json::json!(c)),
            _ => self.attributes.get(key).cloned(),
        }
    }
}

/// Parent/child neighbourhood of a resource, as returned by a map lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMap {
    pub parents: Vec<ResourceRef>,
    pub children: Vec<ResourceRef>,
}

/// Check a user-supplied entity name against VPLEX naming rules
pub fn validate_name(name: &str, field: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VplexError::validation(format!(
            "required {} can not be empty",
            field
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(VplexError::validation(format!(
            "the length of {} should not be more than {} characters",
            field, MAX_NAME_LEN
        )));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(VplexError::validation(format!(
            "{} '{}' should start with an alphabet or '_' and only alphanumeric characters and -_ are allowed",
            field, name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_round_trip() {
        let refs = [
            ResourceRef::storage_volume("cluster-1", "VPD83T3:6000"),
            ResourceRef::extent("cluster-1", "extent_sv1_1"),
            ResourceRef::device("cluster-2", "view_rdev_1"),
            ResourceRef::distributed_device("view_dd_1"),
            ResourceRef::distributed_virtual_volume("view_dd_1_vol"),
            ResourceRef::new(ResourceKind::StorageArray, "cluster-1", "EMC-SYMMETRIX-1"),
            ResourceRef::unscoped(ResourceKind::DistributedConsistencyGroup, "dcg1"),
            ResourceRef::unscoped(ResourceKind::DeviceMigration, "mig_1"),
            ResourceRef::storage_view("cluster-1", "esx_view"),
            ResourceRef::initiator("cluster-1", "host1_hba0"),
            ResourceRef::port("cluster-1", "P000000003CA00147-A0-FC00"),
        ];
        for r in refs {
            assert_eq!(ResourceRef::from_uri(&r.uri()), Some(r));
        }
    }

    #[test]
    fn test_from_uri_decodes_escaped_colon() {
        let parsed = ResourceRef::from_uri(
            "/vplex/v2/clusters/cluster-1/storage_volumes/VPD83T3%3A6000abc",
        )
        .unwrap();
        assert_eq!(parsed.name, "VPD83T3:6000abc");
        assert_eq!(parsed.kind, ResourceKind::StorageVolume);
    }

    #[test]
    fn test_from_uri_ignores_unknown_entities() {
        assert!(
            ResourceRef::from_uri("/vplex/v2/clusters/cluster-1/storage_arrays/EMC-1/logical_units/lu1")
                .is_none()
        );
        assert!(ResourceRef::from_uri("/vplex/v2/clusters/cluster-1/directors/director-1-1-A").is_none());
        // a distributed collection name is not valid under a cluster
        assert!(
            ResourceRef::from_uri("/vplex/v2/clusters/cluster-1/distributed_devices/dd_1").is_none()
        );
    }

    #[test]
    fn test_distributed_virtual_volume_uri() {
        let dvv = ResourceRef::distributed_virtual_volume("esx_dd_1_vol");
        assert_eq!(
            dvv.uri(),
            "/vplex/v2/distributed_storage/distributed_virtual_volumes/esx_dd_1_vol"
        );
        let parsed = ResourceRef::from_uri(
            "https://vplex.example/vplex/v2/distributed_storage/distributed_virtual_volumes/esx_dd_1_vol",
        )
        .unwrap();
        assert_eq!(parsed, dvv);
        assert!(parsed.kind.is_volume_class());
        assert_eq!(parsed.cluster(), None);
    }

    #[test]
    fn test_system_scoped_uri() {
        let port = ResourceRef::unscoped(ResourceKind::BackEndPort, "BE0-0");
        assert_eq!(port.uri(), "/vplex/v2/hardware/ports/BE0-0");
        assert_eq!(ResourceRef::from_uri(&port.uri()), Some(port));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("esx_view-01", "storage_view").is_ok());
        assert!(validate_name("_hidden", "storage_view").is_ok());
        assert!(validate_name("", "storage_view").is_err());
        assert!(validate_name("1view", "storage_view").is_err());
        assert!(validate_name("bad name", "storage_view").is_err());
        assert!(validate_name(&"a".repeat(64), "storage_view").is_err());
        assert!(validate_name(&"a".repeat(63), "storage_view").is_ok());
    }

    #[test]
    fn test_rebuild_status_serde() {
        let ready: RebuildStatus = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(ready, RebuildStatus::Done);
        let odd: RebuildStatus = serde_json::from_str("\"resyncing\"").unwrap();
        assert_eq!(odd, RebuildStatus::Unknown);
        assert!(RebuildStatus::Queued.is_in_progress());
        assert!(!RebuildStatus::Degraded.is_in_progress());
    }

    #[test]
    fn test_stripe_depth_blocks() {
        assert_eq!("4KB".parse::<StripeDepth>().unwrap().blocks(), 1);
        assert_eq!("1MB".parse::<StripeDepth>().unwrap().blocks(), 256);
        assert!("3KB".parse::<StripeDepth>().is_err());
    }

    #[test]
    fn test_details_field_lookup() {
        let details = ResourceDetails::new(ResourceRef::storage_volume("cluster-1", "sv1"))
            .with_claim_state(ClaimState::Claimed)
            .with_capacity(1024)
            .with_attribute("thin_rebuild", serde_json::json!(true));
        assert_eq!(details.field("use"), Some(serde_json::json!("claimed")));
        assert_eq!(details.field("capacity"), Some(serde_json::json!(1024)));
        assert_eq!(details.field("thin_rebuild"), Some(serde_json::json!(true)));
        assert_eq!(details.field("missing"), None);
    }
}
