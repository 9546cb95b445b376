//! Translation between `/vplex/v2` JSON and the resource model

use serde::Serialize;
use serde_json::{Map, Value, json};
use vplexflow_core::{
    ClaimState, FilterValue, Geometry, RebuildStatus, ResourceDetails, ResourceKind, ResourceRef,
    ResourceSpec, Result, Scope, VplexError,
};

const RULE_SETS: &str = "/vplex/v2/distributed_storage/rule_sets";

// Fields holding URIs of the entities a resource is built from
const CHILD_FIELDS: [&str; 6] = [
    "storage_volume",
    "supporting_device",
    "children",
    "ports",
    "initiators",
    "virtual_volumes",
];

// Fields holding URIs of entities built on top of this one
const PARENT_FIELDS: [&str; 1] = ["virtual_volume"];

fn malformed(message: String) -> VplexError {
    VplexError::Json(<serde_json::Error as serde::de::Error>::custom(message))
}

pub(crate) fn uris(value: &Value) -> Vec<ResourceRef> {
    match value {
        Value::String(uri) => ResourceRef::from_uri(uri).into_iter().collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(ResourceRef::from_uri)
            .collect(),
        _ => Vec::new(),
    }
}

fn claim_state(raw: &str) -> ClaimState {
    match raw {
        "unclaimed" => ClaimState::Unclaimed,
        "claimed" => ClaimState::Claimed,
        // used, meta-data, logging, ...
        _ => ClaimState::Used,
    }
}

fn capacity(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match FilterValue::parse(s) {
            FilterValue::Integer(n) | FilterValue::Size(n) => Some(n),
            _ => None,
        },
        _ => None,
    }
}

/// Build [`ResourceDetails`] from one entity object
///
/// `cluster` is the cluster the entity was read from; it is ignored for
/// distributed and system-wide kinds.
pub fn details_from_json(
    kind: ResourceKind,
    cluster: Option<&str>,
    value: &Value,
) -> Result<ResourceDetails> {
    let object = value
        .as_object()
        .ok_or_else(|| malformed(format!("expected a {} object", kind)))?;
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("{} object has no name", kind)))?;

    let reference = match (kind.scope(), cluster) {
        (Scope::Distributed | Scope::System, _) => ResourceRef::unscoped(kind, name),
        (Scope::Cluster, Some(cluster)) => ResourceRef::new(kind, cluster, name),
        (Scope::Cluster, None) => {
            return Err(VplexError::validation(format!(
                "{} '{}' read without a cluster",
                kind, name
            )));
        }
    };
    let mut details = ResourceDetails::new(reference);

    for (key, field) in object {
        match key.as_str() {
            "name" => {}
            "use" => details.claim_state = field.as_str().map(claim_state),
            "rebuild_status" => {
                details.rebuild_status = serde_json::from_value::<RebuildStatus>(field.clone()).ok()
            }
            "capacity" => details.capacity = capacity(field),
            k if CHILD_FIELDS.contains(&k) => details.children.extend(uris(field)),
            k if PARENT_FIELDS.contains(&k) => details.used_by.extend(uris(field)),
            "thin_enabled" => {
                let thin = field.as_str() == Some("enabled");
                details.set_attribute("thin", json!(thin));
                details.set_attribute(key.clone(), field.clone());
            }
            _ if field.is_object() || field.is_array() => {}
            _ => details.set_attribute(key.clone(), field.clone()),
        }
    }
    Ok(details)
}

/// JSON Patch operation used for storage view membership
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOp {
    pub op: &'static str,
    pub path: &'static str,
    pub value: String,
}

fn member_path(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::Port => Some("/ports"),
        ResourceKind::Initiator => Some("/initiators"),
        ResourceKind::VirtualVolume | ResourceKind::DistributedVirtualVolume => {
            Some("/virtual_volumes")
        }
        _ => None,
    }
}

/// Operations turning `current` view membership into `wanted`
///
/// Removals come first so a port or volume can be swapped in one request.
pub fn view_patch(current: &[ResourceRef], wanted: &[ResourceRef]) -> Vec<PatchOp> {
    let removals = current
        .iter()
        .filter(|r| !wanted.contains(r))
        .filter_map(|r| {
            member_path(r.kind).map(|path| PatchOp {
                op: "remove",
                path,
                value: r.uri(),
            })
        });
    let additions = wanted
        .iter()
        .filter(|r| !current.contains(r))
        .filter_map(|r| {
            member_path(r.kind).map(|path| PatchOp {
                op: "add",
                path,
                value: r.uri(),
            })
        });
    removals.chain(additions).collect()
}

/// Request body for creating `reference` from `spec`
///
/// Storage views are created with their ports only; initiators and
/// virtual volumes follow as a patch.
pub fn create_payload(reference: &ResourceRef, spec: &ResourceSpec) -> Result<Value> {
    let payload = match spec {
        ResourceSpec::StorageVolume { .. } => {
            return Err(VplexError::validation(format!(
                "storage volume {} can only be claimed, not created",
                reference
            )));
        }
        ResourceSpec::Extent { storage_volume } => json!({
            "storage_volume": storage_volume.uri(),
        }),
        ResourceSpec::Device {
            geometry,
            legs,
            stripe_depth,
        } => {
            let (primary, secondary) = legs.split_first().ok_or_else(|| {
                VplexError::validation(format!("device {} needs at least one leg", reference))
            })?;
            let mut body = Map::new();
            body.insert("name".into(), json!(reference.name));
            body.insert("geometry".into(), json!(geometry.to_string()));
            body.insert("primary_leg".into(), json!(primary.uri()));
            body.insert(
                "secondary_legs".into(),
                json!(secondary.iter().map(ResourceRef::uri).collect::<Vec<_>>()),
            );
            if *geometry == Geometry::Raid0 {
                let depth = stripe_depth.ok_or_else(|| {
                    VplexError::validation(format!(
                        "raid-0 device {} needs a stripe depth",
                        reference
                    ))
                })?;
                body.insert("stripe_depth".into(), json!(depth.blocks()));
            }
            Value::Object(body)
        }
        ResourceSpec::DistributedDevice {
            source,
            target,
            rule_set,
            sync,
        } => {
            let mut body = Map::new();
            body.insert("name".into(), json!(reference.name));
            body.insert("primary_leg".into(), json!(source.uri()));
            body.insert("secondary_leg".into(), json!(target.uri()));
            if let Some(rule_set) = rule_set {
                body.insert(
                    "rule_set".into(),
                    json!(format!("{}/{}", RULE_SETS, rule_set)),
                );
            }
            body.insert("sync".into(), json!(sync));
            Value::Object(body)
        }
        ResourceSpec::VirtualVolume {
            supporting_device,
            thin,
        } => json!({
            "thin": thin,
            "device": supporting_device.uri(),
        }),
        ResourceSpec::Initiator {
            port_wwn,
            host_type,
            iscsi_name,
        } => {
            let mut body = Map::new();
            body.insert("name".into(), json!(reference.name));
            body.insert("port_wwn".into(), json!(port_wwn));
            body.insert("type".into(), json!(host_type.as_str()));
            if let Some(iscsi) = iscsi_name {
                body.insert("iscsi_name".into(), json!(iscsi));
            }
            Value::Object(body)
        }
        ResourceSpec::StorageView { ports, .. } => json!({
            "name": reference.name,
            "ports": ports.iter().map(ResourceRef::uri).collect::<Vec<_>>(),
        }),
    };
    Ok(payload)
}
