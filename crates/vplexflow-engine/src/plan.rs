//! Staged plans of resource operations

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use vplexflow_core::{
    DesiredState, ResourceKind, ResourceRef, ResourceSpec, Result, VplexError,
};

/// What a plan is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Provision,
    Teardown,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Provision => write!(f, "provision"),
            Intent::Teardown => write!(f, "teardown"),
        }
    }
}

/// A reference an operation consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input {
    /// Known before the workflow starts (ports, pre-existing volumes)
    Fixed(ResourceRef),
    /// Whatever the operation with this id produced
    Output(String),
}

impl Input {
    pub fn output_of(operation: &Operation) -> Self {
        Input::Output(operation.id.clone())
    }
}

/// User-facing name of what an operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Claim,
    Unclaim,
    Create,
    Register,
    Delete,
    Unregister,
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verb::Claim => "claim",
            Verb::Unclaim => "unclaim",
            Verb::Create => "create",
            Verb::Register => "register",
            Verb::Delete => "delete",
            Verb::Unregister => "unregister",
        };
        f.write_str(s)
    }
}

/// One resource brought to a desired state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Unique within a plan
    pub id: String,

    pub reference: ResourceRef,

    pub desired: DesiredState,

    /// Parameters for `present`; `None` for `absent`
    pub spec: Option<ResourceSpec<Input>>,

    pub description: String,
}

impl Operation {
    pub fn present(reference: ResourceRef, spec: ResourceSpec<Input>) -> Self {
        Self::build(reference, DesiredState::Present, Some(spec))
    }

    pub fn absent(reference: ResourceRef) -> Self {
        Self::build(reference, DesiredState::Absent, None)
    }

    fn build(
        reference: ResourceRef,
        desired: DesiredState,
        spec: Option<ResourceSpec<Input>>,
    ) -> Self {
        let id = reference.to_string();
        let description = format!("{} {}", verb_for(reference.kind, desired), reference);
        Self {
            id,
            reference,
            desired,
            spec,
            description,
        }
    }

    pub fn verb(&self) -> Verb {
        verb_for(self.reference.kind, self.desired)
    }

    /// Operations that must have produced output before this one runs
    pub fn dependencies(&self) -> Vec<&str> {
        self.spec
            .iter()
            .flat_map(|spec| spec.references())
            .filter_map(|input| match input {
                Input::Output(id) => Some(id.as_str()),
                Input::Fixed(_) => None,
            })
            .collect()
    }

    /// Replace bindings with the references earlier operations produced
    pub fn resolve(&self, outputs: &HashMap<String, ResourceRef>) -> Result<Option<ResourceSpec>> {
        self.spec
            .as_ref()
            .map(|spec| {
                spec.try_map_refs(|input| match input {
                    Input::Fixed(reference) => Ok(reference.clone()),
                    Input::Output(id) => outputs.get(id).cloned().ok_or_else(|| {
                        VplexError::validation(format!(
                            "{} needs the output of '{}', which has not run",
                            self.id, id
                        ))
                    }),
                })
            })
            .transpose()
    }
}

fn verb_for(kind: ResourceKind, desired: DesiredState) -> Verb {
    match (kind, desired) {
        (ResourceKind::StorageVolume, DesiredState::Present) => Verb::Claim,
        (ResourceKind::StorageVolume, DesiredState::Absent) => Verb::Unclaim,
        (ResourceKind::Initiator, DesiredState::Present) => Verb::Register,
        (ResourceKind::Initiator, DesiredState::Absent) => Verb::Unregister,
        (_, DesiredState::Present) => Verb::Create,
        (_, DesiredState::Absent) => Verb::Delete,
    }
}

/// Independent operations on one resource kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub kind: ResourceKind,
    pub operations: Vec<Operation>,
}

impl Stage {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            operations: Vec::new(),
        }
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Ordered stages for one workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub intent: Intent,
    pub stages: Vec<Stage>,
}

impl Plan {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            stages: Vec::new(),
        }
    }

    /// Append a stage, skipping it when it has nothing to do
    pub fn push_stage(&mut self, stage: Stage) {
        if !stage.is_empty() {
            self.stages.push(stage);
        }
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.stages.iter().flat_map(|s| s.operations.iter())
    }

    pub fn len(&self) -> usize {
        self.operations().count()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(|s| s.is_empty())
    }

    /// Check that ids are unique, stages are homogeneous and every binding
    /// points at an operation of an earlier stage
    pub fn validate(&self) -> Result<()> {
        let mut earlier: HashSet<&str> = HashSet::new();
        for (index, stage) in self.stages.iter().enumerate() {
            let mut current: HashSet<&str> = HashSet::new();
            for op in &stage.operations {
                if op.reference.kind != stage.kind {
                    return Err(VplexError::validation(format!(
                        "stage {} ({}) contains {}",
                        index, stage.kind, op.reference
                    )));
                }
                if earlier.contains(op.id.as_str()) || !current.insert(op.id.as_str()) {
                    return Err(VplexError::validation(format!(
                        "operation '{}' appears more than once",
                        op.id
                    )));
                }
                if op.desired == DesiredState::Present && op.spec.is_none() {
                    return Err(VplexError::validation(format!(
                        "operation '{}' has no parameters",
                        op.id
                    )));
                }
                for dependency in op.dependencies() {
                    if !earlier.contains(dependency) {
                        return Err(VplexError::validation(format!(
                            "operation '{}' depends on '{}', which is not in an earlier stage",
                            op.id, dependency
                        )));
                    }
                }
            }
            earlier.extend(current);
        }
        Ok(())
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for op in self.operations() {
            match op.verb() {
                Verb::Claim => summary.claim += 1,
                Verb::Create | Verb::Register => summary.create += 1,
                Verb::Unclaim => summary.modify += 1,
                Verb::Delete | Verb::Unregister => summary.delete += 1,
            }
        }
        summary
    }
}

/// Counts of planned operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub claim: usize,
    pub create: usize,
    pub modify: usize,
    pub delete: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to claim, {} to create, {} to modify, {} to delete",
            self.claim, self.create, self.modify, self.delete
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(name: &str) -> Operation {
        Operation::present(
            ResourceRef::storage_volume("cluster-1", name),
            ResourceSpec::StorageVolume { claim: true },
        )
    }

    fn extent_of(volume: &Operation) -> Operation {
        Operation::present(
            ResourceRef::extent("cluster-1", format!("extent_{}_1", volume.reference.name)),
            ResourceSpec::Extent {
                storage_volume: Input::output_of(volume),
            },
        )
    }

    #[test]
    fn test_binding_to_earlier_stage_accepted() {
        let sv = claim("sv1");
        let ext = extent_of(&sv);

        let mut plan = Plan::new(Intent::Provision);
        let mut volumes = Stage::new(ResourceKind::StorageVolume);
        volumes.push(sv);
        let mut extents = Stage::new(ResourceKind::Extent);
        extents.push(ext);
        plan.push_stage(volumes);
        plan.push_stage(extents);

        assert!(plan.validate().is_ok());
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_binding_to_same_or_later_stage_rejected() {
        let sv = claim("sv1");
        let ext = extent_of(&sv);

        let mut plan = Plan::new(Intent::Provision);
        let mut extents = Stage::new(ResourceKind::Extent);
        extents.push(ext);
        let mut volumes = Stage::new(ResourceKind::StorageVolume);
        volumes.push(sv);
        plan.push_stage(extents);
        plan.push_stage(volumes);

        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("not in an earlier stage"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut plan = Plan::new(Intent::Provision);
        let mut volumes = Stage::new(ResourceKind::StorageVolume);
        volumes.push(claim("sv1"));
        volumes.push(claim("sv1"));
        plan.push_stage(volumes);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_resolve_uses_outputs() {
        let sv = claim("sv1");
        let ext = extent_of(&sv);
        let mut outputs = HashMap::new();
        assert!(ext.resolve(&outputs).is_err());

        outputs.insert(sv.id.clone(), sv.reference.clone());
        let resolved = ext.resolve(&outputs).unwrap().unwrap();
        assert_eq!(
            resolved,
            ResourceSpec::Extent {
                storage_volume: ResourceRef::storage_volume("cluster-1", "sv1")
            }
        );
    }

    #[test]
    fn test_summary_counts_verbs() {
        let mut plan = Plan::new(Intent::Teardown);
        let mut devices = Stage::new(ResourceKind::Device);
        devices.push(Operation::absent(ResourceRef::device("cluster-1", "v_dev_1")));
        let mut volumes = Stage::new(ResourceKind::StorageVolume);
        volumes.push(Operation::absent(ResourceRef::storage_volume("cluster-1", "sv1")));
        volumes.push(Operation::absent(ResourceRef::storage_volume("cluster-1", "sv2")));
        plan.push_stage(devices);
        plan.push_stage(volumes);
        plan.push_stage(Stage::new(ResourceKind::Extent));

        let summary = plan.summary();
        assert_eq!(summary.delete, 1);
        assert_eq!(summary.modify, 2);
        assert_eq!(plan.stages.len(), 2);
        assert_eq!(
            summary.to_string(),
            "0 to claim, 0 to create, 2 to modify, 1 to delete"
        );
    }
}
