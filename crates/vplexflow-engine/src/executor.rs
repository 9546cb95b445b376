//! Step executor
//!
//! Brings one resource to its desired state through the client. A resource
//! that already matches is left alone, which is what makes whole workflows
//! safe to re-run.

use crate::plan::Operation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vplexflow_core::{
    DesiredState, ResourceClient, ResourceDetails, ResourceKind, ResourceRef,
    ResourceSpec, Result, VplexError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Modified,
    Deleted,
    Unchanged,
}

impl Outcome {
    pub fn is_change(&self) -> bool {
        !matches!(self, Outcome::Unchanged)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Created => write!(f, "created"),
            Outcome::Modified => write!(f, "modified"),
            Outcome::Deleted => write!(f, "deleted"),
            Outcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Result of one executed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub operation_id: String,
    pub reference: ResourceRef,
    pub desired: DesiredState,
    pub outcome: Outcome,
    /// State after the step; `None` once the resource is gone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ResourceDetails>,
}

impl StepResult {
    /// The reference later operations bind to
    pub fn output(&self) -> ResourceRef {
        self.details
            .as_ref()
            .map(|d| d.reference.clone())
            .unwrap_or_else(|| self.reference.clone())
    }
}

pub struct StepExecutor {
    client: Arc<dyn ResourceClient>,
}

impl StepExecutor {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self { client }
    }

    /// Resolve the operation's bindings against `outputs` and apply it
    pub async fn execute(
        &self,
        operation: &Operation,
        outputs: &HashMap<String, ResourceRef>,
    ) -> Result<StepResult> {
        let spec = operation.resolve(outputs)?;
        self.apply(
            &operation.id,
            &operation.reference,
            operation.desired,
            spec.as_ref(),
        )
        .await
    }

    /// Bring `reference` to `desired` with parameters `spec`
    pub async fn apply(
        &self,
        operation_id: &str,
        reference: &ResourceRef,
        desired: DesiredState,
        spec: Option<&ResourceSpec>,
    ) -> Result<StepResult> {
        let (outcome, details) = match desired {
            DesiredState::Present => {
                let spec = spec.ok_or_else(|| {
                    VplexError::validation(format!("no parameters given for {}", reference))
                })?;
                self.ensure_present(reference, spec).await?
            }
            DesiredState::Absent => self.ensure_absent(reference).await?,
        };

        Ok(StepResult {
            operation_id: operation_id.to_string(),
            reference: reference.clone(),
            desired,
            outcome,
            details,
        })
    }

    async fn ensure_present(
        &self,
        reference: &ResourceRef,
        spec: &ResourceSpec,
    ) -> Result<(Outcome, Option<ResourceDetails>)> {
        if !spec.applies_to(reference.kind) {
            return Err(VplexError::validation(format!(
                "{} parameters given for {}",
                spec.kind(),
                reference
            )));
        }

        let Some(current) = self.client.find(reference).await? else {
            if reference.kind == ResourceKind::StorageVolume {
                return Err(VplexError::not_found(reference));
            }
            let created = self.client.create(reference, spec).await?;
            info!(resource = %reference, "Created");
            return Ok((Outcome::Created, Some(created)));
        };

        match spec.mismatch(&current) {
            None => {
                debug!(resource = %reference, "Already in desired state");
                Ok((Outcome::Unchanged, Some(current)))
            }
            Some(reason) if spec.updatable_in_place() => {
                debug!(resource = %reference, reason = %reason, "Modifying in place");
                let updated = self.client.update(reference, spec).await?;
                info!(resource = %reference, "Modified");
                Ok((Outcome::Modified, Some(updated)))
            }
            Some(reason) => Err(VplexError::conflict(reference, reason)),
        }
    }

    async fn ensure_absent(
        &self,
        reference: &ResourceRef,
    ) -> Result<(Outcome, Option<ResourceDetails>)> {
        // Storage volumes are never deleted; absent means released
        if reference.kind == ResourceKind::StorageVolume {
            let Some(current) = self.client.find(reference).await? else {
                warn!(resource = %reference, "Storage volume not found, nothing to unclaim");
                return Ok((Outcome::Unchanged, None));
            };
            if !current
                .claim_state
                .is_some_and(|s| s.is_claimed())
            {
                return Ok((Outcome::Unchanged, Some(current)));
            }
            let updated = self
                .client
                .update(reference, &ResourceSpec::StorageVolume { claim: false })
                .await?;
            info!(resource = %reference, "Unclaimed");
            return Ok((Outcome::Modified, Some(updated)));
        }

        match self.client.delete(reference).await {
            Ok(()) => {
                info!(resource = %reference, "Deleted");
                Ok((Outcome::Deleted, None))
            }
            Err(e) if e.is_not_found() => {
                debug!(resource = %reference, "Already absent");
                Ok((Outcome::Unchanged, None))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vplexflow_core::MemoryArray;

    fn array() -> Arc<MemoryArray> {
        Arc::new(
            MemoryArray::new(&["cluster-1"])
                .with_storage_volume("cluster-1", "sv1", 1 << 30)
                .with_storage_volume("cluster-1", "sv2", 1 << 30),
        )
    }

    #[tokio::test]
    async fn test_claim_is_idempotent() {
        let array = array();
        let executor = StepExecutor::new(array.clone());
        let sv = ResourceRef::storage_volume("cluster-1", "sv1");
        let spec = ResourceSpec::StorageVolume { claim: true };

        let first = executor
            .apply("claim", &sv, DesiredState::Present, Some(&spec))
            .await
            .unwrap();
        assert_eq!(first.outcome, Outcome::Modified);

        let second = executor
            .apply("claim", &sv, DesiredState::Present, Some(&spec))
            .await
            .unwrap();
        assert_eq!(second.outcome, Outcome::Unchanged);
        assert_eq!(array.mutations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_storage_volume_is_not_found() {
        let executor = StepExecutor::new(array());
        let sv = ResourceRef::storage_volume("cluster-1", "ghost");
        let err = executor
            .apply(
                "claim",
                &sv,
                DesiredState::Present,
                Some(&ResourceSpec::StorageVolume { claim: true }),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_of_missing_resource_is_unchanged() {
        let array = array();
        let executor = StepExecutor::new(array.clone());
        let result = executor
            .apply(
                "rm",
                &ResourceRef::device("cluster-1", "nope"),
                DesiredState::Absent,
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.outcome, Outcome::Unchanged);

        let sv = executor
            .apply(
                "rm",
                &ResourceRef::storage_volume("cluster-1", "sv1"),
                DesiredState::Absent,
                None,
            )
            .await
            .unwrap();
        assert_eq!(sv.outcome, Outcome::Unchanged);
        assert!(
            array
                .mutations()
                .await
                .iter()
                .all(|c| c.reference.as_ref().map(|r| r.kind) != Some(ResourceKind::StorageVolume))
        );
    }

    #[tokio::test]
    async fn test_mismatched_extent_is_conflict() {
        let array = array();
        let executor = StepExecutor::new(array.clone());
        for name in ["sv1", "sv2"] {
            executor
                .apply(
                    "claim",
                    &ResourceRef::storage_volume("cluster-1", name),
                    DesiredState::Present,
                    Some(&ResourceSpec::StorageVolume { claim: true }),
                )
                .await
                .unwrap();
        }
        let extent = ResourceRef::extent("cluster-1", "extent_sv1_1");
        executor
            .apply(
                "extent",
                &extent,
                DesiredState::Present,
                Some(&ResourceSpec::Extent {
                    storage_volume: ResourceRef::storage_volume("cluster-1", "sv1"),
                }),
            )
            .await
            .unwrap();

        let err = executor
            .apply(
                "extent",
                &extent,
                DesiredState::Present,
                Some(&ResourceSpec::Extent {
                    storage_volume: ResourceRef::storage_volume("cluster-1", "sv2"),
                }),
            )
            .await
            .unwrap_err();
        match err {
            VplexError::Conflict { resource, .. } => {
                assert_eq!(resource, extent.to_string())
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }
}
