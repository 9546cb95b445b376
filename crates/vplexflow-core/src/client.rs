//! Resource client trait definition

use crate::error::{Result, VplexError};
use crate::filter::FilterSet;
use crate::model::{ResourceDetails, ResourceKind, ResourceMap, ResourceRef};
use crate::spec::ResourceSpec;
use async_trait::async_trait;

/// Typed access to the storage-management API
///
/// Both the REST client and the in-memory array implement this trait so the
/// engine can drive either. Idempotency lives in the step executor, not here:
/// `create` on an existing name is allowed to fail.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Short name for logs (e.g. "rest", "memory")
    fn name(&self) -> &str;

    /// Names of the clusters behind the management endpoint
    async fn clusters(&self) -> Result<Vec<String>>;

    /// Probe the endpoint with a cheap read
    async fn check_connection(&self) -> Result<()> {
        self.clusters().await.map(|_| ())
    }

    /// Fail with `NotFound` unless `cluster` is known to the endpoint
    async fn verify_cluster(&self, cluster: &str) -> Result<()> {
        let clusters = self.clusters().await?;
        if clusters.iter().any(|c| c == cluster) {
            Ok(())
        } else {
            Err(VplexError::not_found(format!(
                "cluster '{}' (available: {})",
                cluster,
                clusters.join(", ")
            )))
        }
    }

    /// Read one resource; `NotFound` if it does not exist
    async fn get(&self, reference: &ResourceRef) -> Result<ResourceDetails>;

    /// List resources of `kind`; `cluster` is ignored for distributed kinds
    async fn list(
        &self,
        kind: ResourceKind,
        cluster: Option<&str>,
        filters: &FilterSet,
    ) -> Result<Vec<ResourceDetails>>;

    async fn create(
        &self,
        reference: &ResourceRef,
        spec: &ResourceSpec,
    ) -> Result<ResourceDetails>;

    /// Change an existing resource in place (claim state, view membership)
    async fn update(
        &self,
        reference: &ResourceRef,
        spec: &ResourceSpec,
    ) -> Result<ResourceDetails>;

    async fn delete(&self, reference: &ResourceRef) -> Result<()>;

    /// Parents and children of a resource in the composition graph
    async fn map(&self, reference: &ResourceRef) -> Result<ResourceMap>;

    /// `get`, with `NotFound` turned into `None`
    async fn find(&self, reference: &ResourceRef) -> Result<Option<ResourceDetails>> {
        match self.get(reference).await {
            Ok(details) => Ok(Some(details)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
