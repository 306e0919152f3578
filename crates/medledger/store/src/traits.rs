use crate::StoreResult;
use async_trait::async_trait;
use medledger_types::{LedgerReference, ResourceId, TrackedResource};

/// Persistent mapping from tracked resources to their ledger references.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Start tracking a resource with an empty reference list.
    ///
    /// Registering an id twice is a `Conflict`.
    async fn register(&self, resource: &ResourceId) -> StoreResult<TrackedResource>;

    async fn get(&self, resource: &ResourceId) -> StoreResult<Option<TrackedResource>>;

    /// References in append order. Unknown resources are `NotFound`.
    async fn references(&self, resource: &ResourceId) -> StoreResult<Vec<LedgerReference>> {
        self.get(resource)
            .await?
            .map(|tracked| tracked.references)
            .ok_or_else(|| crate::StoreError::NotFound(resource.to_string()))
    }

    /// Append one reference and return the new list length.
    ///
    /// Concurrent appends to the same resource never lose an entry.
    async fn append_reference(
        &self,
        resource: &ResourceId,
        reference: LedgerReference,
    ) -> StoreResult<usize>;

    /// All tracked resource ids, sorted.
    async fn list(&self) -> StoreResult<Vec<ResourceId>>;

    async fn exists(&self, resource: &ResourceId) -> StoreResult<bool> {
        Ok(self.get(resource).await?.is_some())
    }
}
