//! In-memory resource store.

use crate::traits::ResourceStore;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use medledger_types::{LedgerReference, ResourceId, TrackedResource};

#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    resources: DashMap<ResourceId, Vec<LedgerReference>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn register(&self, resource: &ResourceId) -> StoreResult<TrackedResource> {
        match self.resources.entry(resource.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "resource {resource} is already tracked"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Vec::new());
                Ok(TrackedResource::new(resource.clone()))
            }
        }
    }

    async fn get(&self, resource: &ResourceId) -> StoreResult<Option<TrackedResource>> {
        Ok(self.resources.get(resource).map(|refs| TrackedResource {
            id: resource.clone(),
            references: refs.value().clone(),
        }))
    }

    async fn append_reference(
        &self,
        resource: &ResourceId,
        reference: LedgerReference,
    ) -> StoreResult<usize> {
        let mut refs = self
            .resources
            .get_mut(resource)
            .ok_or_else(|| StoreError::NotFound(resource.to_string()))?;
        refs.push(reference);
        Ok(refs.len())
    }

    async fn list(&self) -> StoreResult<Vec<ResourceId>> {
        let mut ids: Vec<ResourceId> = self.resources.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn register_append_and_read_back() {
        let store = InMemoryResourceStore::new();
        let id = ResourceId::new("scan.pdf");

        let tracked = store.register(&id).await.unwrap();
        assert!(tracked.references.is_empty());

        assert_eq!(store.append_reference(&id, LedgerReference::new("a")).await.unwrap(), 1);
        assert_eq!(store.append_reference(&id, LedgerReference::new("b")).await.unwrap(), 2);

        assert_eq!(
            store.references(&id).await.unwrap(),
            vec![LedgerReference::new("a"), LedgerReference::new("b")]
        );
    }

    #[tokio::test]
    async fn double_registration_conflicts() {
        let store = InMemoryResourceStore::new();
        let id = ResourceId::new("x");
        store.register(&id).await.unwrap();
        assert!(matches!(store.register(&id).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let store = InMemoryResourceStore::new();
        let id = ResourceId::new("ghost");
        assert!(store.get(&id).await.unwrap().is_none());
        assert!(store.references(&id).await.unwrap_err().is_not_found());
        assert!(store
            .append_reference(&id, LedgerReference::new("r"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_not_lost() {
        let store = Arc::new(InMemoryResourceStore::new());
        let id = ResourceId::new("shared");
        store.register(&id).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_reference(&id, LedgerReference::new(format!("ref-{i}")))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let refs = store.references(&id).await.unwrap();
        assert_eq!(refs.len(), 10);
        for i in 0..10 {
            assert!(refs.contains(&LedgerReference::new(format!("ref-{i}"))));
        }
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let store = InMemoryResourceStore::new();
        for name in ["b", "c", "a"] {
            store.register(&ResourceId::new(name)).await.unwrap();
        }
        assert_eq!(
            store.list().await.unwrap(),
            vec![ResourceId::new("a"), ResourceId::new("b"), ResourceId::new("c")]
        );
    }
}
