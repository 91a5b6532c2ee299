//! In-memory store gateway.

use super::{Document, DocumentRef, Fields, Query, StoreGateway};
use crate::error::{GatewayError, GatewayResult};
use crate::subscriptions::{
    GatewaySubscription, SubscriptionId, SubscriptionManager, DEFAULT_BUFFER_SIZE,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use uuid::Uuid;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct MemoryStoreConfig {
    /// Max queued snapshots per subscription before the subscriber is dropped.
    pub subscription_buffer: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            subscription_buffer: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Gateway operations, for fault injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Query,
    Create,
    UpdateMerge,
    Delete,
    BatchDelete,
    Subscribe,
}

#[derive(Clone, Debug)]
struct Fault {
    operation: Operation,
    collection: String,
}

type Collection = BTreeMap<String, Fields>;

/// A [`StoreGateway`] backed by process memory.
///
/// Every write holds the store lock while it applies, so batches are atomic
/// and subscribers observe snapshots in write order.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    subscriptions: SubscriptionManager,
    faults: Mutex<Vec<Fault>>,
    latency: Mutex<HashMap<String, Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            subscriptions: SubscriptionManager::with_buffer_size(config.subscription_buffer),
            faults: Mutex::new(Vec::new()),
            latency: Mutex::new(HashMap::new()),
        }
    }

    // --- Test Hooks ---

    /// Make every `operation` on `collection` fail until faults are cleared.
    pub fn inject_fault(&self, operation: Operation, collection: impl Into<String>) {
        self.faults.lock().push(Fault {
            operation,
            collection: collection.into(),
        });
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Delay every read and write on `collection`.
    pub fn set_latency(&self, collection: impl Into<String>, delay: Duration) {
        self.latency.lock().insert(collection.into(), delay);
    }

    /// Terminate all live subscriptions on `collection` with an error.
    pub fn fail_subscriptions(&self, collection: &str, reason: &str) -> usize {
        self.subscriptions.fail_collection(collection, reason)
    }

    /// Number of documents currently in `collection`.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |docs| docs.len())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }

    // --- Internals ---

    async fn enter(&self, operation: Operation, collections: &[&str]) -> GatewayResult<()> {
        let delay = {
            let latency = self.latency.lock();
            collections
                .iter()
                .filter_map(|c| latency.get(*c).copied())
                .max()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let faults = self.faults.lock();
        if let Some(fault) = faults
            .iter()
            .find(|f| f.operation == operation && collections.contains(&f.collection.as_str()))
        {
            tracing::debug!(?operation, collection = %fault.collection, "injected fault");
            return Err(GatewayError::Unavailable(format!(
                "injected {:?} fault on {}",
                operation, fault.collection
            )));
        }

        Ok(())
    }

    fn evaluate(collections: &HashMap<String, Collection>, query: &Query) -> Vec<Document> {
        let mut documents: Vec<Document> = collections
            .get(&query.collection)
            .into_iter()
            .flat_map(|docs| docs.iter())
            .filter(|(_, fields)| query.matches(fields))
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect();
        query.sort(&mut documents);
        documents
    }

    fn notify(&self, collections: &HashMap<String, Collection>, touched: &str) {
        self.subscriptions
            .broadcast(touched, |query| Self::evaluate(collections, query));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> GatewayResult<Option<Document>> {
        self.enter(Operation::Get, &[collection]).await?;

        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query(&self, query: &Query) -> GatewayResult<Vec<Document>> {
        self.enter(Operation::Query, &[query.collection.as_str()]).await?;

        let collections = self.collections.read();
        Ok(Self::evaluate(&collections, query))
    }

    async fn create(
        &self,
        collection: &str,
        fields: Fields,
        id: Option<&str>,
    ) -> GatewayResult<String> {
        self.enter(Operation::Create, &[collection]).await?;

        let id = match id {
            Some(id) => id.to_string(),
            None => Uuid::now_v7().simple().to_string(),
        };

        let mut collections = self.collections.write();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        self.notify(&collections, collection);

        tracing::debug!(collection, id = %id, "document written");
        Ok(id)
    }

    async fn update_merge(&self, collection: &str, id: &str, fields: Fields) -> GatewayResult<()> {
        self.enter(Operation::UpdateMerge, &[collection]).await?;

        let mut collections = self.collections.write();
        let existing = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| GatewayError::not_found(collection, id))?;
        existing.extend(fields);
        self.notify(&collections, collection);

        tracing::debug!(collection, id, "document merged");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> GatewayResult<()> {
        self.enter(Operation::Delete, &[collection]).await?;

        let mut collections = self.collections.write();
        let removed = collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            self.notify(&collections, collection);
            tracing::debug!(collection, id, "document deleted");
        }
        Ok(())
    }

    async fn atomic_batch_delete(&self, refs: &[DocumentRef]) -> GatewayResult<()> {
        let touched: Vec<&str> = refs.iter().map(|r| r.collection.as_str()).collect();
        self.enter(Operation::BatchDelete, &touched).await?;

        let mut collections = self.collections.write();
        let mut changed: Vec<&str> = Vec::new();
        for r in refs {
            let removed = collections
                .get_mut(&r.collection)
                .and_then(|docs| docs.remove(&r.id))
                .is_some();
            if removed && !changed.contains(&r.collection.as_str()) {
                changed.push(&r.collection);
            }
        }
        for collection in &changed {
            self.notify(&collections, collection);
        }

        tracing::debug!(documents = refs.len(), "batch delete committed");
        Ok(())
    }

    async fn subscribe(&self, query: &Query) -> GatewayResult<GatewaySubscription> {
        self.enter(Operation::Subscribe, &[query.collection.as_str()]).await?;

        // Hold the read lock so no write lands between snapshot and registration.
        let collections = self.collections.read();
        let initial = Self::evaluate(&collections, query);
        Ok(self.subscriptions.subscribe(query.clone(), initial))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }
}
