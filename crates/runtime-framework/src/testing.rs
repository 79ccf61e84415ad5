//! In-memory stand-ins for the cluster client and the object cache.
//!
//! Compiled for this crate's tests and, behind the `testing` feature, for
//! hosts that want to exercise plugins without an API server.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use api_types::ClusterObject;
use api_types::PodGroup;
use async_trait::async_trait;

use crate::client::ClientError;
use crate::client::ObjectApplier;
use crate::client::PodGroupReader;
use crate::framework::FieldIndexer;
use crate::framework::FrameworkError;
use crate::framework::IndexFn;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Object store keyed by namespace and name, with read interceptors
#[derive(Default)]
pub struct FakeClient {
    pod_groups: Mutex<BTreeMap<(String, String), PodGroup>>,
    read_error: Mutex<Option<ClientError>>,
    block_reads: AtomicBool,
    applied: Mutex<Vec<(String, ClusterObject)>>,
}

impl FakeClient {
    pub fn insert(&self, pod_group: PodGroup) {
        let key = (
            pod_group.metadata.namespace.clone().unwrap_or_default(),
            pod_group.metadata.name.clone().unwrap_or_default(),
        );
        lock(&self.pod_groups).insert(key, pod_group);
    }

    /// Every later pod group read fails with `err`.
    pub fn fail_pod_group_reads(&self, err: ClientError) {
        *lock(&self.read_error) = Some(err);
    }

    /// Every later pod group read never completes.
    pub fn block_pod_group_reads(&self) {
        self.block_reads.store(true, Ordering::SeqCst);
    }

    /// Objects passed to [`ObjectApplier::apply`], in call order
    pub fn applied(&self) -> Vec<ClusterObject> {
        lock(&self.applied)
            .iter()
            .map(|(_, object)| object.clone())
            .collect()
    }

    pub fn applied_field_managers(&self) -> Vec<String> {
        lock(&self.applied)
            .iter()
            .map(|(manager, _)| manager.clone())
            .collect()
    }
}

#[async_trait]
impl PodGroupReader for FakeClient {
    async fn get_pod_group(&self, namespace: &str, name: &str) -> Result<PodGroup, ClientError> {
        if self.block_reads.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if let Some(err) = lock(&self.read_error).clone() {
            return Err(err);
        }

        lock(&self.pod_groups)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                kind: "PodGroup".to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

#[async_trait]
impl ObjectApplier for FakeClient {
    async fn apply(
        &self,
        object: &ClusterObject,
        field_manager: &str,
    ) -> Result<ClusterObject, ClientError> {
        if let ClusterObject::PodGroup(pod_group) = object {
            self.insert((**pod_group).clone());
        }
        lock(&self.applied).push((field_manager.to_string(), object.clone()));
        Ok(object.clone())
    }
}

/// Field-index store that evaluates registered index functions on demand
#[derive(Default)]
pub struct FakeIndexer {
    indexes: Mutex<BTreeMap<(String, String), IndexFn>>,
    objects: Mutex<Vec<ClusterObject>>,
}

impl FakeIndexer {
    pub fn add(&self, object: impl Into<ClusterObject>) {
        lock(&self.objects).push(object.into());
    }

    /// Registered `(kind, field)` pairs, sorted
    pub fn registered(&self) -> Vec<(String, String)> {
        lock(&self.indexes).keys().cloned().collect()
    }

    /// Objects of `kind` whose `field` index contains `value`.
    ///
    /// Returns `None` when no such index is registered.
    pub fn list(&self, kind: &str, field: &str, value: &str) -> Option<Vec<ClusterObject>> {
        let extract = *lock(&self.indexes).get(&(kind.to_string(), field.to_string()))?;
        let matches = lock(&self.objects)
            .iter()
            .filter(|object| object.kind() == kind)
            .filter(|object| extract(*object).iter().any(|key| key == value))
            .cloned()
            .collect();
        Some(matches)
    }
}

impl FieldIndexer for FakeIndexer {
    fn index_field(
        &self,
        kind: &str,
        field: &str,
        extract: IndexFn,
    ) -> Result<(), FrameworkError> {
        let mut indexes = lock(&self.indexes);
        let key = (kind.to_string(), field.to_string());
        if indexes.contains_key(&key) {
            return Err(FrameworkError::IndexConflict {
                kind: kind.to_string(),
                field: field.to_string(),
            });
        }
        indexes.insert(key, extract);
        Ok(())
    }
}
