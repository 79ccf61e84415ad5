//! Cluster access used by plugins and by the framework apply phase
//!
//! Plugins only read through [`PodGroupReader`]; writes happen in the
//! framework through [`ObjectApplier`] after every builder has run.

use core::error::Error;
use std::fmt::Debug;

use api_types::ClusterObject;
use api_types::PodGroup;
use async_trait::async_trait;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::Api;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Errors returned by cluster reads and writes.
///
/// `NotFound` is an expected outcome for existence checks; every other
/// variant is a failure the caller decides how to retry.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum ClientError {
    #[display("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[display("Kubernetes API error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },
    #[display("Kubernetes transport error: {message}")]
    Transport { message: String },
    #[display("Failed to serialize object: {message}")]
    Serialization { message: String },
    #[display("Request cancelled")]
    Cancelled,
}

impl Error for ClientError {}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classifies a kube error raised while accessing `kind` `namespace/name`.
    pub fn from_kube(err: kube::Error, kind: &str, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(response) if response.code == 404 => Self::NotFound {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(response) => Self::Api {
                code: response.code,
                reason: response.reason,
                message: response.message,
            },
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

/// Existence reads of pod groups
#[async_trait]
pub trait PodGroupReader: Send + Sync {
    async fn get_pod_group(&self, namespace: &str, name: &str) -> Result<PodGroup, ClientError>;
}

/// Server-side apply of objects produced by component builders
#[async_trait]
pub trait ObjectApplier: Send + Sync {
    async fn apply(
        &self,
        object: &ClusterObject,
        field_manager: &str,
    ) -> Result<ClusterObject, ClientError>;
}

/// [`PodGroupReader`] and [`ObjectApplier`] backed by the API server
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
}

impl KubeClient {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodGroupReader for KubeClient {
    async fn get_pod_group(&self, namespace: &str, name: &str) -> Result<PodGroup, ClientError> {
        let api: Api<PodGroup> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| ClientError::from_kube(e, "PodGroup", namespace, name))
    }
}

#[async_trait]
impl ObjectApplier for KubeClient {
    async fn apply(
        &self,
        object: &ClusterObject,
        field_manager: &str,
    ) -> Result<ClusterObject, ClientError> {
        let namespace = object.namespace().unwrap_or("default");
        let applied: ClusterObject = match object {
            ClusterObject::PodGroup(obj) => {
                let api = Api::namespaced(self.client.clone(), namespace);
                apply_resource(api, obj.as_ref(), field_manager).await?.into()
            }
            ClusterObject::TrainJob(obj) => {
                let api = Api::namespaced(self.client.clone(), namespace);
                apply_resource(api, obj.as_ref(), field_manager).await?.into()
            }
            ClusterObject::TrainingRuntime(obj) => {
                let api = Api::namespaced(self.client.clone(), namespace);
                apply_resource(api, obj.as_ref(), field_manager).await?.into()
            }
            ClusterObject::ClusterTrainingRuntime(obj) => {
                let api = Api::all(self.client.clone());
                apply_resource(api, obj.as_ref(), field_manager).await?.into()
            }
        };
        Ok(applied)
    }
}

async fn apply_resource<K>(
    api: Api<K>,
    object: &K,
    field_manager: &str,
) -> Result<K, ClientError>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned,
{
    let name = object.meta().name.clone().unwrap_or_default();
    let namespace = object.meta().namespace.clone().unwrap_or_default();
    let kind = K::kind(&());

    // apply bodies must carry their type meta, which hand-written kinds omit
    let mut body = serde_json::to_value(object).map_err(|e| ClientError::Serialization {
        message: e.to_string(),
    })?;
    body["apiVersion"] = K::api_version(&()).into();
    body["kind"] = kind.clone().into();

    debug!(kind = %kind, namespace = %namespace, name = %name, "Applying object");
    let params = PatchParams::apply(field_manager).force();
    api.patch(&name, &params, &Patch::Apply(body))
        .await
        .map_err(|e| ClientError::from_kube(e, &kind, &namespace, &name))
}

#[cfg(test)]
mod tests {
    use kube::core::ErrorResponse;
    use similar_asserts::assert_eq;

    use super::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("request failed: {reason}"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn not_found_response_is_classified() {
        let err =
            ClientError::from_kube(api_error(404, "NotFound"), "PodGroup", "default", "demo");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "PodGroup default/demo not found");
    }

    #[test]
    fn other_api_errors_keep_status_details() {
        let err =
            ClientError::from_kube(api_error(403, "Forbidden"), "PodGroup", "default", "demo");
        assert_eq!(
            err,
            ClientError::Api {
                code: 403,
                reason: "Forbidden".to_string(),
                message: "request failed: Forbidden".to_string(),
            }
        );
        assert!(!err.is_not_found());
    }
}
