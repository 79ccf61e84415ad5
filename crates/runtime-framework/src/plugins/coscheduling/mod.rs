//! Gang scheduling through scheduler-plugins' coscheduling `PodGroup`.
//!
//! The plugin tags every pod of a job with the pod-group label and builds
//! the `PodGroup` the coscheduling scheduler uses to admit the job's pods
//! all at once.

pub mod indexer;

use std::sync::Arc;

use api_types::ClusterObject;
use api_types::PodGroup;
use api_types::PodGroupSpec;
use api_types::TrainJob;
use api_types::POD_GROUP_LABEL;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::Resource;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::client::ClientError;
use crate::client::PodGroupReader;
use crate::framework::ComponentBuilderPlugin;
use crate::framework::EnforcePodGroupPolicyPlugin;
use crate::framework::FieldIndexer;
use crate::framework::FrameworkError;
use crate::framework::Plugin;
use crate::quantity::add_resource_list;
use crate::quantity::scale_resource_list;
use crate::quantity::QuantityError;
use crate::quantity::ResourceList;
use crate::runtime::Info;

pub use indexer::index_cluster_training_runtime_container_runtime_class;
pub use indexer::index_training_runtime_container_runtime_class;
pub use indexer::CLUSTER_TRAINING_RUNTIME_CONTAINER_RUNTIME_CLASS_KEY;
pub use indexer::TRAINING_RUNTIME_CONTAINER_RUNTIME_CLASS_KEY;

pub struct Coscheduling {
    client: Arc<dyn PodGroupReader>,
}

impl Coscheduling {
    pub const NAME: &'static str = "Coscheduling";

    /// Creates the plugin and registers its runtime-class indexes.
    pub fn new(
        client: Arc<dyn PodGroupReader>,
        indexer: &dyn FieldIndexer,
    ) -> Result<Self, FrameworkError> {
        indexer.index_field(
            "TrainingRuntime",
            TRAINING_RUNTIME_CONTAINER_RUNTIME_CLASS_KEY,
            index_training_runtime_container_runtime_class,
        )?;
        indexer.index_field(
            "ClusterTrainingRuntime",
            CLUSTER_TRAINING_RUNTIME_CONTAINER_RUNTIME_CLASS_KEY,
            index_cluster_training_runtime_container_runtime_class,
        )?;
        Ok(Self { client })
    }

    fn pod_group(info: &Info, job: &TrainJob) -> Result<PodGroup, QuantityError> {
        let mut min_member = 0i32;
        let mut min_resources = ResourceList::new();
        for pod_set in &info.template_spec.pod_sets {
            let count = pod_set.count_or_default();
            min_member = min_member.saturating_add(count);
            let scaled = scale_resource_list(&pod_set.single_pod_requests, i64::from(count))?;
            add_resource_list(&mut min_resources, &scaled)?;
        }

        let schedule_timeout_seconds = info
            .runtime_policy
            .pod_group_policy
            .as_ref()
            .and_then(|policy| policy.coscheduling.as_ref())
            .map(|source| source.schedule_timeout_seconds());

        Ok(PodGroup {
            metadata: ObjectMeta {
                name: job.metadata.name.clone(),
                namespace: job.metadata.namespace.clone(),
                owner_references: Some(vec![owner_reference(job)]),
                ..Default::default()
            },
            spec: PodGroupSpec {
                min_member,
                min_resources: Some(min_resources),
                schedule_timeout_seconds,
            },
            status: None,
        })
    }
}

/// Controller reference so the group is garbage collected with its job
fn owner_reference(job: &TrainJob) -> OwnerReference {
    OwnerReference {
        api_version: TrainJob::api_version(&()).to_string(),
        kind: TrainJob::kind(&()).to_string(),
        name: job.metadata.name.clone().unwrap_or_default(),
        uid: job.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

impl Plugin for Coscheduling {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn as_enforce_pod_group_policy(&self) -> Option<&dyn EnforcePodGroupPolicyPlugin> {
        Some(self)
    }

    fn as_component_builder(&self) -> Option<&dyn ComponentBuilderPlugin> {
        Some(self)
    }
}

impl EnforcePodGroupPolicyPlugin for Coscheduling {
    fn enforce_pod_group_policy(
        &self,
        info: Option<&mut Info>,
        job: &TrainJob,
    ) -> Result<(), FrameworkError> {
        let Some(info) = info else {
            return Ok(());
        };
        if !info.coscheduling_enabled() {
            return Ok(());
        }

        info.scheduler.pod_labels.insert(
            POD_GROUP_LABEL.to_string(),
            job.metadata.name.clone().unwrap_or_default(),
        );
        Ok(())
    }
}

#[async_trait]
impl ComponentBuilderPlugin for Coscheduling {
    #[tracing::instrument(
        skip_all,
        fields(
            namespace = job.metadata.namespace.as_deref().unwrap_or_default(),
            train_job = job.metadata.name.as_deref().unwrap_or_default()
        )
    )]
    async fn build(
        &self,
        cancel: &CancellationToken,
        info: Option<&Info>,
        job: &TrainJob,
    ) -> Result<Vec<ClusterObject>, ClientError> {
        let Some(info) = info.filter(|info| info.coscheduling_enabled()) else {
            debug!("Coscheduling is not enabled for this job");
            return Ok(Vec::new());
        };

        let namespace = job.metadata.namespace.as_deref().unwrap_or_default();
        let name = job.metadata.name.as_deref().unwrap_or_default();

        let existing = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.client.get_pod_group(namespace, name) => result,
        };

        match existing {
            // an existing group is never updated, the scheduler owns it from here
            Ok(_) => {
                debug!("PodGroup already exists");
                Ok(Vec::new())
            }
            Err(err) if err.is_not_found() => {
                let pod_group =
                    Self::pod_group(info, job).map_err(|e| ClientError::Serialization {
                        message: format!("invalid PodGroup minResources: {e}"),
                    })?;
                info!(
                    min_member = pod_group.spec.min_member,
                    schedule_timeout_seconds = ?pod_group.spec.schedule_timeout_seconds,
                    "Built PodGroup for TrainJob"
                );
                Ok(vec![pod_group.into()])
            }
            Err(err) => Err(err),
        }
    }
}
