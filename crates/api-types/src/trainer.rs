//! `trainer.kubeflow.org/v1alpha1` resources
//!
//! A `TrainJob` references a runtime template, either a namespaced
//! [`TrainingRuntime`] or a cluster-scoped [`ClusterTrainingRuntime`]. Both
//! template kinds share [`TrainingRuntimeSpec`], which embeds a JobSet
//! template with one replicated job per role.

use std::borrow::Cow;
use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::JobTemplateSpec;
use k8s_openapi::ClusterResourceScope;
use kube::api::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Schedule timeout applied when a coscheduling policy leaves it unset.
pub const DEFAULT_SCHEDULE_TIMEOUT_SECONDS: i32 = 60;

/// Desired state of a training job
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "trainer.kubeflow.org",
    version = "v1alpha1",
    kind = "TrainJob",
    plural = "trainjobs",
    namespaced,
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct TrainJobSpec {
    /// Runtime template this job is instantiated from
    pub runtime_ref: RuntimeRef,
    /// Whether the job is suspended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
    /// Controller responsible for reconciling this job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
}

impl TrainJob {
    pub fn is_suspended(&self) -> bool {
        self.spec.suspend.unwrap_or(false)
    }
}

/// Reference from a `TrainJob` to its runtime template
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Reusable template shared by training runtimes of both scopes
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "trainer.kubeflow.org",
    version = "v1alpha1",
    kind = "TrainingRuntime",
    plural = "trainingruntimes",
    namespaced,
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRuntimeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ml_policy: Option<MlPolicy>,
    /// Gang-scheduling configuration; absent means pods are scheduled individually
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_group_policy: Option<PodGroupPolicy>,
    pub template: JobSetTemplateSpec,
}

/// Cluster-scoped variant of [`TrainingRuntime`]
///
/// Shares the spec with the namespaced kind, so the `Resource` impl is
/// written out rather than derived.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTrainingRuntime {
    pub metadata: ObjectMeta,
    pub spec: TrainingRuntimeSpec,
}

impl ClusterTrainingRuntime {
    pub fn new(name: &str, spec: TrainingRuntimeSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec,
        }
    }
}

impl kube::Resource for ClusterTrainingRuntime {
    type DynamicType = ();
    type Scope = ClusterResourceScope;

    fn group(_dt: &()) -> Cow<'_, str> {
        "trainer.kubeflow.org".into()
    }

    fn version(_dt: &()) -> Cow<'_, str> {
        "v1alpha1".into()
    }

    fn kind(_dt: &()) -> Cow<'_, str> {
        "ClusterTrainingRuntime".into()
    }

    fn plural(_dt: &()) -> Cow<'_, str> {
        "clustertrainingruntimes".into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MlPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_nodes: Option<i32>,
}

/// How the pods of a job are grouped for the scheduler
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodGroupPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coscheduling: Option<CoschedulingPodGroupPolicySource>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CoschedulingPodGroupPolicySource {
    /// Seconds the scheduler waits for the whole group before giving up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_timeout_seconds: Option<i32>,
}

impl CoschedulingPodGroupPolicySource {
    pub fn schedule_timeout_seconds(&self) -> i32 {
        self.schedule_timeout_seconds
            .unwrap_or(DEFAULT_SCHEDULE_TIMEOUT_SECONDS)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSetTemplateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,
    #[serde(default)]
    pub spec: JobSetSpec,
}

impl JobSetTemplateSpec {
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.labels.clone())
            .unwrap_or_default()
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.annotations.clone())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSetSpec {
    #[serde(default)]
    pub replicated_jobs: Vec<ReplicatedJob>,
}

/// One role of the job, stamped out `replicas` times
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedJob {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub template: JobTemplateSpec,
}

impl ReplicatedJob {
    /// Runtime class requested by the pod template, if any
    pub fn runtime_class_name(&self) -> Option<&str> {
        self.template
            .spec
            .as_ref()?
            .template
            .spec
            .as_ref()?
            .runtime_class_name
            .as_deref()
    }
}
