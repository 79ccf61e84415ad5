//! Per-reconciliation scheduling plan of a `TrainJob`
//!
//! An [`Info`] is computed fresh for every reconciliation pass from the
//! job's runtime template. Plugins read the pod layout and policy from it and
//! may add labels that end up on the job's pods.

use std::collections::BTreeMap;

use api_types::MlPolicy;
use api_types::PodGroupPolicy;
use api_types::ReplicatedJob;
use api_types::TrainJob;
use api_types::TrainingRuntimeSpec;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::ResourceRequirements;

use crate::quantity::add_resource_list;
use crate::quantity::max_resource_list;
use crate::quantity::QuantityError;
use crate::quantity::ResourceList;

/// Replica count assumed for a pod set that does not declare one.
pub const DEFAULT_POD_SET_COUNT: i32 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Info {
    /// Labels propagated to the generated JobSet
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub runtime_policy: RuntimePolicy,
    pub template_spec: TemplateSpec,
    pub scheduler: Scheduler,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimePolicy {
    pub ml_policy: Option<MlPolicy>,
    pub pod_group_policy: Option<PodGroupPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSpec {
    pub pod_sets: Vec<PodSet>,
}

/// Scheduling hints applied to every pod of the job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scheduler {
    pub pod_labels: BTreeMap<String, String>,
}

/// A named role of the job and how many pods it runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PodSet {
    pub name: String,
    pub count: Option<i32>,
    /// Resources requested by a single pod of this set
    pub single_pod_requests: ResourceList,
}

impl PodSet {
    pub fn new(name: impl Into<String>, count: i32) -> Self {
        Self {
            name: name.into(),
            count: Some(count),
            single_pod_requests: ResourceList::new(),
        }
    }

    pub fn with_requests(mut self, requests: ResourceList) -> Self {
        self.single_pod_requests = requests;
        self
    }

    pub fn count_or_default(&self) -> i32 {
        self.count.unwrap_or(DEFAULT_POD_SET_COUNT)
    }

    /// Derives a pod set from a replicated job of a runtime template.
    ///
    /// A replicated job runs `replicas` jobs of `parallelism` pods each.
    pub fn from_replicated_job(job: &ReplicatedJob) -> Result<Self, QuantityError> {
        let job_spec = job.template.spec.as_ref();
        let replicas = job.replicas.unwrap_or(1);
        let parallelism = job_spec.and_then(|spec| spec.parallelism).unwrap_or(1);
        let single_pod_requests = match job_spec.and_then(|spec| spec.template.spec.as_ref()) {
            Some(pod_spec) => pod_requests(pod_spec)?,
            None => ResourceList::new(),
        };

        Ok(Self {
            name: job.name.clone(),
            count: Some(replicas.saturating_mul(parallelism)),
            single_pod_requests,
        })
    }
}

impl Info {
    pub fn new(
        labels: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
        runtime_policy: RuntimePolicy,
        pod_sets: Vec<PodSet>,
    ) -> Self {
        Self {
            labels,
            annotations,
            runtime_policy,
            template_spec: TemplateSpec { pod_sets },
            scheduler: Scheduler::default(),
        }
    }

    /// Builds the plan for `job` from the spec of its runtime template.
    ///
    /// Labels and annotations of the job are layered over those of the
    /// template.
    pub fn from_runtime_spec(
        spec: &TrainingRuntimeSpec,
        job: &TrainJob,
    ) -> Result<Self, QuantityError> {
        let mut labels = spec.template.labels();
        labels.extend(job.metadata.labels.clone().unwrap_or_default());
        let mut annotations = spec.template.annotations();
        annotations.extend(job.metadata.annotations.clone().unwrap_or_default());

        let pod_sets = spec
            .template
            .spec
            .replicated_jobs
            .iter()
            .map(PodSet::from_replicated_job)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(
            labels,
            annotations,
            RuntimePolicy {
                ml_policy: spec.ml_policy.clone(),
                pod_group_policy: spec.pod_group_policy.clone(),
            },
            pod_sets,
        ))
    }

    /// Whether the job opted into gang scheduling through the coscheduling source
    pub fn coscheduling_enabled(&self) -> bool {
        self.runtime_policy
            .pod_group_policy
            .as_ref()
            .is_some_and(|policy| policy.coscheduling.is_some())
    }
}

/// Effective resource requests of one pod.
///
/// Regular containers run together, so their requests add up. Init
/// containers run one at a time before them, so each only raises the floor.
/// Pod overhead is added on top.
pub fn pod_requests(spec: &PodSpec) -> Result<ResourceList, QuantityError> {
    let mut requests = ResourceList::new();
    for container in &spec.containers {
        add_resource_list(&mut requests, container_requests(&container.resources))?;
    }
    for container in spec.init_containers.iter().flatten() {
        max_resource_list(&mut requests, container_requests(&container.resources))?;
    }
    if let Some(overhead) = &spec.overhead {
        add_resource_list(&mut requests, overhead)?;
    }
    Ok(requests)
}

fn container_requests(resources: &Option<ResourceRequirements>) -> &ResourceList {
    static EMPTY: ResourceList = ResourceList::new();
    resources
        .as_ref()
        .and_then(|r| r.requests.as_ref())
        .unwrap_or(&EMPTY)
}
