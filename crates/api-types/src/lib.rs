//! Shared API type definitions
//!
//! This crate contains the Kubernetes object model shared by the training
//! runtime framework: the `TrainJob` and runtime template CRDs owned by the
//! trainer, and the `PodGroup` descriptor owned by the scheduler-plugins
//! coscheduling scheduler.

pub mod scheduling;
pub mod trainer;

pub use scheduling::PodGroup;
pub use scheduling::PodGroupSpec;
pub use scheduling::PodGroupStatus;
pub use scheduling::POD_GROUP_LABEL;
pub use trainer::ClusterTrainingRuntime;
pub use trainer::CoschedulingPodGroupPolicySource;
pub use trainer::JobSetSpec;
pub use trainer::JobSetTemplateSpec;
pub use trainer::MlPolicy;
pub use trainer::PodGroupPolicy;
pub use trainer::ReplicatedJob;
pub use trainer::RuntimeRef;
pub use trainer::TrainJob;
pub use trainer::TrainJobSpec;
pub use trainer::TrainingRuntime;
pub use trainer::TrainingRuntimeSpec;

/// Any object the runtime framework reads, indexes or emits.
///
/// Index functions and component builders work on this closed set of kinds
/// instead of an untyped object, so a function registered for one kind can
/// recognise every other kind and treat it as "not applicable".
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterObject {
    TrainJob(Box<TrainJob>),
    TrainingRuntime(Box<TrainingRuntime>),
    ClusterTrainingRuntime(Box<ClusterTrainingRuntime>),
    PodGroup(Box<PodGroup>),
}

impl ClusterObject {
    /// Kind name as it appears in the object's `kind` field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TrainJob(_) => "TrainJob",
            Self::TrainingRuntime(_) => "TrainingRuntime",
            Self::ClusterTrainingRuntime(_) => "ClusterTrainingRuntime",
            Self::PodGroup(_) => "PodGroup",
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata().name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    fn metadata(&self) -> &kube::api::ObjectMeta {
        match self {
            Self::TrainJob(obj) => &obj.metadata,
            Self::TrainingRuntime(obj) => &obj.metadata,
            Self::ClusterTrainingRuntime(obj) => &obj.metadata,
            Self::PodGroup(obj) => &obj.metadata,
        }
    }
}

impl std::fmt::Display for ClusterObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.namespace(), self.name()) {
            (Some(ns), Some(name)) => write!(f, "{}/{ns}/{name}", self.kind()),
            (None, Some(name)) => write!(f, "{}/{name}", self.kind()),
            _ => write!(f, "{}/<unnamed>", self.kind()),
        }
    }
}

impl From<PodGroup> for ClusterObject {
    fn from(value: PodGroup) -> Self {
        Self::PodGroup(Box::new(value))
    }
}

impl From<TrainingRuntime> for ClusterObject {
    fn from(value: TrainingRuntime) -> Self {
        Self::TrainingRuntime(Box::new(value))
    }
}

impl From<ClusterTrainingRuntime> for ClusterObject {
    fn from(value: ClusterTrainingRuntime) -> Self {
        Self::ClusterTrainingRuntime(Box::new(value))
    }
}

impl From<TrainJob> for ClusterObject {
    fn from(value: TrainJob) -> Self {
        Self::TrainJob(Box::new(value))
    }
}
