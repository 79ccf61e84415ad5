//! Field indexes over runtime templates keyed by container runtime class.
//!
//! When a `RuntimeClass` changes, the runtimes that reference it are found
//! through these indexes instead of scanning every template.

use api_types::ClusterObject;
use api_types::TrainingRuntimeSpec;

pub const TRAINING_RUNTIME_CONTAINER_RUNTIME_CLASS_KEY: &str =
    ".trainingRuntimeSpec.jobSetTemplateSpec.replicatedJobs.podTemplateSpec.runtimeClassName";

pub const CLUSTER_TRAINING_RUNTIME_CONTAINER_RUNTIME_CLASS_KEY: &str =
    ".clusterTrainingRuntimeSpec.jobSetTemplateSpec.replicatedJobs.podTemplateSpec.runtimeClassName";

/// Runtime classes declared by a `TrainingRuntime`, in replicated-job order.
///
/// Any other kind yields no keys.
pub fn index_training_runtime_container_runtime_class(obj: &ClusterObject) -> Vec<String> {
    match obj {
        ClusterObject::TrainingRuntime(runtime) => runtime_class_names(&runtime.spec),
        _ => Vec::new(),
    }
}

/// Runtime classes declared by a `ClusterTrainingRuntime`, in replicated-job order.
///
/// Any other kind yields no keys.
pub fn index_cluster_training_runtime_container_runtime_class(obj: &ClusterObject) -> Vec<String> {
    match obj {
        ClusterObject::ClusterTrainingRuntime(runtime) => runtime_class_names(&runtime.spec),
        _ => Vec::new(),
    }
}

// duplicates are kept, the index is positional
fn runtime_class_names(spec: &TrainingRuntimeSpec) -> Vec<String> {
    spec.template
        .spec
        .replicated_jobs
        .iter()
        .filter_map(|job| job.runtime_class_name())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use api_types::ClusterTrainingRuntime;
    use api_types::JobSetSpec;
    use api_types::JobSetTemplateSpec;
    use api_types::ReplicatedJob;
    use api_types::TrainingRuntime;
    use k8s_openapi::api::batch::v1::JobSpec;
    use k8s_openapi::api::batch::v1::JobTemplateSpec;
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::api::core::v1::PodTemplateSpec;
    use similar_asserts::assert_eq;

    use super::*;

    fn replicated_job(runtime_class: Option<&str>) -> ReplicatedJob {
        ReplicatedJob {
            template: JobTemplateSpec {
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        spec: Some(PodSpec {
                            runtime_class_name: runtime_class.map(str::to_string),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn spec(runtime_classes: &[Option<&str>]) -> TrainingRuntimeSpec {
        TrainingRuntimeSpec {
            template: JobSetTemplateSpec {
                spec: JobSetSpec {
                    replicated_jobs: runtime_classes.iter().map(|rc| replicated_job(*rc)).collect(),
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn training_runtime(runtime_classes: &[Option<&str>]) -> ClusterObject {
        TrainingRuntime::new("runtime", spec(runtime_classes)).into()
    }

    fn cluster_training_runtime(runtime_classes: &[Option<&str>]) -> ClusterObject {
        ClusterTrainingRuntime::new("runtime", spec(runtime_classes)).into()
    }

    #[test]
    fn training_runtime_index() {
        let cases: Vec<(&str, ClusterObject, Vec<&str>)> = vec![
            ("other kind", cluster_training_runtime(&[Some("a")]), vec![]),
            ("no replicated jobs", training_runtime(&[]), vec![]),
            (
                "single runtime class",
                training_runtime(&[Some("test-runtime-class")]),
                vec!["test-runtime-class"],
            ),
            (
                "multiple runtime classes",
                training_runtime(&[Some("test-runtime-class-1"), Some("test-runtime-class-2")]),
                vec!["test-runtime-class-1", "test-runtime-class-2"],
            ),
            (
                "undeclared entries are skipped",
                training_runtime(&[None, Some("a"), Some("b"), None]),
                vec!["a", "b"],
            ),
            (
                "duplicates are kept",
                training_runtime(&[Some("a"), Some("a")]),
                vec!["a", "a"],
            ),
        ];

        for (name, obj, want) in cases {
            assert_eq!(
                index_training_runtime_container_runtime_class(&obj),
                want,
                "case: {name}"
            );
        }
    }

    #[test]
    fn cluster_training_runtime_index() {
        let cases: Vec<(&str, ClusterObject, Vec<&str>)> = vec![
            ("other kind", training_runtime(&[Some("a")]), vec![]),
            ("no replicated jobs", cluster_training_runtime(&[]), vec![]),
            (
                "single runtime class",
                cluster_training_runtime(&[Some("cluster-test-runtime-class")]),
                vec!["cluster-test-runtime-class"],
            ),
            (
                "multiple runtime classes",
                cluster_training_runtime(&[
                    Some("cluster-test-runtime-class-1"),
                    Some("cluster-test-runtime-class-2"),
                ]),
                vec!["cluster-test-runtime-class-1", "cluster-test-runtime-class-2"],
            ),
        ];

        for (name, obj, want) in cases {
            assert_eq!(
                index_cluster_training_runtime_container_runtime_class(&obj),
                want,
                "case: {name}"
            );
        }
    }

    #[test]
    fn pod_groups_are_not_indexed() {
        let pod_group = api_types::PodGroup::new("demo", Default::default());
        assert!(index_training_runtime_container_runtime_class(&pod_group.into()).is_empty());
    }
}
