//! `scheduling.x-k8s.io/v1alpha1` resources owned by scheduler-plugins

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Pod label the coscheduling scheduler uses to find the members of a group.
///
/// Must match the scheduler's own constant exactly; nothing validates it.
pub const POD_GROUP_LABEL: &str = "scheduling.x-k8s.io/pod-group";

/// Gang-scheduling requirements for one group of pods
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "scheduling.x-k8s.io",
    version = "v1alpha1",
    kind = "PodGroup",
    plural = "podgroups",
    shortname = "pg",
    namespaced,
    status = "PodGroupStatus",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct PodGroupSpec {
    /// Minimum number of pods that must be schedulable together
    pub min_member: i32,
    /// Minimum aggregate resources; an empty map means no explicit floor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_resources: Option<BTreeMap<String, Quantity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_timeout_seconds: Option<i32>,
}

/// Observed state, written by the scheduler only
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodGroupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default)]
    pub running: i32,
    #[serde(default)]
    pub succeeded: i32,
    #[serde(default)]
    pub failed: i32,
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn empty_min_resources_is_serialized() {
        let pod_group = PodGroup::new(
            "demo",
            PodGroupSpec {
                min_member: 1,
                min_resources: Some(BTreeMap::new()),
                schedule_timeout_seconds: Some(30),
            },
        );
        let value = serde_json::to_value(&pod_group).unwrap();
        assert_eq!(value["apiVersion"], "scheduling.x-k8s.io/v1alpha1");
        assert_eq!(value["spec"]["minResources"], serde_json::json!({}));
        assert_eq!(value["spec"]["minMember"], 1);
        assert_eq!(value["spec"]["scheduleTimeoutSeconds"], 30);
    }
}
