//! Plugin framework surface.
//!
//! Plugins implement a closed set of capability traits. The framework asks
//! each plugin for the capabilities it has through the accessor methods on
//! [`Plugin`] and invokes them at the matching extension point:
//!
//! - [`EnforcePodGroupPolicyPlugin`]: while the job's [`Info`] is assembled
//! - [`ComponentBuilderPlugin`]: during the build phase, returning objects
//!   the framework applies afterwards

mod registry;

use core::error::Error;
use std::sync::Arc;

use api_types::ClusterObject;
use api_types::TrainJob;
use async_trait::async_trait;
use error_stack::Report;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

pub use registry::PluginFactory;
pub use registry::Registry;

use crate::client::ClientError;
use crate::client::ObjectApplier;
use crate::client::PodGroupReader;
use crate::config::FrameworkConfig;
use crate::runtime::Info;

/// Extracts index keys from an object; an empty result means "not indexed".
pub type IndexFn = fn(&ClusterObject) -> Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum FrameworkError {
    #[display("Unknown plugin: {name}")]
    UnknownPlugin { name: String },
    #[display("Field index {field} is already registered for {kind}")]
    IndexConflict { kind: String, field: String },
}

impl Error for FrameworkError {}

/// Base trait of every plugin
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn as_enforce_pod_group_policy(&self) -> Option<&dyn EnforcePodGroupPolicyPlugin> {
        None
    }

    fn as_component_builder(&self) -> Option<&dyn ComponentBuilderPlugin> {
        None
    }
}

pub trait EnforcePodGroupPolicyPlugin: Plugin {
    fn enforce_pod_group_policy(
        &self,
        info: Option<&mut Info>,
        job: &TrainJob,
    ) -> Result<(), FrameworkError>;
}

#[async_trait]
pub trait ComponentBuilderPlugin: Plugin {
    /// Returns the objects the job needs that do not exist yet.
    ///
    /// Builders only read from the cluster; the framework persists what they
    /// return.
    async fn build(
        &self,
        cancel: &CancellationToken,
        info: Option<&Info>,
        job: &TrainJob,
    ) -> Result<Vec<ClusterObject>, ClientError>;
}

/// Registration side of the object cache's field indexes
pub trait FieldIndexer: Send + Sync {
    fn index_field(&self, kind: &str, field: &str, extract: IndexFn)
        -> Result<(), FrameworkError>;
}

/// The set of enabled plugins, dispatched by capability
pub struct Framework {
    plugins: Vec<Arc<dyn Plugin>>,
    field_manager: String,
}

impl Framework {
    /// Instantiates every plugin enabled in `config` from `registry`.
    ///
    /// # Errors
    ///
    /// - [`FrameworkError::UnknownPlugin`] if a configured plugin is not registered
    /// - any error a plugin factory returns, e.g. [`FrameworkError::IndexConflict`]
    pub fn new(
        registry: &Registry,
        config: &FrameworkConfig,
        client: Arc<dyn PodGroupReader>,
        indexer: &dyn FieldIndexer,
    ) -> Result<Self, Report<FrameworkError>> {
        let mut plugins = Vec::with_capacity(config.enabled_plugins.len());
        for name in &config.enabled_plugins {
            let factory = registry.get(name).ok_or_else(|| {
                Report::new(FrameworkError::UnknownPlugin { name: name.clone() })
                    .attach_printable(format!("registered plugins: {:?}", registry.names()))
            })?;
            let plugin = factory(client.clone(), indexer).map_err(|e| {
                Report::new(e).attach_printable(format!("while constructing plugin {name}"))
            })?;
            info!(plugin = plugin.name(), "Enabled runtime plugin");
            plugins.push(plugin);
        }

        Ok(Self {
            plugins,
            field_manager: config.field_manager.clone(),
        })
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn run_enforce_pod_group_policy_plugins(
        &self,
        mut info: Option<&mut Info>,
        job: &TrainJob,
    ) -> Result<(), FrameworkError> {
        for plugin in &self.plugins {
            if let Some(enforcer) = plugin.as_enforce_pod_group_policy() {
                enforcer.enforce_pod_group_policy(info.as_deref_mut(), job)?;
            }
        }
        Ok(())
    }

    /// Runs every component builder in order and concatenates their output.
    ///
    /// Stops at the first failing builder and returns its error unchanged.
    pub async fn run_component_builder_plugins(
        &self,
        cancel: &CancellationToken,
        info: Option<&Info>,
        job: &TrainJob,
    ) -> Result<Vec<ClusterObject>, ClientError> {
        let mut objects = Vec::new();
        for plugin in &self.plugins {
            if let Some(builder) = plugin.as_component_builder() {
                let built = builder.build(cancel, info, job).await?;
                debug!(
                    plugin = plugin.name(),
                    count = built.len(),
                    "Component builder finished"
                );
                objects.extend(built);
            }
        }
        Ok(objects)
    }

    /// Persists built objects through server-side apply, in order.
    pub async fn apply(
        &self,
        applier: &dyn ObjectApplier,
        objects: &[ClusterObject],
    ) -> Result<Vec<ClusterObject>, ClientError> {
        let mut applied = Vec::with_capacity(objects.len());
        for object in objects {
            info!(object = %object, "Applying built object");
            applied.push(applier.apply(object, &self.field_manager).await?);
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use api_types::CoschedulingPodGroupPolicySource;
    use api_types::PodGroupPolicy;
    use api_types::TrainJobSpec;
    use api_types::POD_GROUP_LABEL;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::plugins::coscheduling::Coscheduling;
    use crate::runtime::PodSet;
    use crate::runtime::RuntimePolicy;
    use crate::testing::FakeClient;
    use crate::testing::FakeIndexer;

    fn coscheduling_info() -> Info {
        Info::new(
            BTreeMap::new(),
            BTreeMap::new(),
            RuntimePolicy {
                pod_group_policy: Some(PodGroupPolicy {
                    coscheduling: Some(CoschedulingPodGroupPolicySource {
                        schedule_timeout_seconds: Some(30),
                    }),
                }),
                ..Default::default()
            },
            vec![PodSet::new("node", 2)],
        )
    }

    fn job() -> TrainJob {
        let mut job = TrainJob::new("demo", TrainJobSpec::default());
        job.metadata.namespace = Some("default".to_string());
        job
    }

    fn framework(client: Arc<FakeClient>) -> Framework {
        Framework::new(
            &Registry::default(),
            &FrameworkConfig::default(),
            client,
            &FakeIndexer::default(),
        )
        .unwrap()
    }

    #[test]
    fn unknown_plugin_is_rejected() {
        let config = FrameworkConfig {
            enabled_plugins: vec!["Coscheduling".to_string(), "Volcano".to_string()],
            ..Default::default()
        };
        let result = Framework::new(
            &Registry::default(),
            &config,
            Arc::new(FakeClient::default()),
            &FakeIndexer::default(),
        );
        let Err(report) = result else {
            panic!("expected unknown plugin error");
        };
        assert_eq!(
            report.current_context(),
            &FrameworkError::UnknownPlugin {
                name: "Volcano".to_string()
            }
        );
    }

    #[test]
    fn index_conflict_from_a_factory_surfaces_from_new() {
        let indexer = FakeIndexer::default();
        Coscheduling::new(Arc::new(FakeClient::default()), &indexer).unwrap();

        let result = Framework::new(
            &Registry::default(),
            &FrameworkConfig::default(),
            Arc::new(FakeClient::default()),
            &indexer,
        );
        let Err(report) = result else {
            panic!("expected index conflict");
        };
        assert!(matches!(
            report.current_context(),
            FrameworkError::IndexConflict { kind, .. } if kind == "TrainingRuntime"
        ));
        assert_eq!(
            report.current_context().to_string(),
            format!(
                "Field index {} is already registered for TrainingRuntime",
                crate::plugins::coscheduling::TRAINING_RUNTIME_CONTAINER_RUNTIME_CLASS_KEY
            )
        );
    }

    #[test]
    fn enforce_plugins_label_the_plan() {
        let framework = framework(Arc::new(FakeClient::default()));
        let mut info = coscheduling_info();

        framework
            .run_enforce_pod_group_policy_plugins(Some(&mut info), &job())
            .unwrap();

        assert_eq!(
            info.scheduler.pod_labels,
            BTreeMap::from([(POD_GROUP_LABEL.to_string(), "demo".to_string())])
        );
    }

    #[test(tokio::test)]
    async fn build_then_apply_reaches_steady_state() {
        let client = Arc::new(FakeClient::default());
        let framework = framework(client.clone());
        let cancel = CancellationToken::new();
        let info = coscheduling_info();

        let built = framework
            .run_component_builder_plugins(&cancel, Some(&info), &job())
            .await
            .unwrap();
        assert_eq!(built.len(), 1);

        framework.apply(&*client, &built).await.unwrap();
        assert_eq!(client.applied_field_managers(), vec!["trainer".to_string()]);
        assert_eq!(client.applied(), built);

        let rebuilt = framework
            .run_component_builder_plugins(&cancel, Some(&info), &job())
            .await
            .unwrap();
        assert!(rebuilt.is_empty());
    }

    #[test(tokio::test)]
    async fn builder_errors_are_returned_unchanged() {
        let client = Arc::new(FakeClient::default());
        let injected = ClientError::Transport {
            message: "connection reset".to_string(),
        };
        client.fail_pod_group_reads(injected.clone());
        let framework = framework(client);

        let info = coscheduling_info();
        let err = framework
            .run_component_builder_plugins(&CancellationToken::new(), Some(&info), &job())
            .await
            .unwrap_err();
        assert_eq!(err, injected);
    }
}
