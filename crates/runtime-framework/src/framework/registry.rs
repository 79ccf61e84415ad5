use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::PodGroupReader;
use crate::framework::FieldIndexer;
use crate::framework::FrameworkError;
use crate::framework::Plugin;
use crate::plugins::coscheduling::Coscheduling;

/// Constructs a plugin from the cluster client and field indexer supplied
/// by the host.
pub type PluginFactory =
    fn(Arc<dyn PodGroupReader>, &dyn FieldIndexer) -> Result<Arc<dyn Plugin>, FrameworkError>;

/// Static map from plugin name to factory
#[derive(Clone)]
pub struct Registry {
    factories: BTreeMap<&'static str, PluginFactory>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Adds a factory, replacing any earlier one registered under `name`.
    pub fn register(&mut self, name: &'static str, factory: PluginFactory) -> &mut Self {
        self.factories.insert(name, factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<PluginFactory> {
        self.factories.get(name).copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Coscheduling::NAME, |client, indexer| {
            let plugin: Arc<dyn Plugin> = Arc::new(Coscheduling::new(client, indexer)?);
            Ok(plugin)
        });
        registry
    }
}
