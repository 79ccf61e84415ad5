use core::error::Error;
use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;

use crate::plugins::coscheduling::Coscheduling;

pub const DEFAULT_FIELD_MANAGER: &str = "trainer";

#[derive(Debug, derive_more::Display)]
pub enum ConfigError {
    #[display("Failed to read configuration file: {path}")]
    Read { path: String },
    #[display("Failed to parse configuration")]
    Parse,
}

impl Error for ConfigError {}

/// Runtime framework configuration.
///
/// Loaded from YAML by hosts that keep a config file, or flattened into the
/// host's command line, where every field can also come from the environment.
#[derive(Debug, Clone, PartialEq, Deserialize, clap::Args)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameworkConfig {
    #[arg(
        long = "enabled-plugin",
        env = "TRAINER_ENABLED_PLUGINS",
        value_delimiter = ',',
        default_value = Coscheduling::NAME,
        help = "Runtime plugins to enable, in execution order"
    )]
    pub enabled_plugins: Vec<String>,

    #[arg(
        long,
        env = "TRAINER_FIELD_MANAGER",
        default_value = DEFAULT_FIELD_MANAGER,
        help = "Field manager name used for server-side apply"
    )]
    pub field_manager: String,

    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            enabled_plugins: vec![Coscheduling::NAME.to_string()],
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            kubeconfig: None,
        }
    }
}

impl FrameworkConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, Report<ConfigError>> {
        serde_yaml::from_str(raw).change_context(ConfigError::Parse)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Report<ConfigError>> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).change_context(ConfigError::Read {
            path: path.display().to_string(),
        })?;
        Self::from_yaml_str(&raw).attach_printable_lazy(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::Parser;
    use similar_asserts::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        framework: FrameworkConfig,
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = FrameworkConfig::from_yaml_str("fieldManager: kubeflow-trainer\n").unwrap();
        assert_eq!(config.field_manager, "kubeflow-trainer");
        assert_eq!(config.enabled_plugins, vec!["Coscheduling".to_string()]);
        assert_eq!(config.kubeconfig, None);
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "enabledPlugins: []").unwrap();
        writeln!(file, "kubeconfig: /etc/trainer/kubeconfig").unwrap();

        let config = FrameworkConfig::from_path(file.path()).unwrap();
        assert!(config.enabled_plugins.is_empty());
        assert_eq!(config.kubeconfig, Some(PathBuf::from("/etc/trainer/kubeconfig")));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let report = FrameworkConfig::from_yaml_str("enabledPlugins: {").unwrap_err();
        assert!(matches!(report.current_context(), ConfigError::Parse));
    }

    #[test]
    fn command_line_defaults_match_serde_defaults() {
        let cli = TestCli::parse_from(["trainer"]);
        assert_eq!(cli.framework.enabled_plugins, FrameworkConfig::default().enabled_plugins);
        assert_eq!(cli.framework.field_manager, DEFAULT_FIELD_MANAGER);

        let cli = TestCli::parse_from(["trainer", "--enabled-plugin", "Coscheduling,Volcano"]);
        assert_eq!(
            cli.framework.enabled_plugins,
            vec!["Coscheduling".to_string(), "Volcano".to_string()]
        );
    }
}
