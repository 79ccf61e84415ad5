use std::path::Path;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Config;
use tracing::debug;

use crate::client::ClientError;
use crate::client::KubeClient;
use crate::config::FrameworkConfig;

fn transport(message: String) -> ClientError {
    ClientError::Transport { message }
}

impl KubeClient {
    /// Connects with the kubeconfig named in `config`, or with the in-cluster
    /// service account / `~/.kube/config` when none is set.
    pub async fn from_config(config: &FrameworkConfig) -> Result<Self, Report<ClientError>> {
        let kube_config = match config.kubeconfig.as_deref() {
            Some(path) => load_kubeconfig(path).await?,
            None => Config::infer()
                .await
                .change_context(transport("No in-cluster or default kubeconfig".to_string()))?,
        };
        debug!(cluster_url = %kube_config.cluster_url, "Connecting to the API server");

        let client = kube::Client::try_from(kube_config)
            .change_context(transport("Failed to build Kubernetes client".to_string()))?;
        Ok(Self::new(client))
    }
}

async fn load_kubeconfig(path: &Path) -> Result<Config, Report<ClientError>> {
    let kubeconfig = Kubeconfig::read_from(path).change_context(transport(format!(
        "Failed to read kubeconfig {}",
        path.display()
    )))?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .change_context(transport(format!(
            "Kubeconfig {} has no usable context",
            path.display()
        )))
}
