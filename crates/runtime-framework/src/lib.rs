//! Runtime plugin framework for `TrainJob` reconciliation.
//!
//! A host controller computes an [`runtime::Info`] for each job, lets the
//! enabled plugins shape it, collects the objects the component builders
//! return and applies them with [`framework::Framework::apply`].
//!
//! The crate only emits `tracing` events. Hosts install a subscriber, usually
//! with `utils::logging::init()` from this workspace, before building the
//! [`Framework`] from a [`FrameworkConfig`] and [`KubeClient::from_config`].

pub mod client;
pub mod config;
pub mod framework;
mod kube_client;
pub mod plugins;
pub mod quantity;
pub mod runtime;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::ClientError;
pub use client::KubeClient;
pub use config::FrameworkConfig;
pub use framework::Framework;
pub use framework::Registry;
pub use runtime::Info;
