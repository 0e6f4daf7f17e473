//! Kubernetes client helpers and the cluster reachability probe

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::{Error, Result, KUBECONFIG_RELATIVE_PATH};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Probe timeouts are short: an unreachable API server means "not running"
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Path of the admin kubeconfig the installer writes into a cluster directory
pub fn cluster_kubeconfig(cluster_path: &Path) -> PathBuf {
    cluster_path.join(KUBECONFIG_RELATIVE_PATH)
}

/// Split an apiVersion into (group, version); core resources have an empty group
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Create a kube client from optional kubeconfig path
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::config(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("failed to infer config: {}", e)))?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(Error::from)
}

/// Trait for checking whether a cluster is up
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    /// Returns true if the cluster installed into `cluster_path` answers API requests
    async fn is_running(&self, cluster_path: &Path) -> bool;
}

/// Probe that lists namespaces using the cluster directory's admin kubeconfig
#[derive(Debug, Clone, Default)]
pub struct KubeClusterProbe;

impl KubeClusterProbe {
    /// Create a new probe
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClusterProbe for KubeClusterProbe {
    async fn is_running(&self, cluster_path: &Path) -> bool {
        let kubeconfig = cluster_kubeconfig(cluster_path);
        if !kubeconfig.exists() {
            debug!(path = %kubeconfig.display(), "No kubeconfig, cluster not running");
            return false;
        }

        let client = match create_client_with_timeout(
            Some(&kubeconfig),
            PROBE_CONNECT_TIMEOUT,
            PROBE_READ_TIMEOUT,
        )
        .await
        {
            Ok(client) => client,
            Err(e) => {
                debug!(error = %e, "Failed to build client for probe");
                return false;
            }
        };

        let namespaces: Api<Namespace> = Api::all(client);
        match namespaces.list(&ListParams::default().limit(1)).await {
            Ok(_) => true,
            Err(e) => {
                debug!(path = %cluster_path.display(), error = %e, "Cluster API not reachable");
                false
            }
        }
    }
}
