//! Platform (OpenShift) installation
//!
//! Installs run through the `openshift-install` binary, one child process per
//! cluster directory. Preparing the directory is a separate, synchronous step so
//! the orchestrator can finish every cluster's preparation before any install
//! starts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use odf_deploy_common::exec::{exec_checked, CommandExecutor};

use crate::{Error, Result};

/// File name the installer expects its configuration under
const INSTALL_CONFIG_FILE: &str = "install-config.yaml";

/// Everything a worker needs to install one cluster.
///
/// Moved into its worker and dropped when the worker finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerHandle {
    pub installer_binary: PathBuf,
    pub cluster_path: PathBuf,
    pub cluster_name: String,
    /// install-config.yaml copied into the cluster directory by the prereq step
    pub install_config: Option<PathBuf>,
}

/// Installs the platform into a cluster directory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformInstaller: Send + Sync {
    /// Prepare the cluster directory. Runs before any install starts.
    async fn deploy_prereq(&self, handle: &InstallerHandle) -> Result<()>;

    /// Run the install to completion
    async fn deploy(&self, handle: InstallerHandle, log_level: String) -> Result<()>;
}

/// Map a log level name onto the installer's `--log-level` values
pub fn installer_log_level(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
}

/// [`PlatformInstaller`] driving the `openshift-install` binary
pub struct OpenshiftInstaller {
    executor: Arc<dyn CommandExecutor>,
}

impl OpenshiftInstaller {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    fn create_cluster_args(cluster_path: &Path, log_level: &str) -> Vec<String> {
        vec![
            "create".to_string(),
            "cluster".to_string(),
            "--dir".to_string(),
            cluster_path.display().to_string(),
            "--log-level".to_string(),
            installer_log_level(log_level).to_string(),
        ]
    }
}

#[async_trait]
impl PlatformInstaller for OpenshiftInstaller {
    async fn deploy_prereq(&self, handle: &InstallerHandle) -> Result<()> {
        if !handle.installer_binary.exists() {
            return Err(Error::validation(format!(
                "installer binary not found: {}",
                handle.installer_binary.display()
            )));
        }

        tokio::fs::create_dir_all(&handle.cluster_path).await?;

        if let Some(install_config) = &handle.install_config {
            let target = handle.cluster_path.join(INSTALL_CONFIG_FILE);
            tokio::fs::copy(install_config, &target).await?;
            info!(
                cluster = %handle.cluster_name,
                path = %target.display(),
                "Copied install config"
            );
        }
        Ok(())
    }

    async fn deploy(&self, handle: InstallerHandle, log_level: String) -> Result<()> {
        info!(
            cluster = %handle.cluster_name,
            path = %handle.cluster_path.display(),
            "Deploying OCP cluster"
        );
        let program = handle.installer_binary.display().to_string();
        let args = Self::create_cluster_args(&handle.cluster_path, &log_level);
        exec_checked(self.executor.as_ref(), &program, &args, &[]).await?;
        info!(cluster = %handle.cluster_name, "OCP cluster deployed");
        Ok(())
    }
}
