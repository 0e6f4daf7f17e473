//! Multi-cluster deployment
//!
//! Platform installs run as one worker task per cluster. Every cluster's
//! prerequisite step finishes before any worker starts; the coordinator then
//! joins all workers and re-probes every cluster to see which ones came up.

pub mod ocp;
pub mod ocs;

use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use odf_deploy_common::kube_utils::ClusterProbe;

use crate::config::ClusterContext;
use crate::Error;

use self::ocp::{InstallerHandle, PlatformInstaller};

/// Outcome of a multi-cluster platform deployment
#[derive(Debug, Default)]
pub struct DeploymentReport {
    /// Indices of clusters reachable after all workers finished
    pub available: BTreeSet<usize>,
    /// Indices of clusters whose install worker was started
    pub attempted: BTreeSet<usize>,
    /// Failure message per cluster whose prereq or worker failed
    pub failures: BTreeMap<usize, String>,
}

impl DeploymentReport {
    /// Requested clusters that are not available, in ascending order
    pub fn missing(&self, requested: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let requested: BTreeSet<usize> = requested.into_iter().collect();
        requested.difference(&self.available).copied().collect()
    }
}

/// Installs the platform on every cluster that needs it
pub struct ClusterDeploymentOrchestrator {
    contexts: Vec<ClusterContext>,
    installer_binary: PathBuf,
    installer: Arc<dyn PlatformInstaller>,
    probe: Arc<dyn ClusterProbe>,
}

impl ClusterDeploymentOrchestrator {
    pub fn new(
        contexts: Vec<ClusterContext>,
        installer_binary: PathBuf,
        installer: Arc<dyn PlatformInstaller>,
        probe: Arc<dyn ClusterProbe>,
    ) -> Self {
        Self {
            contexts,
            installer_binary,
            installer,
            probe,
        }
    }

    fn handle_for(&self, ctx: &ClusterContext) -> InstallerHandle {
        InstallerHandle {
            installer_binary: self.installer_binary.clone(),
            cluster_path: ctx.cluster_path().to_path_buf(),
            cluster_name: ctx.name().to_string(),
            install_config: ctx.env_data.install_config.clone(),
        }
    }

    /// Deploy every cluster that is neither skipped nor already running.
    ///
    /// Worker failures never abort the run; they are recorded in the report
    /// and surface as clusters missing from [`DeploymentReport::available`].
    pub async fn deploy_all(&self, log_level: &str) -> DeploymentReport {
        let mut report = DeploymentReport::default();
        let mut queued = Vec::new();

        for ctx in &self.contexts {
            if ctx.skip_deployment() {
                info!(cluster = ctx.name(), index = ctx.index, "Skipping OCP deployment");
                continue;
            }
            if self.probe.is_running(ctx.cluster_path()).await {
                warn!(
                    cluster = ctx.name(),
                    path = %ctx.cluster_path().display(),
                    "OCP cluster is already running, skipping installation"
                );
                continue;
            }

            let handle = self.handle_for(ctx);
            if let Err(e) = self.installer.deploy_prereq(&handle).await {
                error!(cluster = ctx.name(), error = %e, "OCP prerequisites failed");
                report.failures.insert(ctx.index, e.to_string());
                continue;
            }
            queued.push((ctx.index, handle));
        }

        let mut workers = JoinSet::new();
        for (index, handle) in queued {
            let installer = self.installer.clone();
            let log_level = log_level.to_string();
            workers.spawn(async move {
                let deploy = async move { installer.deploy(handle, log_level).await };
                let outcome = AssertUnwindSafe(deploy)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(Error::command_failed("deployment worker panicked")));
                (index, outcome)
            });
            report.attempted.insert(index);
        }
        info!(workers = workers.len(), "Started OCP deployment workers");

        while let Some(joined) = workers.join_next().await {
            let (index, outcome) = match joined {
                Ok(joined) => joined,
                Err(e) => {
                    error!(error = %e, "Deployment worker could not be joined");
                    continue;
                }
            };
            match outcome {
                Ok(()) => info!(index, "OCP deployment worker finished"),
                Err(e) => {
                    error!(index, error = %e, "OCP deployment worker failed");
                    report.failures.insert(index, e.to_string());
                }
            }
        }

        for ctx in &self.contexts {
            if self.probe.is_running(ctx.cluster_path()).await {
                report.available.insert(ctx.index);
            }
        }
        info!(available = ?report.available, "OCP deployment finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::ocp::MockPlatformInstaller;
    use crate::config::{DeploymentConfig, EnvData};
    use crate::Result;
    use async_trait::async_trait;
    use odf_deploy_common::kube_utils::MockClusterProbe;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;

    fn ctx(index: usize, name: &str, skip: bool) -> ClusterContext {
        ClusterContext {
            index,
            env_data: EnvData {
                cluster_name: name.to_string(),
                cluster_path: PathBuf::from(format!("/clusters/{name}")),
                skip_ocp_deployment: skip,
                ocs_version: "4.9".parse().unwrap(),
                enable_ocs_plugin: false,
                install_config: None,
            },
            deployment: DeploymentConfig::default(),
        }
    }

    /// Probe backed by a mutable set of running cluster paths
    #[derive(Clone, Default)]
    struct FakeProbe {
        running: Arc<Mutex<HashSet<PathBuf>>>,
        probes: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl FakeProbe {
        fn with_running(paths: &[&str]) -> Self {
            let probe = Self::default();
            probe
                .running
                .lock()
                .unwrap()
                .extend(paths.iter().map(PathBuf::from));
            probe
        }
    }

    #[async_trait]
    impl ClusterProbe for FakeProbe {
        async fn is_running(&self, cluster_path: &Path) -> bool {
            self.probes.lock().unwrap().push(cluster_path.to_path_buf());
            self.running.lock().unwrap().contains(cluster_path)
        }
    }

    /// Installer recording the order of prereq and deploy calls.
    ///
    /// A successful deploy marks the cluster running in the shared probe.
    struct RecordingInstaller {
        events: Arc<Mutex<Vec<String>>>,
        probe: FakeProbe,
        failing: HashSet<String>,
    }

    #[async_trait]
    impl PlatformInstaller for RecordingInstaller {
        async fn deploy_prereq(&self, handle: &InstallerHandle) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("prereq:{}", handle.cluster_name));
            Ok(())
        }

        async fn deploy(&self, handle: InstallerHandle, _log_level: String) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("deploy:{}", handle.cluster_name));
            tokio::task::yield_now().await;
            if self.failing.contains(&handle.cluster_name) {
                return Err(Error::command_failed("installer exited with 1"));
            }
            self.probe
                .running
                .lock()
                .unwrap()
                .insert(handle.cluster_path.clone());
            Ok(())
        }
    }

    fn recording(probe: &FakeProbe, failing: &[&str]) -> (Arc<Mutex<Vec<String>>>, Arc<RecordingInstaller>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let installer = Arc::new(RecordingInstaller {
            events: events.clone(),
            probe: probe.clone(),
            failing: failing.iter().map(|s| s.to_string()).collect(),
        });
        (events, installer)
    }

    #[test]
    fn missing_lists_requested_but_unavailable() {
        let report = DeploymentReport {
            available: [0, 2].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(report.missing(0..3), vec![1]);
        assert!(report.missing([0, 2]).is_empty());
    }

    #[tokio::test]
    async fn skipped_running_and_new_clusters() {
        // A is skipped but running, B is already running, C needs an install
        let probe = FakeProbe::with_running(&["/clusters/a", "/clusters/b"]);
        let (events, installer) = recording(&probe, &[]);
        let orchestrator = ClusterDeploymentOrchestrator::new(
            vec![ctx(0, "a", true), ctx(1, "b", false), ctx(2, "c", false)],
            PathBuf::from("/bin/openshift-install"),
            installer,
            Arc::new(probe),
        );

        let report = orchestrator.deploy_all("INFO").await;

        assert_eq!(
            *events.lock().unwrap(),
            vec!["prereq:c".to_string(), "deploy:c".to_string()]
        );
        assert_eq!(report.attempted, [2].into_iter().collect());
        assert_eq!(report.available, [0, 1, 2].into_iter().collect());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn all_prereqs_finish_before_any_deploy() {
        let probe = FakeProbe::default();
        let (events, installer) = recording(&probe, &[]);
        let orchestrator = ClusterDeploymentOrchestrator::new(
            vec![ctx(0, "a", false), ctx(1, "b", false), ctx(2, "c", false)],
            PathBuf::from("/bin/openshift-install"),
            installer,
            Arc::new(probe),
        );

        orchestrator.deploy_all("INFO").await;

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(&events[..3], ["prereq:a", "prereq:b", "prereq:c"]);
        let deployed: HashSet<&str> = events[3..].iter().map(String::as_str).collect();
        assert_eq!(
            deployed,
            ["deploy:a", "deploy:b", "deploy:c"].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn worker_failure_is_reported_not_raised() {
        let probe = FakeProbe::default();
        let (_events, installer) = recording(&probe, &["b"]);
        let orchestrator = ClusterDeploymentOrchestrator::new(
            vec![ctx(0, "a", false), ctx(1, "b", false)],
            PathBuf::from("/bin/openshift-install"),
            installer,
            Arc::new(probe),
        );

        let report = orchestrator.deploy_all("INFO").await;

        assert_eq!(report.available, [0].into_iter().collect());
        assert!(report.failures[&1].contains("installer exited with 1"));
        assert_eq!(report.missing(0..2), vec![1]);
    }

    #[tokio::test]
    async fn rescan_probes_each_clusters_own_path() {
        let probe = FakeProbe::default();
        let (_events, installer) = recording(&probe, &[]);
        let orchestrator = ClusterDeploymentOrchestrator::new(
            vec![ctx(0, "a", true), ctx(1, "b", true)],
            PathBuf::from("/bin/openshift-install"),
            installer,
            Arc::new(probe.clone()),
        );

        let report = orchestrator.deploy_all("INFO").await;

        assert!(report.available.is_empty());
        assert_eq!(
            *probe.probes.lock().unwrap(),
            vec![PathBuf::from("/clusters/a"), PathBuf::from("/clusters/b")]
        );
    }

    #[tokio::test]
    async fn everything_running_is_idempotent() {
        let mut probe = MockClusterProbe::new();
        probe.expect_is_running().returning(|_| true);
        let mut installer = MockPlatformInstaller::new();
        installer.expect_deploy_prereq().times(0);
        installer.expect_deploy().times(0);
        let orchestrator = ClusterDeploymentOrchestrator::new(
            vec![ctx(0, "a", false), ctx(1, "b", false)],
            PathBuf::from("/bin/openshift-install"),
            Arc::new(installer),
            Arc::new(probe),
        );

        let first = orchestrator.deploy_all("INFO").await;
        let second = orchestrator.deploy_all("INFO").await;

        assert_eq!(first.available, second.available);
        assert_eq!(first.available, [0, 1].into_iter().collect());
        assert!(second.attempted.is_empty());
    }

    #[tokio::test]
    async fn prereq_failure_keeps_worker_from_starting() {
        let mut probe = MockClusterProbe::new();
        probe.expect_is_running().returning(|_| false);
        let mut installer = MockPlatformInstaller::new();
        installer
            .expect_deploy_prereq()
            .returning(|h| {
                if h.cluster_name == "a" {
                    Err(Error::validation("installer binary not found"))
                } else {
                    Ok(())
                }
            });
        installer
            .expect_deploy()
            .withf(|h, _| h.cluster_name == "b")
            .times(1)
            .returning(|_, _| Ok(()));
        let orchestrator = ClusterDeploymentOrchestrator::new(
            vec![ctx(0, "a", false), ctx(1, "b", false)],
            PathBuf::from("/bin/openshift-install"),
            Arc::new(installer),
            Arc::new(probe),
        );

        let report = orchestrator.deploy_all("INFO").await;

        assert_eq!(report.attempted, [1].into_iter().collect());
        assert!(report.failures[&0].contains("installer binary not found"));
    }

    #[tokio::test]
    async fn panicking_worker_counts_as_failure() {
        let mut probe = MockClusterProbe::new();
        probe.expect_is_running().returning(|_| false);
        let mut installer = MockPlatformInstaller::new();
        installer.expect_deploy_prereq().returning(|_| Ok(()));
        installer
            .expect_deploy()
            .returning(|_, _| panic!("installer crashed"));
        let orchestrator = ClusterDeploymentOrchestrator::new(
            vec![ctx(0, "a", false)],
            PathBuf::from("/bin/openshift-install"),
            Arc::new(installer),
            Arc::new(probe),
        );

        let report = orchestrator.deploy_all("INFO").await;

        assert!(report.failures[&0].contains("panicked"));
        assert!(report.available.is_empty());
    }
}
