//! Deploy commands
//!
//! - `deploy-ocp`: install the platform on every cluster that needs it, in parallel
//! - `install-ocs`: subscribe the storage operator on each cluster, one after another
//! - `deploy`: both, platform first

use std::sync::Arc;

use clap::Args;
use tracing::info;

use odf_deploy_common::exec::ShellExecutor;
use odf_deploy_common::kube_utils::KubeClusterProbe;
use odf_deploy_common::resource::{KubeResourceStore, ResourceStore};
use odf_deploy_common::waiter::ResourceWaiter;

use crate::commands::selected_contexts;
use crate::config::{ClusterContext, MultiClusterConfig};
use crate::deployment::ocp::OpenshiftInstaller;
use crate::deployment::ocs::{Installed, OcsDeployment, SubscriptionInstaller};
use crate::deployment::{ClusterDeploymentOrchestrator, DeploymentReport};
use crate::{Error, Result};

/// Cluster selection shared by the deploy commands
#[derive(Args, Debug, Default, Clone)]
pub struct DeployArgs {
    /// Index of a configured cluster to act on (repeatable; default: all)
    #[arg(long = "cluster")]
    pub clusters: Vec<usize>,
}

/// Fail with [`Error::PartialDeployment`] unless every requested cluster is available
pub fn check_report(report: &DeploymentReport, requested: &[usize]) -> Result<()> {
    let missing = report.missing(requested.iter().copied());
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::PartialDeployment { missing })
    }
}

/// Install the platform on the selected clusters
pub async fn deploy_ocp(config: &MultiClusterConfig, args: &DeployArgs, log_level: &str) -> Result<()> {
    let contexts = selected_contexts(config, &args.clusters)?;
    let requested: Vec<usize> = contexts.iter().map(|c| c.index).collect();

    let installer = OpenshiftInstaller::new(Arc::new(ShellExecutor::new()));
    let orchestrator = ClusterDeploymentOrchestrator::new(
        contexts,
        config.installer_binary(),
        Arc::new(installer),
        Arc::new(KubeClusterProbe::new()),
    );

    let report = orchestrator.deploy_all(log_level).await;
    for (index, failure) in &report.failures {
        info!(index, failure = %failure, "Cluster deployment failure");
    }
    check_report(&report, &requested)
}

/// Deploy the storage operator on one cluster through `store`
pub async fn deploy_ocs_on(ctx: &ClusterContext, store: Arc<dyn ResourceStore>) -> Result<Installed> {
    let installer = SubscriptionInstaller::new(ResourceWaiter::new(store));
    OcsDeployment::new(installer).deploy_prereq(ctx).await
}

/// Install the storage operator on the selected clusters
pub async fn install_ocs(config: &MultiClusterConfig, args: &DeployArgs) -> Result<()> {
    for ctx in selected_contexts(config, &args.clusters)? {
        info!(cluster = ctx.name(), version = %ctx.version(), "Deploying storage operator");
        let store = KubeResourceStore::for_cluster(ctx.cluster_path()).await?;
        let installed = deploy_ocs_on(&ctx, Arc::new(store)).await?;
        info!(
            cluster = ctx.name(),
            operator = %installed.operator,
            channel = %installed.channel.name,
            csv = %installed.csv,
            "Storage operator installed"
        );
    }
    Ok(())
}

/// Platform install followed by storage operator install
pub async fn deploy(config: &MultiClusterConfig, args: &DeployArgs, log_level: &str) -> Result<()> {
    deploy_ocp(config, args, log_level).await?;
    install_ocs(config, args).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploymentConfig, EnvData};
    use odf_deploy_common::resource::MockResourceStore;
    use std::path::PathBuf;

    fn report(available: &[usize]) -> DeploymentReport {
        DeploymentReport {
            available: available.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn complete_report_passes() {
        assert!(check_report(&report(&[0, 1, 2]), &[0, 1, 2]).is_ok());
    }

    #[test]
    fn partial_report_names_missing_clusters() {
        let err = check_report(&report(&[0, 2]), &[0, 1, 2]).unwrap_err();
        assert!(matches!(err, Error::PartialDeployment { ref missing } if missing == &vec![1]));
        assert!(err.to_string().contains("[1]"));
    }

    #[test]
    fn unrequested_clusters_do_not_matter() {
        assert!(check_report(&report(&[1]), &[1]).is_ok());
    }

    #[tokio::test]
    async fn ocs_failure_surfaces_with_step() {
        let mut store = MockResourceStore::new();
        store
            .expect_apply()
            .returning(|_| Err(odf_deploy_common::Error::apply("manifest", "denied")));
        let ctx = ClusterContext {
            index: 0,
            env_data: EnvData {
                cluster_name: "a".to_string(),
                cluster_path: PathBuf::from("/a"),
                skip_ocp_deployment: true,
                ocs_version: "4.9".parse().unwrap(),
                enable_ocs_plugin: false,
                install_config: None,
            },
            deployment: DeploymentConfig::default(),
        };

        let err = deploy_ocs_on(&ctx, Arc::new(store)).await.unwrap_err();
        assert!(err.failed_step().is_some());
    }
}
