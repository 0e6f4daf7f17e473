//! Multi-cluster deployment configuration.
//!
//! One YAML file describes every cluster of a run:
//!
//! ```yaml
//! run:
//!   log_level: INFO
//!   bin_dir: ./bin
//! clusters:
//!   - env_data:
//!       cluster_name: primary
//!       cluster_path: /clusters/primary
//!       skip_ocp_deployment: false
//!       ocs_version: "4.10"
//!     deployment:
//!       ocs_csv_channel: stable-4.10
//!       stage: false
//! ```
//!
//! Versions must be quoted. Unquoted numbers are rejected: YAML reads `4.10` as 4.1.
//!
//! Each entry becomes a [`ClusterContext`] that is passed explicitly into the
//! orchestrator and installer; nothing switches a global "current cluster".

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use odf_deploy_common::version::PlatformVersion;
use odf_deploy_common::{
    DEFAULT_CATALOG_SOURCE_NAME, OPERATOR_CATALOG_SOURCE_NAME, STAGE_OPERATOR_SOURCE_NAME,
};

use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "ODF_DEPLOY_CONFIG";

const DEFAULT_LOG_LEVEL: &str = "INFO";
const DEFAULT_BIN_DIR: &str = "./bin";

/// Settings shared by every cluster of a run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Log level for this process and the installer (`INFO`, `DEBUG`, ...)
    pub log_level: String,
    /// Directory holding the `openshift-install` binary
    pub bin_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            bin_dir: PathBuf::from(DEFAULT_BIN_DIR),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Per-cluster environment
#[derive(Debug, Clone, Deserialize)]
pub struct EnvData {
    pub cluster_name: String,
    pub cluster_path: PathBuf,
    /// Platform install is skipped unless explicitly set to false
    #[serde(default = "default_true")]
    pub skip_ocp_deployment: bool,
    /// Storage release to deploy; selects the operator package
    pub ocs_version: PlatformVersion,
    /// Register the storage console plugin after install
    #[serde(default)]
    pub enable_ocs_plugin: bool,
    /// install-config.yaml copied into the cluster directory before install
    #[serde(default)]
    pub install_config: Option<PathBuf>,
}

/// Per-cluster operator deployment options
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Subscription channel overriding the package's default channel
    pub ocs_csv_channel: Option<String>,
    /// Subscribe from the staging operator source
    pub stage: bool,
    /// Catalog image to create the storage catalog source from
    pub ocs_registry_image: Option<String>,
    /// Use the platform's stock catalog instead of a custom catalog source
    pub live_deployment: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ClusterEntry {
    env_data: EnvData,
    #[serde(default)]
    deployment: DeploymentConfig,
}

/// The whole configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct MultiClusterConfig {
    #[serde(default)]
    pub run: RunConfig,
    clusters: Vec<ClusterEntry>,
}

/// One target cluster
#[derive(Debug, Clone)]
pub struct ClusterContext {
    pub index: usize,
    pub env_data: EnvData,
    pub deployment: DeploymentConfig,
}

impl ClusterContext {
    pub fn name(&self) -> &str {
        &self.env_data.cluster_name
    }

    pub fn cluster_path(&self) -> &Path {
        &self.env_data.cluster_path
    }

    pub fn skip_deployment(&self) -> bool {
        self.env_data.skip_ocp_deployment
    }

    pub fn version(&self) -> PlatformVersion {
        self.env_data.ocs_version
    }

    /// Catalog source the storage package manifest is published by
    pub fn catalog_source(&self) -> &'static str {
        if self.deployment.live_deployment {
            DEFAULT_CATALOG_SOURCE_NAME
        } else {
            OPERATOR_CATALOG_SOURCE_NAME
        }
    }

    /// Label selector for the storage package manifest
    pub fn operator_selector(&self) -> String {
        format!("catalog={}", self.catalog_source())
    }

    /// Source override for the subscription when deploying from staging
    pub fn stage_source(&self) -> Option<&'static str> {
        self.deployment.stage.then_some(STAGE_OPERATOR_SOURCE_NAME)
    }
}

impl MultiClusterConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate config YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.clusters.is_empty() {
            return Err(Error::validation("at least one cluster must be configured"));
        }

        let mut paths = HashSet::new();
        for (i, entry) in self.clusters.iter().enumerate() {
            if entry.env_data.cluster_name.trim().is_empty() {
                return Err(Error::validation(format!("cluster {} has an empty name", i)));
            }
            if !paths.insert(&entry.env_data.cluster_path) {
                return Err(Error::validation(format!(
                    "cluster path {} is used by more than one cluster",
                    entry.env_data.cluster_path.display()
                )));
            }
        }
        Ok(())
    }

    /// Every configured cluster, in file order
    pub fn contexts(&self) -> Vec<ClusterContext> {
        self.clusters
            .iter()
            .enumerate()
            .map(|(index, entry)| ClusterContext {
                index,
                env_data: entry.env_data.clone(),
                deployment: entry.deployment.clone(),
            })
            .collect()
    }

    /// The cluster at `index`
    pub fn context(&self, index: usize) -> Result<ClusterContext> {
        self.contexts()
            .into_iter()
            .nth(index)
            .ok_or(Error::ClusterNotFound { index })
    }

    /// Path of the installer binary
    pub fn installer_binary(&self) -> PathBuf {
        self.run.bin_dir.join("openshift-install")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odf_deploy_common::version::VERSION_4_9;

    const TWO_CLUSTERS: &str = r#"
run:
  log_level: DEBUG
  bin_dir: /opt/bin
clusters:
  - env_data:
      cluster_name: primary
      cluster_path: /clusters/primary
      skip_ocp_deployment: false
      ocs_version: "4.10"
      enable_ocs_plugin: true
    deployment:
      ocs_csv_channel: stable-4.10
      stage: true
  - env_data:
      cluster_name: secondary
      cluster_path: /clusters/secondary
      ocs_version: "4.9"
"#;

    #[test]
    fn parses_contexts_in_order() {
        let config = MultiClusterConfig::from_yaml(TWO_CLUSTERS).unwrap();
        assert_eq!(config.run.log_level, "DEBUG");
        assert_eq!(config.installer_binary(), PathBuf::from("/opt/bin/openshift-install"));

        let contexts = config.contexts();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].index, 0);
        assert_eq!(contexts[0].name(), "primary");
        assert!(!contexts[0].skip_deployment());
        assert_eq!(contexts[0].version().short(), "4.10");
        assert_eq!(
            contexts[0].deployment.ocs_csv_channel.as_deref(),
            Some("stable-4.10")
        );
        assert_eq!(contexts[0].stage_source(), Some(STAGE_OPERATOR_SOURCE_NAME));

        assert_eq!(contexts[1].index, 1);
        assert_eq!(contexts[1].version(), VERSION_4_9);
        assert_eq!(contexts[1].stage_source(), None);
    }

    #[test]
    fn skip_ocp_deployment_defaults_to_true() {
        let config = MultiClusterConfig::from_yaml(TWO_CLUSTERS).unwrap();
        assert!(config.context(1).unwrap().skip_deployment());
    }

    #[test]
    fn run_section_defaults() {
        let config = MultiClusterConfig::from_yaml(
            r#"
clusters:
  - env_data:
      cluster_name: only
      cluster_path: /clusters/only
      ocs_version: "4.8"
"#,
        )
        .unwrap();
        assert_eq!(config.run.log_level, "INFO");
        assert_eq!(config.installer_binary(), PathBuf::from("./bin/openshift-install"));
    }

    #[test]
    fn selector_follows_live_deployment() {
        let mut ctx = MultiClusterConfig::from_yaml(TWO_CLUSTERS)
            .unwrap()
            .context(0)
            .unwrap();
        assert_eq!(ctx.operator_selector(), "catalog=ocs-catalogsource");
        ctx.deployment.live_deployment = true;
        assert_eq!(ctx.operator_selector(), "catalog=redhat-operators");
    }

    #[test]
    fn rejects_empty_cluster_list() {
        let err = MultiClusterConfig::from_yaml("clusters: []").unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn rejects_shared_cluster_path() {
        let err = MultiClusterConfig::from_yaml(
            r#"
clusters:
  - env_data: {cluster_name: a, cluster_path: /same, ocs_version: "4.9"}
  - env_data: {cluster_name: b, cluster_path: /same, ocs_version: "4.9"}
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("/same"));
    }

    #[test]
    fn rejects_bad_version() {
        let err = MultiClusterConfig::from_yaml(
            r#"
clusters:
  - env_data: {cluster_name: a, cluster_path: /a, ocs_version: "latest"}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn rejects_unquoted_version() {
        let err = MultiClusterConfig::from_yaml(
            r#"
clusters:
  - env_data: {cluster_name: a, cluster_path: /a, ocs_version: 4.10}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
        assert!(err.to_string().contains("must be quoted"));
    }

    #[test]
    fn unknown_index_is_cluster_not_found() {
        let config = MultiClusterConfig::from_yaml(TWO_CLUSTERS).unwrap();
        assert!(matches!(
            config.context(5),
            Err(Error::ClusterNotFound { index: 5 })
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = MultiClusterConfig::load(Path::new("/nonexistent/odf-deploy.yaml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }
}
