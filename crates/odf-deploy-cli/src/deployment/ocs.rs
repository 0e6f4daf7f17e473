//! Storage operator deployment through OLM
//!
//! The operator is installed by subscribing to its package:
//! 1. Apply the storage namespace and operator group
//! 2. Pick the operator package for the configured release
//! 3. Wait for the package manifest to be published by the catalog
//! 4. Choose the channel (configured override, else the package default)
//! 5. Point the subscription at the staging source when requested
//! 6. Apply the subscription
//! 7. Wait for the subscription, then the CSV, to become ready
//! 8. Give OLM a fixed settle period before reporting success
//!
//! Every step is fatal on failure; errors are wrapped with the step name.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::info;

use odf_deploy_common::package_manifest::{PackageManifest, PackageManifestResolver};
use odf_deploy_common::resource::{ResourceKind, ResourceQuery, ResourceStore};
use odf_deploy_common::templating::{parse_document, parse_documents, render_to_temp_file};
use odf_deploy_common::version::{PlatformVersion, VERSION_4_9};
use odf_deploy_common::waiter::ResourceWaiter;
use odf_deploy_common::{
    MARKETPLACE_NAMESPACE, OCS_OPERATOR_NAME, OCS_PLUGIN_NAME, ODF_OPERATOR_NAME,
    OPENSHIFT_STORAGE_NAMESPACE, OPERATOR_CATALOG_SOURCE_NAME,
};

use crate::config::ClusterContext;
use crate::{Error, Result};

const OLM_YAML: &str = include_str!("../../templates/olm.yaml");
const SUBSCRIPTION_YAML: &str = include_str!("../../templates/subscription.yaml");
const SUBSCRIPTION_ODF_YAML: &str = include_str!("../../templates/subscription_odf.yaml");
const CATALOG_SOURCE_YAML: &str = include_str!("../../templates/catalog_source.yaml");

/// How long the catalog gets to publish the operator package
pub const PACKAGE_MANIFEST_TIMEOUT: Duration = Duration::from_secs(300);
/// How long OLM gets to resolve the subscription
pub const SUBSCRIPTION_TIMEOUT: Duration = Duration::from_secs(300);
/// How long the operator CSV gets to reach Succeeded
pub const CSV_TIMEOUT: Duration = Duration::from_secs(720);
/// How long a new catalog source gets to report READY
pub const CATALOG_SOURCE_TIMEOUT: Duration = Duration::from_secs(300);

/// Unconditional wait after the CSV reports Succeeded.
///
/// OLM keeps reconciling operator deployments for a while after the CSV
/// phase flips; later deployment steps assume this time has passed. This is
/// a blind wait, not a readiness check. Replacing it with a bounded poll on
/// the operator deployments is a candidate follow-up.
pub const SETTLE_DELAY: Duration = Duration::from_secs(30);

/// Steps of the operator deployment, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    CatalogSource,
    PrereqApply,
    OperatorIdentitySelect,
    ManifestResolve,
    ChannelDecision,
    SourceOverride,
    SubscriptionApply,
    SubscriptionReady,
    CsvReady,
    ConsolePlugin,
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CatalogSource => "catalog source setup",
            Self::PrereqApply => "namespace and operator group apply",
            Self::OperatorIdentitySelect => "operator selection",
            Self::ManifestResolve => "package manifest resolution",
            Self::ChannelDecision => "channel selection",
            Self::SourceOverride => "subscription source override",
            Self::SubscriptionApply => "subscription apply",
            Self::SubscriptionReady => "subscription readiness",
            Self::CsvReady => "CSV readiness",
            Self::ConsolePlugin => "console plugin enablement",
        };
        f.write_str(name)
    }
}

/// Tags an error with the install step it happened in
trait StepExt<T> {
    fn step(self, step: InstallStep) -> Result<T>;
}

impl<T, E: Into<Error>> StepExt<T> for std::result::Result<T, E> {
    fn step(self, step: InstallStep) -> Result<T> {
        self.map_err(|e| e.into().in_step(step))
    }
}

/// Subscription template for an operator package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionTemplate {
    /// `ocs-operator` subscription, releases before 4.9
    Legacy,
    /// `odf-operator` subscription, 4.9 and later
    Odf,
}

impl SubscriptionTemplate {
    fn content(&self) -> &'static str {
        match self {
            Self::Legacy => SUBSCRIPTION_YAML,
            Self::Odf => SUBSCRIPTION_ODF_YAML,
        }
    }

    /// Parse the template into an editable document
    pub fn load(&self) -> Result<Value> {
        Ok(parse_document(self.content())?)
    }
}

/// The operator package and subscription template used for one install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorIdentity {
    pub name: &'static str,
    pub template: SubscriptionTemplate,
}

impl OperatorIdentity {
    /// Releases from 4.9 on ship as `odf-operator`, earlier ones as `ocs-operator`
    pub fn for_version(version: PlatformVersion) -> Self {
        if version >= VERSION_4_9 {
            Self {
                name: ODF_OPERATOR_NAME,
                template: SubscriptionTemplate::Odf,
            }
        } else {
            Self {
                name: OCS_OPERATOR_NAME,
                template: SubscriptionTemplate::Legacy,
            }
        }
    }
}

/// Where the subscription channel came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrigin {
    Custom,
    PackageDefault,
}

/// The channel written into the subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelChoice {
    pub name: String,
    pub origin: ChannelOrigin,
}

/// Use the configured channel verbatim, otherwise the package's default channel.
///
/// The default channel is only read when no custom channel is configured.
pub fn decide_channel(custom: Option<&str>, manifest: &PackageManifest) -> Result<ChannelChoice> {
    match custom.filter(|c| !c.is_empty()) {
        Some(channel) => {
            info!(channel, "Custom channel will be used");
            Ok(ChannelChoice {
                name: channel.to_string(),
                origin: ChannelOrigin::Custom,
            })
        }
        None => {
            let channel = manifest.default_channel()?;
            info!(
                channel,
                package = manifest.name(),
                selector = manifest.selector().unwrap_or("-"),
                "Default channel will be used"
            );
            Ok(ChannelChoice {
                name: channel.to_string(),
                origin: ChannelOrigin::PackageDefault,
            })
        }
    }
}

/// Desired state written into the subscription template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSpec {
    pub channel: String,
    /// Catalog source override; the template's source is kept when `None`
    pub source: Option<String>,
}

impl SubscriptionSpec {
    /// Write channel and source override into a subscription template
    pub fn render(&self, mut template: Value) -> Result<Value> {
        let spec = template
            .get_mut("spec")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| Error::validation("subscription template has no spec mapping"))?;

        spec.insert("channel".to_string(), json!(self.channel));
        if let Some(source) = &self.source {
            spec.insert("source".to_string(), json!(source));
        }
        Ok(template)
    }
}

/// Result of a successful operator install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    pub operator: String,
    pub channel: ChannelChoice,
    pub csv: String,
}

/// Drives the subscription state machine against one cluster
#[derive(Clone)]
pub struct SubscriptionInstaller {
    store: Arc<dyn ResourceStore>,
    waiter: ResourceWaiter,
    resolver: PackageManifestResolver,
}

impl SubscriptionInstaller {
    pub fn new(waiter: ResourceWaiter) -> Self {
        Self {
            store: waiter.store().clone(),
            resolver: PackageManifestResolver::new(waiter.clone()),
            waiter,
        }
    }

    /// Apply documents through a temporary manifest file
    async fn apply_documents(&self, docs: &[Value], prefix: &str) -> Result<()> {
        let manifest = render_to_temp_file(docs, prefix)?;
        self.store.apply(manifest.path()).await?;
        Ok(())
    }

    async fn apply_prereqs(&self) -> Result<()> {
        info!("Creating namespace and operator group");
        let docs = parse_documents(OLM_YAML)?;
        self.apply_documents(&docs, "olm_manifest").await
    }

    /// Subscribe to the storage operator and wait until it is installed
    pub async fn install(&self, ctx: &ClusterContext) -> Result<Installed> {
        self.apply_prereqs().await.step(InstallStep::PrereqApply)?;

        let identity = OperatorIdentity::for_version(ctx.version());
        info!(
            cluster = ctx.name(),
            version = %ctx.version(),
            operator = identity.name,
            "Selected operator package"
        );
        let template = identity
            .template
            .load()
            .step(InstallStep::OperatorIdentitySelect)?;

        let selector = ctx.operator_selector();
        let manifest = self
            .resolver
            .resolve(identity.name, Some(&selector), PACKAGE_MANIFEST_TIMEOUT)
            .await
            .step(InstallStep::ManifestResolve)?;

        let channel = decide_channel(ctx.deployment.ocs_csv_channel.as_deref(), &manifest)
            .step(InstallStep::ChannelDecision)?;

        let spec = SubscriptionSpec {
            channel: channel.name.clone(),
            source: ctx.stage_source().map(str::to_string),
        };
        if let Some(source) = &spec.source {
            info!(source = %source, "Subscribing from staging operator source");
        }
        let document = spec.render(template).step(InstallStep::SourceOverride)?;

        self.apply_documents(&[document], "subscription_manifest")
            .await
            .step(InstallStep::SubscriptionApply)?;

        self.waiter
            .wait(
                &ResourceQuery::named(
                    ResourceKind::Subscription,
                    OPENSHIFT_STORAGE_NAMESPACE,
                    identity.name,
                ),
                SUBSCRIPTION_TIMEOUT,
            )
            .await
            .step(InstallStep::SubscriptionReady)?;

        let csv = self
            .waiter
            .wait(
                &ResourceQuery::prefixed(
                    ResourceKind::ClusterServiceVersion,
                    OPENSHIFT_STORAGE_NAMESPACE,
                    identity.name,
                ),
                CSV_TIMEOUT,
            )
            .await
            .step(InstallStep::CsvReady)?;
        let csv_name = csv
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or(identity.name)
            .to_string();

        info!(delay = ?SETTLE_DELAY, csv = %csv_name, "Sleeping after CSV reached Succeeded");
        tokio::time::sleep(SETTLE_DELAY).await;

        Ok(Installed {
            operator: identity.name.to_string(),
            channel,
            csv: csv_name,
        })
    }

    /// Create the storage catalog source from a registry image and wait for it to serve
    pub async fn create_catalog_source(&self, image: &str) -> Result<()> {
        info!(image, "Creating storage catalog source");
        let mut doc = parse_document(CATALOG_SOURCE_YAML)?;
        let spec = doc
            .get_mut("spec")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| Error::validation("catalog source template has no spec mapping"))?;
        spec.insert("image".to_string(), json!(image));

        self.apply_documents(&[doc], "catalog_source_manifest").await?;
        self.waiter
            .wait(
                &ResourceQuery::named(
                    ResourceKind::CatalogSource,
                    MARKETPLACE_NAMESPACE,
                    OPERATOR_CATALOG_SOURCE_NAME,
                ),
                CATALOG_SOURCE_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    /// Add `plugin` to the cluster console's enabled plugins if missing
    pub async fn enable_console_plugin(&self, plugin: &str) -> Result<()> {
        let console = self
            .waiter
            .wait(
                &ResourceQuery::cluster_scoped(ResourceKind::Console, "cluster"),
                Duration::from_secs(60),
            )
            .await?;

        let mut plugins: Vec<String> = console
            .pointer("/spec/plugins")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if plugins.iter().any(|p| p == plugin) {
            info!(plugin, "Console plugin already enabled");
            return Ok(());
        }

        plugins.push(plugin.to_string());
        info!(plugin, "Enabling console plugin");
        self.store
            .patch_merge(
                ResourceKind::Console,
                None,
                "cluster",
                json!({"spec": {"plugins": plugins}}),
            )
            .await?;
        Ok(())
    }
}

/// Full storage deployment for one cluster: catalog source, subscription, console plugin
pub struct OcsDeployment {
    installer: SubscriptionInstaller,
}

impl OcsDeployment {
    pub fn new(installer: SubscriptionInstaller) -> Self {
        Self { installer }
    }

    pub async fn deploy_prereq(&self, ctx: &ClusterContext) -> Result<Installed> {
        if !ctx.deployment.live_deployment {
            if let Some(image) = &ctx.deployment.ocs_registry_image {
                self.installer
                    .create_catalog_source(image)
                    .await
                    .step(InstallStep::CatalogSource)?;
            }
        }

        let installed = self.installer.install(ctx).await?;

        if ctx.env_data.enable_ocs_plugin {
            self.installer
                .enable_console_plugin(OCS_PLUGIN_NAME)
                .await
                .step(InstallStep::ConsolePlugin)?;
        }

        Ok(installed)
    }
}
