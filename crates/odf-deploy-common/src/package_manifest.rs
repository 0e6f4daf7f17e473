//! Operator catalog package manifests
//!
//! A package manifest appears in the marketplace namespace once the catalog
//! source serving it has synced. Its status lists the update channels and
//! the channel new subscriptions should use by default.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::resource::{ResourceKind, ResourceQuery};
use crate::waiter::ResourceWaiter;
use crate::{Error, Result, MARKETPLACE_NAMESPACE};

/// A resolved package manifest
#[derive(Debug, Clone)]
pub struct PackageManifest {
    name: String,
    selector: Option<String>,
    object: Value,
}

impl PackageManifest {
    /// Package (and resource) name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label selector the manifest was resolved with
    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    /// The channel subscriptions use when none is requested
    pub fn default_channel(&self) -> Result<&str> {
        self.object
            .pointer("/status/defaultChannel")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::ChannelNotFound {
                package: self.name.clone(),
            })
    }

    /// Names of every channel the package publishes
    pub fn channels(&self) -> Vec<&str> {
        self.object
            .pointer("/status/channels")
            .and_then(Value::as_array)
            .map(|channels| {
                channels
                    .iter()
                    .filter_map(|c| c.get("name").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Catalog source serving this package
    pub fn catalog_source(&self) -> Option<&str> {
        self.object
            .pointer("/status/catalogSource")
            .and_then(Value::as_str)
    }
}

/// Resolves package manifests through a [`ResourceWaiter`]
#[derive(Clone)]
pub struct PackageManifestResolver {
    waiter: ResourceWaiter,
    namespace: String,
}

impl PackageManifestResolver {
    /// Resolve manifests in the marketplace namespace
    pub fn new(waiter: ResourceWaiter) -> Self {
        Self {
            waiter,
            namespace: MARKETPLACE_NAMESPACE.to_string(),
        }
    }

    /// Wait for the package manifest `operator_name` to be published, then return it
    pub async fn resolve(
        &self,
        operator_name: &str,
        selector: Option<&str>,
        timeout: Duration,
    ) -> Result<PackageManifest> {
        let mut query =
            ResourceQuery::named(ResourceKind::PackageManifest, &self.namespace, operator_name);
        if let Some(labels) = selector {
            query = query.with_labels(labels);
        }

        let object = self.waiter.wait(&query, timeout).await?;
        let manifest = PackageManifest {
            name: operator_name.to_string(),
            selector: selector.map(str::to_string),
            object,
        };
        debug!(
            package = manifest.name(),
            channels = ?manifest.channels(),
            "Resolved package manifest"
        );
        Ok(manifest)
    }
}
