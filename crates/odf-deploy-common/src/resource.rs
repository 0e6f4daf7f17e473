//! Cluster resource access for the OLM resources the deployment touches
//!
//! [`ResourceStore`] is the seam between deployment logic and the API server.
//! [`KubeResourceStore`] implements it with kube-rs dynamic objects and
//! server-side apply, so no `oc`/`kubectl` binary is needed on the host.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::templating::parse_documents;
use crate::{kube_utils, Error, Result};

/// Field manager used for server-side apply
const FIELD_MANAGER: &str = "odf-deploy";

/// Resource kinds the deployment polls or patches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `packages.operators.coreos.com/v1` PackageManifest
    PackageManifest,
    /// `operators.coreos.com/v1alpha1` Subscription
    Subscription,
    /// `operators.coreos.com/v1alpha1` ClusterServiceVersion
    ClusterServiceVersion,
    /// `operators.coreos.com/v1alpha1` CatalogSource
    CatalogSource,
    /// `operator.openshift.io/v1` Console (cluster-scoped)
    Console,
}

impl ResourceKind {
    /// Kind name as it appears in manifests
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PackageManifest => "PackageManifest",
            Self::Subscription => "Subscription",
            Self::ClusterServiceVersion => "ClusterServiceVersion",
            Self::CatalogSource => "CatalogSource",
            Self::Console => "Console",
        }
    }

    /// Build the dynamic ApiResource for this kind
    pub fn api_resource(&self) -> ApiResource {
        let (group, version, plural) = match self {
            Self::PackageManifest => ("packages.operators.coreos.com", "v1", "packagemanifests"),
            Self::Subscription => ("operators.coreos.com", "v1alpha1", "subscriptions"),
            Self::ClusterServiceVersion => {
                ("operators.coreos.com", "v1alpha1", "clusterserviceversions")
            }
            Self::CatalogSource => ("operators.coreos.com", "v1alpha1", "catalogsources"),
            Self::Console => ("operator.openshift.io", "v1", "consoles"),
        };
        ApiResource {
            group: group.to_string(),
            version: version.to_string(),
            api_version: format!("{}/{}", group, version),
            kind: self.kind().to_string(),
            plural: plural.to_string(),
        }
    }

    /// Whether an instance of this kind has reached the state the deployment waits for
    pub fn is_ready(&self, object: &Value) -> bool {
        let status = object.get("status");
        let status_str = |pointer: &str| {
            object
                .pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
        };
        match self {
            Self::PackageManifest | Self::Console => true,
            Self::Subscription => {
                status_str("/status/state") == "AtLatestKnown"
                    || status
                        .and_then(|s| s.get("installedCSV"))
                        .and_then(Value::as_str)
                        .is_some_and(|csv| !csv.is_empty())
            }
            Self::ClusterServiceVersion => status_str("/status/phase") == "Succeeded",
            Self::CatalogSource => {
                status_str("/status/connectionState/lastObservedState") == "READY"
            }
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// How a resource's `metadata.name` is matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch {
    /// Name equals the given value
    Exact(String),
    /// Name starts with the given value (CSV names carry a version suffix)
    Prefix(String),
    /// Any name
    Any,
}

impl NameMatch {
    /// Check a resource name against this match
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(n) => name == n,
            Self::Prefix(p) => name.starts_with(p.as_str()),
            Self::Any => true,
        }
    }
}

/// A lookup of resources by kind, namespace, name and label selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceQuery {
    /// Resource kind
    pub kind: ResourceKind,
    /// Namespace, `None` for cluster-scoped kinds
    pub namespace: Option<String>,
    /// Name match applied after listing
    pub name: NameMatch,
    /// Optional label selector (e.g. "catalog=ocs-catalogsource")
    pub label_selector: Option<String>,
}

impl ResourceQuery {
    /// Query for a namespaced resource by exact name
    pub fn named(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: NameMatch::Exact(name.into()),
            label_selector: None,
        }
    }

    /// Query for a namespaced resource by name prefix
    pub fn prefixed(
        kind: ResourceKind,
        namespace: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: NameMatch::Prefix(prefix.into()),
            label_selector: None,
        }
    }

    /// Query for a cluster-scoped resource by exact name
    pub fn cluster_scoped(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: NameMatch::Exact(name.into()),
            label_selector: None,
        }
    }

    /// Restrict the query with a label selector
    pub fn with_labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    /// Description of the match used in logs and timeout errors
    pub fn selector_description(&self) -> String {
        let name = match &self.name {
            NameMatch::Exact(n) => format!("name={}", n),
            NameMatch::Prefix(p) => format!("name^={}", p),
            NameMatch::Any => "name=*".to_string(),
        };
        let mut parts = vec![name];
        if let Some(labels) = &self.label_selector {
            parts.push(format!("labels={}", labels));
        }
        if let Some(ns) = &self.namespace {
            parts.push(format!("namespace={}", ns));
        }
        parts.join(",")
    }
}

/// Read/apply access to cluster resources
///
/// Objects are exchanged as JSON values so the deployment flow does not need
/// typed bindings for OLM resources.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Apply every document in the manifest file at `path`
    async fn apply(&self, path: &Path) -> Result<()>;

    /// List resources of the query's kind in its namespace, filtered by label selector.
    ///
    /// The name match is applied by the caller.
    async fn list(&self, query: &ResourceQuery) -> Result<Vec<Value>>;

    /// Merge-patch a single resource
    async fn patch_merge(
        &self,
        kind: ResourceKind,
        namespace: Option<String>,
        name: &str,
        patch: Value,
    ) -> Result<()>;
}

/// Resources in `objects` whose name satisfies `name`, in list order
pub fn matching_names<'a>(
    objects: &'a [Value],
    name: &'a NameMatch,
) -> impl Iterator<Item = &'a Value> + 'a {
    objects.iter().filter(move |obj| {
        obj.pointer("/metadata/name")
            .and_then(Value::as_str)
            .is_some_and(|n| name.matches(n))
    })
}

/// [`ResourceStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
}

impl KubeResourceStore {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the admin kubeconfig of the cluster in `cluster_path`
    pub async fn for_cluster(cluster_path: &Path) -> Result<Self> {
        let kubeconfig = kube_utils::cluster_kubeconfig(cluster_path);
        let client = kube_utils::create_client(Some(&kubeconfig)).await?;
        Ok(Self::new(client))
    }

    fn api(&self, ar: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, ar),
            None => Api::all_with(self.client.clone(), ar),
        }
    }

    async fn apply_document(&self, doc: &Value, source: &str) -> Result<()> {
        let api_version = doc
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::apply(source, "document has no apiVersion"))?;
        let kind = doc
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::apply(source, "document has no kind"))?;
        let name = doc
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::apply(source, "document has no metadata.name"))?;
        let namespace = doc.pointer("/metadata/namespace").and_then(Value::as_str);

        let (group, version) = kube_utils::parse_api_version(api_version);
        let ar = ApiResource::from_gvk(&GroupVersionKind::gvk(&group, &version, kind));

        self.api(&ar, namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(doc))
            .await
            .map_err(|e| Error::apply(format!("{}/{}", kind, name), e.to_string()))?;

        info!(kind, name, namespace = namespace.unwrap_or("-"), "Applied resource");
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn apply(&self, path: &Path) -> Result<()> {
        let source = path.display().to_string();
        let content = tokio::fs::read_to_string(path).await?;
        let docs = parse_documents(&content)?;
        if docs.is_empty() {
            return Err(Error::apply(source, "manifest contains no documents"));
        }
        for doc in &docs {
            self.apply_document(doc, &source).await?;
        }
        Ok(())
    }

    async fn list(&self, query: &ResourceQuery) -> Result<Vec<Value>> {
        let ar = query.kind.api_resource();
        let mut params = ListParams::default();
        if let Some(labels) = &query.label_selector {
            params = params.labels(labels);
        }

        let list = self.api(&ar, query.namespace.as_deref()).list(&params).await?;
        debug!(
            kind = %query.kind,
            count = list.items.len(),
            "Listed resources"
        );

        list.items
            .into_iter()
            .map(|obj| serde_json::to_value(obj).map_err(Error::from))
            .collect()
    }

    async fn patch_merge(
        &self,
        kind: ResourceKind,
        namespace: Option<String>,
        name: &str,
        patch: Value,
    ) -> Result<()> {
        let ar = kind.api_resource();
        self.api(&ar, namespace.as_deref())
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!(kind = %kind, name, "Patched resource");
        Ok(())
    }
}
