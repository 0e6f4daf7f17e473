//! Common types for odf-deploy: resource store, waiters, templates, errors
//!
//! Everything here talks to a single cluster. Multi-cluster coordination and
//! the operator install flow live in the `odf-deploy` crate.

#![deny(missing_docs)]

pub mod error;
pub mod exec;
pub mod kube_utils;
pub mod package_manifest;
pub mod resource;
pub mod templating;
pub mod version;
pub mod waiter;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace the storage operator is installed into
pub const OPENSHIFT_STORAGE_NAMESPACE: &str = "openshift-storage";

/// Namespace holding catalog sources and package manifests
pub const MARKETPLACE_NAMESPACE: &str = "openshift-marketplace";

/// Operator package name for ODF releases (4.9 and later)
pub const ODF_OPERATOR_NAME: &str = "odf-operator";

/// Operator package name for OCS releases before 4.9
pub const OCS_OPERATOR_NAME: &str = "ocs-operator";

/// Catalog source created from a custom registry image
pub const OPERATOR_CATALOG_SOURCE_NAME: &str = "ocs-catalogsource";

/// Catalog source used when deploying from the staging registry
pub const STAGE_OPERATOR_SOURCE_NAME: &str = "ocs-operatorsource";

/// Stock catalog source shipped with the platform
pub const DEFAULT_CATALOG_SOURCE_NAME: &str = "redhat-operators";

/// Console plugin registered by the storage operator
pub const OCS_PLUGIN_NAME: &str = "odf-console";

/// Relative location of the admin kubeconfig inside a cluster directory
pub const KUBECONFIG_RELATIVE_PATH: &str = "auth/kubeconfig";
