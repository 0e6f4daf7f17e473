//! Error types shared by every odf-deploy component
//!
//! Variants carry the context needed to tell which resource, command or
//! manifest failed without having to re-run with debug logging.

use std::time::Duration;

use thiserror::Error;

/// Main error type for single-cluster operations
#[derive(Debug, Error)]
pub enum Error {
    /// A polled resource did not reach its ready condition in time
    #[error("{kind} matching '{selector}' not ready after {elapsed:?}")]
    ResourceNotReady {
        /// Resource kind being waited on (e.g. "Subscription")
        kind: String,
        /// Human-readable description of the name match and label selector
        selector: String,
        /// Time spent polling before giving up
        elapsed: Duration,
    },

    /// A ready package manifest has no default channel
    #[error("package manifest {package} has no default channel")]
    ChannelNotFound {
        /// Package manifest name
        package: String,
    },

    /// An external command exited unsuccessfully
    #[error("command '{command}' failed with exit code {exit_code:?}: {stderr}")]
    CommandExecution {
        /// The command line that was run
        command: String,
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// Applying a manifest to the cluster failed
    #[error("failed to apply {manifest}: {message}")]
    Apply {
        /// Manifest path or `kind/name` of the failing document
        manifest: String,
        /// Description of what failed
        message: String,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Filesystem or process I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A version string could not be parsed
    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    /// Client or environment configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's wrong
        message: String,
    },
}

impl Error {
    /// Create a timeout error for a resource wait
    pub fn not_ready(kind: impl Into<String>, selector: impl Into<String>, elapsed: Duration) -> Self {
        Self::ResourceNotReady {
            kind: kind.into(),
            selector: selector.into(),
            elapsed,
        }
    }

    /// Create an apply error for a manifest
    pub fn apply(manifest: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Apply {
            manifest: manifest.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
