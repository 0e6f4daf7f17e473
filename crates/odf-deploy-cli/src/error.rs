//! Error types for the CLI

use std::path::PathBuf;

use crate::deployment::ocs::InstallStep;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Common(#[from] odf_deploy_common::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("operator install failed at {step}: {source}")]
    Install {
        step: InstallStep,
        #[source]
        source: Box<Error>,
    },

    #[error("cluster {index} not found in configuration")]
    ClusterNotFound { index: usize },

    #[error("clusters not available after deployment: {missing:?}")]
    PartialDeployment { missing: Vec<usize> },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }

    /// Wrap this error with the install step it happened in
    pub fn in_step(self, step: InstallStep) -> Self {
        Error::Install {
            step,
            source: Box::new(self),
        }
    }

    /// The install step that failed, if this error came from the operator install
    pub fn failed_step(&self) -> Option<InstallStep> {
        match self {
            Error::Install { step, .. } => Some(*step),
            _ => None,
        }
    }
}
