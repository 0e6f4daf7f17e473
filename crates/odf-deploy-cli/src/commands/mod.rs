//! CLI commands

use std::fmt::Display;

use crate::config::{ClusterContext, MultiClusterConfig};
use crate::{Error, Result};

pub mod deploy;

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed` using its Display implementation.
    fn cmd_err(self) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self) -> Result<T> {
        self.map_err(|e| Error::command_failed(e.to_string()))
    }
}

/// Contexts for the requested cluster indices, or every cluster when none are requested.
///
/// Requested indices keep their configured order and duplicates are dropped.
pub fn selected_contexts(config: &MultiClusterConfig, indices: &[usize]) -> Result<Vec<ClusterContext>> {
    if indices.is_empty() {
        return Ok(config.contexts());
    }
    let mut wanted = indices.to_vec();
    wanted.sort_unstable();
    wanted.dedup();
    wanted.into_iter().map(|i| config.context(i)).collect()
}
