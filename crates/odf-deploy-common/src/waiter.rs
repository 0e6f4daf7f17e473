//! Generic resource polling
//!
//! Waits for a resource to exist and satisfy its kind's readiness predicate.
//! Store errors during polling are treated as transient: OLM resources are
//! frequently briefly unavailable while the catalog operator restarts.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, trace, warn};

use crate::resource::{matching_names, ResourceQuery, ResourceStore};
use crate::{Error, Result};

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Polls a [`ResourceStore`] until a queried resource is ready
#[derive(Clone)]
pub struct ResourceWaiter {
    store: Arc<dyn ResourceStore>,
    interval: Duration,
}

impl ResourceWaiter {
    /// Create a waiter polling at [`DEFAULT_POLL_INTERVAL`]
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The store this waiter polls
    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Wait until a resource matching `query` exists and is ready.
    ///
    /// Returns the ready object, or [`Error::ResourceNotReady`] once `timeout`
    /// has elapsed. The timeout error is never returned before `timeout`.
    pub async fn wait(&self, query: &ResourceQuery, timeout: Duration) -> Result<Value> {
        let start = Instant::now();
        let selector = query.selector_description();

        info!(kind = %query.kind, selector = %selector, ?timeout, "Waiting for resource");

        loop {
            match self.store.list(query).await {
                Ok(objects) => {
                    // Any matching instance may be the ready one (e.g. a CSV being replaced)
                    let matching: Vec<&Value> = matching_names(&objects, &query.name).collect();
                    match matching.iter().find(|obj| query.kind.is_ready(obj)) {
                        Some(obj) => {
                            info!(
                                kind = %query.kind,
                                selector = %selector,
                                elapsed = ?start.elapsed(),
                                "Resource ready"
                            );
                            return Ok((*obj).clone());
                        }
                        None if matching.is_empty() => {
                            trace!(kind = %query.kind, "Resource not found yet")
                        }
                        None => trace!(
                            kind = %query.kind,
                            count = matching.len(),
                            "Resource found but not ready"
                        ),
                    }
                }
                Err(e) => {
                    warn!(kind = %query.kind, error = %e, "Poll error, retrying...");
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Error::not_ready(query.kind.kind(), selector, elapsed));
            }
            tokio::time::sleep(self.interval.min(timeout - elapsed)).await;
        }
    }
}
