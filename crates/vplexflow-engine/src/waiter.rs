//! Poll-until-ready waiter
//!
//! Re-reads a resource at a fixed interval until a predicate holds. Used
//! after creating devices, whose rebuild runs in the background on the array.

use futures_util::future::join_all;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vplexflow_core::{ResourceClient, ResourceDetails, ResourceRef, Result, VplexError};

/// Bounded polling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_retries: 100,
            delay: Duration::from_secs(5),
        }
    }
}

impl WaitConfig {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Longest time a wait can take, ignoring request latency
    pub fn budget(&self) -> Duration {
        self.delay * self.max_retries.saturating_sub(1)
    }
}

/// Poll `reference` until `predicate` holds
///
/// # Returns
/// * `Ok(details)` - the first state that satisfied the predicate
/// * `Err(Timeout)` - `max_retries` polls without success
/// * `Err(Cancelled)` - `cancel` fired before or between polls
///
/// A connection error uses up the attempt; any other error ends the wait.
pub async fn wait_until<F>(
    client: &dyn ResourceClient,
    reference: &ResourceRef,
    predicate: F,
    config: &WaitConfig,
    cancel: &CancellationToken,
) -> Result<ResourceDetails>
where
    F: Fn(&ResourceDetails) -> bool,
{
    for attempt in 0..config.max_retries {
        if cancel.is_cancelled() {
            return Err(VplexError::Cancelled);
        }

        match client.get(reference).await {
            Ok(details) if predicate(&details) => {
                debug!(resource = %reference, attempt = attempt + 1, "Ready");
                return Ok(details);
            }
            Ok(details) => {
                debug!(
                    resource = %reference,
                    attempt = attempt + 1,
                    status = ?details.rebuild_status,
                    "Not ready yet"
                );
            }
            Err(VplexError::Connection(message)) => {
                warn!(resource = %reference, attempt = attempt + 1, error = %message, "Poll failed");
            }
            Err(e) => return Err(e),
        }

        // no sleep after the last poll
        if attempt + 1 < config.max_retries {
            tokio::select! {
                _ = cancel.cancelled() => return Err(VplexError::Cancelled),
                _ = sleep(config.delay) => {}
            }
        }
    }

    Err(VplexError::Timeout {
        resource: reference.to_string(),
        attempts: config.max_retries,
    })
}

/// True once a device is no longer rebuilding or queued
pub fn rebuild_settled(details: &ResourceDetails) -> bool {
    !details.rebuild_status.is_some_and(|s| s.is_in_progress())
}

/// Wait for a device or distributed device to finish rebuilding
pub async fn wait_for_rebuild(
    client: &dyn ResourceClient,
    reference: &ResourceRef,
    config: &WaitConfig,
    cancel: &CancellationToken,
) -> Result<ResourceDetails> {
    wait_until(client, reference, rebuild_settled, config, cancel).await
}

/// Wait for several rebuilds at once, each with its own retry budget
///
/// Results come back in the order of `references`.
pub async fn wait_for_rebuilds(
    client: &dyn ResourceClient,
    references: &[ResourceRef],
    config: &WaitConfig,
    cancel: &CancellationToken,
) -> Vec<(ResourceRef, Result<ResourceDetails>)> {
    join_all(references.iter().map(|reference| async move {
        let result = wait_for_rebuild(client, reference, config, cancel).await;
        (reference.clone(), result)
    }))
    .await
}
