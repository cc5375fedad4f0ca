//! Session discovery.
//!
//! The discovery endpoint only reports session metadata once the agent is
//! logged in to Five9. Until then it answers with a `five9ExceptionDetail`
//! marker (or nothing useful at all), so the resolver keeps polling at a fixed
//! interval until the metadata shows up.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::config::{Five9Config, METADATA_RESOURCE, Settings};
use crate::error::Five9Result;
use crate::http::{ResourceFetcher, join_url};
use crate::types::SessionMetadata;

/// Field the discovery endpoint sets while no session exists yet.
pub const NOT_READY_MARKER: &str = "five9ExceptionDetail";

/// Outcome of a single discovery poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryPoll {
    /// Metadata is complete; a connection can be attempted.
    Ready(SessionMetadata),
    /// The remote party is not ready yet. Not an error.
    NotReady(String),
}

/// Polls the discovery endpoint until session metadata is available.
pub struct EndpointResolver {
    fetcher: Arc<dyn ResourceFetcher>,
    url: String,
    retry_delay: Duration,
}

impl EndpointResolver {
    /// Build a resolver from the `Metadata` resource descriptor.
    ///
    /// # Errors
    /// Returns `Five9Error::Configuration` if the descriptor is missing.
    pub fn new(
        config: &Five9Config,
        settings: &Settings,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Five9Result<Self> {
        let descriptor = config.resource(METADATA_RESOURCE)?;
        let url = join_url(
            settings.http_scheme(),
            &descriptor.base_url,
            &[&descriptor.resource_url],
        );
        Ok(Self {
            fetcher,
            url,
            retry_delay: settings.discovery_retry(),
        })
    }

    /// Issue one discovery request and classify the answer.
    pub async fn poll_once(&self) -> DiscoveryPoll {
        match self.fetcher.get_json(&self.url).await {
            Ok(body) => classify(body),
            Err(e) => DiscoveryPoll::NotReady(format!("discovery request failed: {e}")),
        }
    }

    /// Poll until the remote party reports usable session metadata.
    ///
    /// There is no retry limit. The only pending retry timer is the sleep
    /// inside this future, so dropping the future cancels it.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn resolve(&self) -> SessionMetadata {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.poll_once().await {
                DiscoveryPoll::Ready(metadata) => {
                    info!(
                        attempt,
                        org_id = %metadata.org_id,
                        host = metadata.primary_host().unwrap_or_default(),
                        "Session metadata discovered"
                    );
                    return metadata;
                }
                DiscoveryPoll::NotReady(reason) => {
                    if attempt == 1 {
                        info!(reason = %reason, "Session not ready, polling");
                    } else {
                        debug!(attempt, reason = %reason, "Session still not ready");
                    }
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

/// Classify a discovery response body.
#[must_use]
pub fn classify(body: serde_json::Value) -> DiscoveryPoll {
    if body.is_null() {
        return DiscoveryPoll::NotReady("empty response".into());
    }
    if let Some(detail) = body.get(NOT_READY_MARKER).filter(|d| !d.is_null()) {
        return DiscoveryPoll::NotReady(format!("remote reported: {detail}"));
    }
    match serde_json::from_value::<SessionMetadata>(body) {
        Ok(metadata) if metadata.is_ready() => DiscoveryPoll::Ready(metadata),
        Ok(_) => DiscoveryPoll::NotReady("metadata has no API host".into()),
        Err(e) => {
            warn!(error = %e, "Malformed discovery response");
            DiscoveryPoll::NotReady(format!("malformed response: {e}"))
        }
    }
}
