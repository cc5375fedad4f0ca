//! Call-variable schema resolution.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{CALL_VARIABLES_RESOURCE, Five9Config, ORG_ID_PLACEHOLDER, Settings};
use crate::error::{Five9Error, Five9Result};
use crate::http::{ResourceFetcher, join_url};
use crate::types::{AttributeSchema, SessionMetadata};

/// Fetches the schema that maps raw call-variable ids to named attributes.
///
/// Single attempt, no retry: a failure ends the current connection epoch.
pub struct CallAttributeResolver {
    fetcher: Arc<dyn ResourceFetcher>,
    resource_url: Option<String>,
    scheme: &'static str,
}

impl CallAttributeResolver {
    #[must_use]
    pub fn new(config: &Five9Config, settings: &Settings, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            resource_url: config
                .resources
                .get(CALL_VARIABLES_RESOURCE)
                .map(|descriptor| descriptor.resource_url.clone()),
            scheme: settings.http_scheme(),
        }
    }

    /// Schema URL for the given session.
    ///
    /// # Errors
    /// Returns `Five9Error::Configuration` if the `CallVariables` descriptor
    /// is missing or the metadata carries no API host.
    pub fn url_for(&self, metadata: &SessionMetadata) -> Five9Result<String> {
        let template = self.resource_url.as_deref().ok_or_else(|| {
            Five9Error::Configuration(format!(
                "missing required resource '{CALL_VARIABLES_RESOURCE}'"
            ))
        })?;
        let host = metadata.primary_host().ok_or_else(|| {
            Five9Error::Configuration("session metadata has no API host".into())
        })?;
        let path = template.replace(ORG_ID_PLACEHOLDER, &metadata.org_id);
        Ok(join_url(self.scheme, host, &[&path]))
    }

    /// Fetch the attribute schema for this session.
    ///
    /// # Errors
    /// Returns `Five9Error::Configuration` when the request cannot be built
    /// and `Five9Error::Upstream` when the request fails or the body is not a
    /// list of `{id, group, name}` entries.
    #[instrument(skip_all, fields(org_id = %metadata.org_id))]
    pub async fn resolve(&self, metadata: &SessionMetadata) -> Five9Result<AttributeSchema> {
        let url = self.url_for(metadata)?;
        let body = self.fetcher.get_json(&url).await.map_err(|e| match e {
            Five9Error::Upstream { .. } => e,
            other => Five9Error::upstream(&url, other.to_string()),
        })?;
        let schema: AttributeSchema = serde_json::from_value(body)
            .map_err(|e| Five9Error::upstream(&url, format!("malformed call variables: {e}")))?;
        if schema.is_empty() {
            warn!("Call attribute schema is empty, notifications will carry no attributes");
        } else {
            info!(entries = schema.len(), "Call attribute schema resolved");
        }
        Ok(schema)
    }
}
