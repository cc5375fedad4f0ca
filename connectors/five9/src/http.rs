//! HTTP access to Five9 REST resources.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::config::Settings;
use crate::error::{Five9Error, Five9Result};

/// Fetches JSON documents from REST endpoints.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// GET `url` and parse the body as JSON.
    async fn get_json(&self, url: &str) -> Five9Result<serde_json::Value>;
}

/// [`ResourceFetcher`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Build a fetcher that attaches `headers` to every request.
    ///
    /// # Errors
    /// Returns `Five9Error::Configuration` if a header is not valid, or
    /// `Five9Error::Http` if the client cannot be built.
    pub fn new(settings: &Settings, headers: &BTreeMap<String, String>) -> Five9Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Five9Error::Configuration(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Five9Error::Configuration(format!("invalid value for header '{name}': {e}")))?;
            default_headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .default_headers(default_headers)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ResourceFetcher for ReqwestFetcher {
    async fn get_json(&self, url: &str) -> Five9Result<serde_json::Value> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Five9Error::Upstream {
                endpoint: url.to_string(),
                status: Some(status),
                message: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                },
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// Join a scheme, host and path segments into a URL.
pub(crate) fn join_url(scheme: &str, host: &str, segments: &[&str]) -> String {
    let mut url = format!("{scheme}://{}", host.trim().trim_matches('/'));
    for segment in segments {
        let segment = segment.trim().trim_matches('/');
        if !segment.is_empty() {
            url.push('/');
            url.push_str(segment);
        }
    }
    url
}
