//! Configuration for the Five9 connector.
//!
//! Resource descriptors arrive from the host application as a flat list keyed
//! by developer name. Timing and transport knobs live in [`Settings`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Five9Error, Five9Result};

/// Developer name of the discovery endpoint descriptor.
pub const METADATA_RESOURCE: &str = "Metadata";
/// Developer name of the call-variable schema endpoint descriptor.
pub const CALL_VARIABLES_RESOURCE: &str = "CallVariables";
/// Developer name of the event socket descriptor.
pub const WEB_SOCKET_RESOURCE: &str = "WebSocket";

/// Placeholder substituted with the organisation id in resource paths.
pub const ORG_ID_PLACEHOLDER: &str = "{five9OrgId}";

/// A remote resource the connector talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(rename = "DeveloperName", alias = "developerName", alias = "developer_name")]
    pub developer_name: String,
    /// Host (without protocol) the resource lives on.
    #[serde(
        rename = "BaseURL__c",
        alias = "baseUrl",
        alias = "base_url",
        default
    )]
    pub base_url: String,
    /// Path template relative to the host.
    #[serde(rename = "ResourceURL__c", alias = "resourceUrl", alias = "resource_url")]
    pub resource_url: String,
}

impl ResourceDescriptor {
    pub fn new(
        developer_name: impl Into<String>,
        base_url: impl Into<String>,
        resource_url: impl Into<String>,
    ) -> Self {
        Self {
            developer_name: developer_name.into(),
            base_url: base_url.into(),
            resource_url: resource_url.into(),
        }
    }
}

/// Configuration exactly as the host application hands it over.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    #[serde(rename = "isFive9User", alias = "isEligible", alias = "is_eligible", default)]
    pub is_eligible: bool,
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

/// Resolved connector configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Five9Config {
    /// Whether the current user may use the connector at all.
    pub is_eligible: bool,
    /// Resource descriptors keyed by developer name.
    pub resources: HashMap<String, ResourceDescriptor>,
}

impl From<RawConfig> for Five9Config {
    fn from(raw: RawConfig) -> Self {
        let resources = raw
            .resources
            .into_iter()
            .map(|descriptor| (descriptor.developer_name.clone(), descriptor))
            .collect();
        Self {
            is_eligible: raw.is_eligible,
            resources,
        }
    }
}

impl Five9Config {
    /// Parse the host application's configuration payload.
    ///
    /// # Errors
    /// Returns `Five9Error::Json` if the payload is not valid JSON of the
    /// expected shape.
    pub fn from_json(raw: &str) -> Five9Result<Self> {
        let raw: RawConfig = serde_json::from_str(raw)?;
        Ok(raw.into())
    }

    /// Look up a resource descriptor by developer name.
    ///
    /// # Errors
    /// Returns `Five9Error::Configuration` if no descriptor has that name.
    pub fn resource(&self, name: &str) -> Five9Result<&ResourceDescriptor> {
        self.resources
            .get(name)
            .ok_or_else(|| Five9Error::Configuration(format!("missing required resource '{name}'")))
    }

    /// Check that every descriptor the connector needs is present.
    ///
    /// # Errors
    /// Returns `Five9Error::Configuration` naming the first missing descriptor.
    pub fn validate(&self) -> Five9Result<()> {
        for name in [METADATA_RESOURCE, CALL_VARIABLES_RESOURCE, WEB_SOCKET_RESOURCE] {
            self.resource(name)?;
        }
        let metadata = self.resource(METADATA_RESOURCE)?;
        if metadata.base_url.trim().is_empty() {
            return Err(Five9Error::Configuration(format!(
                "resource '{METADATA_RESOURCE}' has no base URL"
            )));
        }
        Ok(())
    }
}

/// Supplies connector configuration.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Fetch the current configuration.
    async fn get_config(&self) -> Five9Result<Five9Config>;
}

/// Provider over an already-loaded configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    config: Five9Config,
}

impl StaticConfigProvider {
    #[must_use]
    pub const fn new(config: Five9Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn get_config(&self) -> Five9Result<Five9Config> {
        Ok(self.config.clone())
    }
}

/// Timing and transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Use `https`/`wss` (otherwise `http`/`ws`).
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,

    /// Delay between discovery polls while the session is not ready.
    #[serde(default = "default_discovery_retry_ms")]
    pub discovery_retry_ms: u64,

    /// Interval between outbound `ping` frames.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Unacknowledged beats tolerated before the connection is revived.
    #[serde(default = "default_max_skipped_beats")]
    pub max_skipped_beats: u32,

    /// Close codes that mean "forcibly closed by remote, reconnect".
    #[serde(default = "default_revive_close_codes")]
    pub revive_close_codes: Vec<u16>,

    /// Also revive after any close that was not requested locally.
    #[serde(default)]
    pub revive_on_unexpected_close: bool,

    /// Delay before a failed establishment is retried.
    #[serde(default = "default_establish_retry_ms")]
    pub establish_retry_ms: u64,

    /// Socket connect (handshake) timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// HTTP request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

const fn default_use_tls() -> bool {
    true
}

const fn default_discovery_retry_ms() -> u64 {
    5_000
}

const fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

const fn default_max_skipped_beats() -> u32 {
    1
}

fn default_revive_close_codes() -> Vec<u16> {
    vec![1003]
}

const fn default_establish_retry_ms() -> u64 {
    5_000
}

const fn default_connect_timeout_ms() -> u64 {
    10_000
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_tls: default_use_tls(),
            discovery_retry_ms: default_discovery_retry_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_skipped_beats: default_max_skipped_beats(),
            revive_close_codes: default_revive_close_codes(),
            revive_on_unexpected_close: false,
            establish_retry_ms: default_establish_retry_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Settings {
    /// Validate the settings.
    ///
    /// # Errors
    /// Returns `Five9Error::Configuration` if a value is out of range.
    pub fn validate(&self) -> Five9Result<()> {
        if self.discovery_retry_ms == 0 {
            return Err(Five9Error::Configuration(
                "discoveryRetryMs must be greater than zero".into(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(Five9Error::Configuration(
                "heartbeatIntervalMs must be greater than zero".into(),
            ));
        }
        if self.max_skipped_beats == 0 {
            return Err(Five9Error::Configuration(
                "maxSkippedBeats must be at least 1".into(),
            ));
        }
        if self.establish_retry_ms == 0 {
            return Err(Five9Error::Configuration(
                "establishRetryMs must be greater than zero".into(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Five9Error::Configuration(
                "timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn http_scheme(&self) -> &'static str {
        if self.use_tls { "https" } else { "http" }
    }

    #[must_use]
    pub const fn ws_scheme(&self) -> &'static str {
        if self.use_tls { "wss" } else { "ws" }
    }

    #[must_use]
    pub const fn discovery_retry(&self) -> Duration {
        Duration::from_millis(self.discovery_retry_ms)
    }

    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub const fn establish_retry(&self) -> Duration {
        Duration::from_millis(self.establish_retry_ms)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether a close with this code (or none) should revive the connection.
    #[must_use]
    pub fn revives_on_close(&self, code: Option<u16>) -> bool {
        code.is_some_and(|code| self.revive_close_codes.contains(&code))
            || self.revive_on_unexpected_close
    }
}

/// On-disk configuration document used by the `fcp-five9` binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    /// Id of the agent whose events are streamed.
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(flatten)]
    pub provider: RawConfig,

    #[serde(default)]
    pub settings: Settings,

    /// Opaque headers (cookies, tokens) attached to every HTTP request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ConfigDocument {
    /// Load a configuration document from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Five9Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Five9Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let document: Self = serde_json::from_str(&raw)?;
        document.settings.validate()?;
        Ok(document)
    }

    /// Configuration provider over this document's resources.
    #[must_use]
    pub fn config_provider(&self) -> StaticConfigProvider {
        StaticConfigProvider::new(self.provider.clone().into())
    }
}
