//! Five9 wire and data model types.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Session metadata reported by the discovery endpoint once the agent is
/// logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(deserialize_with = "string_or_number")]
    pub org_id: String,
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<String>,
    pub metadata: DataCenterMetadata,
}

/// The data-center section of [`SessionMetadata`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCenterMetadata {
    #[serde(default)]
    pub data_centers: Vec<DataCenter>,
}

/// A single data center and the API hosts it exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCenter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub api_urls: Vec<ApiUrl>,
}

/// An API host inside a data center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUrl {
    pub host: String,
}

impl SessionMetadata {
    /// Host of the first API URL of the first data center.
    #[must_use]
    pub fn primary_host(&self) -> Option<&str> {
        self.metadata
            .data_centers
            .first()
            .and_then(|dc| dc.api_urls.first())
            .map(|api| api.host.trim())
            .filter(|host| !host.is_empty())
    }

    /// Whether this metadata is complete enough to connect with.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.org_id.is_empty() && self.primary_host().is_some()
    }
}

/// One entry of the call-variable schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAttribute {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    pub group: String,
}

impl CallAttribute {
    pub fn new(id: impl Into<String>, group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            group: group.into(),
        }
    }
}

/// Ordered call-variable schema, fetched once per connection epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSchema(Vec<CallAttribute>);

impl AttributeSchema {
    #[must_use]
    pub const fn new(entries: Vec<CallAttribute>) -> Self {
        Self(entries)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CallAttribute> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Event codes the connector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Server reply to our `ping`.
    HeartbeatAck,
    /// A call was created.
    CallCreated,
    /// A call was updated.
    CallUpdated,
    /// A call was deleted.
    CallDeleted,
}

impl TryFrom<&str> for EventKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "1202" => Ok(Self::HeartbeatAck),
            "3" => Ok(Self::CallCreated),
            "4" => Ok(Self::CallUpdated),
            "5" => Ok(Self::CallDeleted),
            _ => Err(()),
        }
    }
}

/// Raw inbound socket frame.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub context: FrameContext,
    #[serde(default, rename = "payLoad", alias = "payload")]
    pub payload: Option<FramePayload>,
}

/// Event identification block of an inbound frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameContext {
    #[serde(deserialize_with = "string_or_number")]
    pub event_id: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub event_reason: Option<String>,
}

/// Payload of an inbound frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FramePayload {
    #[serde(default)]
    pub state: Option<serde_json::Value>,
    #[serde(default)]
    pub variables: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Grouped call attributes: `group -> name -> value`.
pub type CallAttributes = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// Application-ready event delivered to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedNotification {
    #[serde(skip)]
    pub kind: EventKind,
    pub event_id: String,
    pub event_reason: Option<String>,
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<CallAttributes>,
}

/// One-time error report for the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub is_error: bool,
    pub error: String,
}

impl ErrorReport {
    #[must_use]
    pub fn new(error: impl std::fmt::Display) -> Self {
        Self {
            is_error: true,
            error: error.to_string(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
