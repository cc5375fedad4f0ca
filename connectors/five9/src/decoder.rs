//! Inbound frame decoding and call-variable mapping.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::types::{
    AttributeSchema, CallAttributes, EventKind, InboundFrame, NormalizedNotification,
};

/// Attribute group/name pair that carries the call session id.
const SESSION_GROUP: &str = "call";
const SESSION_NAME: &str = "session_id";

/// Decode a raw text frame into a notification.
///
/// Returns `None` for malformed frames and for event codes the connector
/// does not handle. Without a schema the notification carries no session id
/// and no attributes.
#[must_use]
pub fn decode(raw: &str, schema: Option<&AttributeSchema>) -> Option<NormalizedNotification> {
    let frame: InboundFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to parse socket frame");
            return None;
        }
    };

    let Ok(kind) = EventKind::try_from(frame.context.event_id.as_str()) else {
        debug!(event_id = %frame.context.event_id, "Ignoring unhandled event");
        return None;
    };

    let payload = frame.payload.unwrap_or_default();
    let state = payload.state.and_then(|state| match state {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    });

    let attributes = match (schema, payload.variables.as_ref()) {
        (Some(schema), Some(variables)) => Some(map_call_variables(schema, variables)),
        _ => None,
    };
    let session_id = attributes.as_ref().and_then(session_id_of);

    Some(NormalizedNotification {
        kind,
        event_id: frame.context.event_id,
        event_reason: frame.context.event_reason,
        state,
        session_id,
        attributes,
    })
}

/// Map raw variables into `group -> name -> value` using the schema.
///
/// Group names are lower-cased. Every variable the frame carries for a schema
/// entry is kept as sent, including `null`, `false`, `0` and `""`. Variables
/// without a schema entry, and schema entries absent from the frame, are
/// skipped.
#[must_use]
pub fn map_call_variables(
    schema: &AttributeSchema,
    variables: &serde_json::Map<String, serde_json::Value>,
) -> CallAttributes {
    let mut attributes: CallAttributes = BTreeMap::new();
    for entry in schema.iter() {
        let Some(value) = variables.get(&entry.id) else {
            continue;
        };
        attributes
            .entry(entry.group.to_lowercase())
            .or_default()
            .insert(entry.name.clone(), value.clone());
    }
    attributes
}

fn session_id_of(attributes: &CallAttributes) -> Option<String> {
    attributes
        .get(SESSION_GROUP)
        .and_then(|group| group.get(SESSION_NAME))
        .and_then(|value| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
}
