//! Payload text carried by the memo instruction.

use crate::error::{CodecError, DecodeError};
use medledger_types::{AccessAction, AccessEvent, ActorId, ResourceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const PAYLOAD_VERSION: u64 = 1;

/// Upper bound on payload size; keeps the signed transaction under the ledger packet limit.
pub const MAX_PAYLOAD_BYTES: usize = 1000;

#[derive(Serialize)]
struct PayloadRef<'a> {
    v: u64,
    id: Uuid,
    actor: &'a str,
    action: String,
    resource: &'a str,
}

#[derive(Deserialize)]
struct PayloadOwned {
    id: Uuid,
    actor: String,
    action: String,
    resource: String,
}

/// Fields recovered from a payload, before block time is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    /// Absent for legacy comma-joined payloads.
    pub event_id: Option<Uuid>,
    pub actor: ActorId,
    pub action: AccessAction,
    pub resource: ResourceId,
}

/// Serialize an event. Deterministic: the same event always yields the same bytes.
pub fn encode_payload(event: &AccessEvent) -> Result<Vec<u8>, CodecError> {
    let payload = PayloadRef {
        v: PAYLOAD_VERSION,
        id: event.event_id,
        actor: event.actor.as_str(),
        action: event.action.label(),
        resource: event.resource.as_str(),
    };
    let bytes =
        serde_json::to_vec(&payload).map_err(|e| CodecError::Serialization(e.to_string()))?;
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(CodecError::PayloadTooLarge {
            size: bytes.len(),
            limit: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(bytes)
}

/// Inverse of [`encode_payload`], also accepting legacy `actor,resource,action` text.
///
/// In the legacy form the action is everything after the second comma, so labels that
/// themselves contain commas are kept whole.
pub fn decode_payload(text: &str) -> Result<DecodedPayload, DecodeError> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        decode_json(trimmed)
    } else {
        decode_legacy(trimmed)
    }
}

fn decode_json(text: &str) -> Result<DecodedPayload, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;
    let version = value
        .get("v")
        .and_then(Value::as_u64)
        .ok_or_else(|| DecodeError::InvalidPayload("missing payload version".to_string()))?;
    if version != PAYLOAD_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let payload: PayloadOwned =
        serde_json::from_value(value).map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;
    Ok(DecodedPayload {
        event_id: Some(payload.id),
        actor: ActorId(payload.actor),
        action: AccessAction::from_label(&payload.action),
        resource: ResourceId(payload.resource),
    })
}

fn decode_legacy(text: &str) -> Result<DecodedPayload, DecodeError> {
    let mut parts = text.splitn(3, ',');
    let (Some(actor), Some(resource), Some(action)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(DecodeError::InvalidPayload(
            "expected a JSON payload or actor,resource,action".to_string(),
        ));
    };
    if actor.is_empty() || resource.is_empty() {
        return Err(DecodeError::InvalidPayload(
            "legacy payload has an empty actor or resource".to_string(),
        ));
    }

    Ok(DecodedPayload {
        event_id: None,
        actor: ActorId::new(actor),
        action: AccessAction::from_label(action),
        resource: ResourceId::new(resource),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn event(action: AccessAction) -> AccessEvent {
        AccessEvent::new(
            ActorId::new("dr.who@clinic.org"),
            action,
            ResourceId::new("file-17"),
        )
    }

    #[test]
    fn multi_word_action_round_trips() {
        let original = event(AccessAction::SharedWith("jane@example.com".into()));
        let bytes = encode_payload(&original).unwrap();
        let decoded = decode_payload(std::str::from_utf8(&bytes).unwrap()).unwrap();

        assert_eq!(decoded.event_id, Some(original.event_id));
        assert_eq!(decoded.actor, original.actor);
        assert_eq!(decoded.resource, original.resource);
        assert_eq!(
            decoded.action,
            AccessAction::SharedWith("jane@example.com".into())
        );
    }

    #[test]
    fn encoding_is_deterministic_and_ordered() {
        let original = event(AccessAction::Downloaded);
        let first = encode_payload(&original).unwrap();
        let second = encode_payload(&original).unwrap();
        assert_eq!(first, second);

        let text = String::from_utf8(first).unwrap();
        assert!(text.starts_with("{\"v\":1,\"id\":"));
        let actor_at = text.find("\"actor\"").unwrap();
        let action_at = text.find("\"action\"").unwrap();
        let resource_at = text.find("\"resource\"").unwrap();
        assert!(actor_at < action_at && action_at < resource_at);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let huge = event(AccessAction::Other("x".repeat(MAX_PAYLOAD_BYTES)));
        assert!(matches!(
            encode_payload(&huge),
            Err(CodecError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn legacy_comma_payload_keeps_whole_action() {
        let decoded = decode_payload("12,34,shared with a@b.org, c@d.org").unwrap();
        assert_eq!(decoded.event_id, None);
        assert_eq!(decoded.actor.as_str(), "12");
        assert_eq!(decoded.resource.as_str(), "34");
        assert_eq!(decoded.action.label(), "shared with a@b.org, c@d.org");
    }

    #[test]
    fn legacy_payload_needs_three_fields() {
        assert!(matches!(
            decode_payload("user123 downloaded"),
            Err(DecodeError::InvalidPayload(_))
        ));
        assert!(matches!(
            decode_payload(",34,read"),
            Err(DecodeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn unknown_version_is_reported() {
        let err = decode_payload(r#"{"v":2,"id":"x"}"#).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedVersion(2));
    }

    #[test]
    fn missing_fields_are_invalid() {
        let err = decode_payload(r#"{"v":1,"actor":"a"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidPayload(_)));
    }

    proptest! {
        #[test]
        fn arbitrary_text_round_trips(
            actor in "\\PC{1,40}",
            action in "\\PC{0,80}",
            resource in "\\PC{1,40}",
        ) {
            let original = AccessEvent::new(
                ActorId::new(actor.clone()),
                AccessAction::from_label(&action),
                ResourceId::new(resource.clone()),
            );
            let bytes = encode_payload(&original).unwrap();
            let decoded = decode_payload(std::str::from_utf8(&bytes).unwrap()).unwrap();
            prop_assert_eq!(decoded.actor.as_str(), actor.as_str());
            prop_assert_eq!(decoded.action.label(), action);
            prop_assert_eq!(decoded.resource.as_str(), resource.as_str());
        }
    }
}
