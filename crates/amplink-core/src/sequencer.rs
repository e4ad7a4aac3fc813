//! Event envelope decoding and sequence-gap detection.
//!
//! An envelope is a JSON document carrying one `CommonBaseEvent`. A fixed
//! set of fields is read by path; everything else is ignored. Envelopes
//! that lack a required field fail to decode and are dropped by
//! [`EventSequencer::decode_or_discard`] with a warning, so one bad event
//! never reaches consumers.
//!
//! Sequence numbers are authoritative for ordering. Devices number events
//! per subscription target as `next = last + 1 + dropped`, so a forward
//! jump of `k + 1` means exactly `k` events were lost, and a backward jump
//! means the target was recreated (the device rebooted). The sequencer
//! only reports; recovery is the caller's job.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::model::{Event, EventKind, ExtendedAttribute};

const ROOT: &str = "/CommonBaseEvent";
const CREATION_TIME: &str = "/creationTime";
const SEQUENCE_NUMBER: &str = "/sequenceNumber";
const INSTANCE_ID: &str = "/sourceComponentId/instanceId";
const OBJECT_CLASS: &str = "/sourceComponentId/objectClass";
const OBJECT_NAME: &str = "/sourceComponentId/objectName";
const EXTENDED_DATA: &str = "/extendedDataElements";
const MSG_ID: &str = "/msgDataElement/msgId";

const CLIENT_ADDRESS_ATTRIBUTE: &str = "ClientAddress";

/// Why an envelope could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("not an event envelope")]
    NotAnEnvelope,
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Relation of an incoming sequence number to the last one seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// No earlier event from this target.
    First,
    /// Exactly the next number.
    InOrder,
    /// Same number as the last event.
    Duplicate,
    /// Smaller than the last number: the target was recreated.
    Reset,
    /// This many events were skipped.
    Lost(u64),
}

impl SequenceCheck {
    pub fn is_loss(self) -> bool {
        matches!(self, Self::Lost(_))
    }
}

/// Classify `next` against `last`.
pub fn check_sequence(last: u64, next: u64) -> SequenceCheck {
    if next == last {
        SequenceCheck::Duplicate
    } else if next < last {
        SequenceCheck::Reset
    } else if next == last + 1 {
        SequenceCheck::InOrder
    } else {
        SequenceCheck::Lost(next - last - 1)
    }
}

/// Decodes envelopes and tracks the last sequence number per device.
#[derive(Debug, Default)]
pub struct EventSequencer {
    last_seen: DashMap<String, u64>,
}

impl EventSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one envelope into an [`Event`].
    pub fn decode(body: &Value) -> Result<Event, DecodeError> {
        let root = body.pointer(ROOT).unwrap_or(body);
        if !root.is_object() {
            return Err(DecodeError::NotAnEnvelope);
        }

        let device_id = required_str(root, INSTANCE_ID)?.to_owned();
        let sequence_number = parse_sequence(root)?;
        let timestamp = parse_timestamp(root)?;
        let code = required_str(root, MSG_ID)?.to_owned();
        let object_class = optional_str(root, OBJECT_CLASS);
        let object_name = optional_str(root, OBJECT_NAME);
        let attributes = parse_attributes(root)?;
        let client_address = attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(CLIENT_ADDRESS_ATTRIBUTE))
            .and_then(|a| a.values.first().cloned());
        let kind = EventKind::classify(&code, object_name.as_deref());

        Ok(Event {
            device_id,
            sequence_number,
            kind,
            code,
            object_class,
            object_name,
            timestamp,
            client_address,
            attributes,
        })
    }

    /// Decode, logging and dropping anything malformed.
    pub fn decode_or_discard(body: &Value, peer: SocketAddr) -> Option<Event> {
        match Self::decode(body) {
            Ok(event) => {
                debug!(
                    %peer,
                    device = %event.device_id,
                    seq = event.sequence_number,
                    kind = %event.kind,
                    "event decoded"
                );
                Some(event)
            }
            Err(e) => {
                warn!(%peer, error = %e, "discarding undecodable event");
                None
            }
        }
    }

    /// Record `event` and classify its sequence number.
    ///
    /// Duplicates leave the recorded number unchanged; every other outcome
    /// moves it to the event's number.
    ///
    /// Reordering inside the delivery window therefore reports twice:
    /// 5, 7, 6, 8 yields `Lost(1)`, `Reset`, `Lost(1)`, although nothing
    /// was lost. Each report asks for a full re-fetch.
    pub fn observe(&self, event: &Event) -> SequenceCheck {
        let next = event.sequence_number;
        let (check, last) = match self.last_seen.entry(event.device_id.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(next);
                return SequenceCheck::First;
            }
            Entry::Occupied(mut occupied) => {
                let last = *occupied.get();
                let check = check_sequence(last, next);
                if check != SequenceCheck::Duplicate {
                    occupied.insert(next);
                }
                (check, last)
            }
        };

        match check {
            SequenceCheck::Lost(count) => warn!(
                device = %event.device_id,
                last,
                next,
                lost = count,
                "event sequence gap"
            ),
            SequenceCheck::Reset => info!(
                device = %event.device_id,
                last,
                next,
                "event sequence reset, target recreated"
            ),
            SequenceCheck::Duplicate => {
                debug!(device = %event.device_id, seq = next, "duplicate event");
            }
            SequenceCheck::First | SequenceCheck::InOrder => {}
        }
        check
    }

    /// Last recorded sequence number for a device.
    pub fn last_seen(&self, device_id: &str) -> Option<u64> {
        self.last_seen.get(device_id).map(|v| *v)
    }

    /// Drop tracking for a device, e.g. after resubscribing.
    pub fn forget(&self, device_id: &str) {
        self.last_seen.remove(device_id);
    }
}

// ── Field extraction ───────────────────────────────────────────────

fn required_str<'a>(root: &'a Value, path: &'static str) -> Result<&'a str, DecodeError> {
    root.pointer(path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(DecodeError::MissingField(path))
}

fn optional_str(root: &Value, path: &str) -> Option<String> {
    root.pointer(path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn parse_sequence(root: &Value) -> Result<u64, DecodeError> {
    match root.pointer(SEQUENCE_NUMBER) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(SEQUENCE_NUMBER)),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| DecodeError::InvalidField {
            field: SEQUENCE_NUMBER,
            reason: format!("{n} is not a non-negative integer"),
        }),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| DecodeError::InvalidField {
            field: SEQUENCE_NUMBER,
            reason: format!("'{s}' is not a non-negative integer"),
        }),
        Some(other) => Err(DecodeError::InvalidField {
            field: SEQUENCE_NUMBER,
            reason: format!("unexpected {other}"),
        }),
    }
}

fn parse_timestamp(root: &Value) -> Result<DateTime<Utc>, DecodeError> {
    let raw = required_str(root, CREATION_TIME)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DecodeError::InvalidField {
            field: CREATION_TIME,
            reason: e.to_string(),
        })
}

fn parse_attributes(root: &Value) -> Result<Vec<ExtendedAttribute>, DecodeError> {
    let Some(elements) = root.pointer(EXTENDED_DATA) else {
        return Ok(Vec::new());
    };
    let Some(elements) = elements.as_array() else {
        return Err(DecodeError::InvalidField {
            field: EXTENDED_DATA,
            reason: "expected an array".into(),
        });
    };

    elements
        .iter()
        .map(|element| {
            let name = required_str(element, "/name")?.to_owned();
            let kind = optional_str(element, "/type").unwrap_or_else(|| "string".into());
            let values = match element.get("values") {
                Some(Value::Array(values)) => values.iter().map(scalar_to_string).collect(),
                Some(value) => vec![scalar_to_string(value)],
                None => Vec::new(),
            };
            Ok(ExtendedAttribute { name, kind, values })
        })
        .collect()
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::model::event::codes;

    fn envelope(seq: serde_json::Value, code: &str, object_name: &str) -> Value {
        json!({
            "CommonBaseEvent": {
                "creationTime": "2026-03-14T09:26:53Z",
                "sequenceNumber": seq,
                "sourceComponentId": {
                    "instanceId": "0A1B2C3D",
                    "objectClass": "Domain",
                    "objectName": object_name
                },
                "extendedDataElements": [
                    { "name": "ClientAddress", "type": "string", "values": ["10.1.2.3"] },
                    { "name": "Port", "type": "int", "values": [5550] }
                ],
                "msgDataElement": { "msgId": code }
            }
        })
    }

    fn event(device: &str, seq: u64) -> Event {
        let mut e = EventSequencer::decode(&envelope(json!(seq), codes::OP_STATE_UP, "prod")).unwrap();
        e.device_id = device.into();
        e
    }

    #[test]
    fn gap_detection_rules() {
        assert_eq!(check_sequence(5, 6), SequenceCheck::InOrder);
        assert_eq!(check_sequence(5, 9), SequenceCheck::Lost(3));
        assert_eq!(check_sequence(250, 0), SequenceCheck::Reset);
        assert_eq!(check_sequence(5, 5), SequenceCheck::Duplicate);
    }

    #[test]
    fn decodes_fixed_fields() {
        let event =
            EventSequencer::decode(&envelope(json!("42"), codes::OP_STATE_DOWN, "prod")).unwrap();
        assert_eq!(event.device_id, "0A1B2C3D");
        assert_eq!(event.sequence_number, 42);
        assert_eq!(event.kind, EventKind::OpStateDown);
        assert_eq!(event.object_class.as_deref(), Some("Domain"));
        assert_eq!(event.domain(), Some("prod"));
        assert_eq!(event.client_address.as_deref(), Some("10.1.2.3"));
        assert_eq!(event.attribute("port"), Some("5550"));
        assert_eq!(event.timestamp.to_rfc3339(), "2026-03-14T09:26:53+00:00");
    }

    #[test]
    fn settings_object_is_classified_as_settings_change() {
        let event = EventSequencer::decode(&envelope(
            json!(1),
            codes::DOMAIN_CONFIG_MODIFIED,
            codes::SETTINGS_OBJECT_NAME,
        ))
        .unwrap();
        assert_eq!(event.kind, EventKind::SettingsChanged);
    }

    #[test]
    fn unknown_code_still_decodes() {
        let event = EventSequencer::decode(&envelope(json!(3), "0x12345678", "prod")).unwrap();
        assert_eq!(event.kind, EventKind::Unrecognized);
        assert_eq!(event.code, "0x12345678");
    }

    #[test]
    fn malformed_envelopes_are_rejected() {
        assert_eq!(
            EventSequencer::decode(&json!([1, 2, 3])).unwrap_err(),
            DecodeError::NotAnEnvelope
        );
        assert_eq!(
            EventSequencer::decode(&json!({ "CommonBaseEvent": {} })).unwrap_err(),
            DecodeError::MissingField(INSTANCE_ID)
        );
        let negative = envelope(json!(-4), codes::TEST, "x");
        assert!(matches!(
            EventSequencer::decode(&negative).unwrap_err(),
            DecodeError::InvalidField { field: SEQUENCE_NUMBER, .. }
        ));
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        assert!(EventSequencer::decode_or_discard(&json!("junk"), peer).is_none());
    }

    #[test]
    fn observe_tracks_each_device_independently() {
        let seq = EventSequencer::new();
        assert_eq!(seq.observe(&event("A", 5)), SequenceCheck::First);
        assert_eq!(seq.observe(&event("A", 6)), SequenceCheck::InOrder);
        assert_eq!(seq.observe(&event("B", 100)), SequenceCheck::First);
        assert_eq!(seq.observe(&event("A", 6)), SequenceCheck::Duplicate);
        assert_eq!(seq.observe(&event("A", 10)), SequenceCheck::Lost(3));
        assert_eq!(seq.observe(&event("A", 0)), SequenceCheck::Reset);
        assert_eq!(seq.last_seen("A"), Some(0));
        assert_eq!(seq.last_seen("B"), Some(100));

        seq.forget("A");
        assert_eq!(seq.observe(&event("A", 77)), SequenceCheck::First);
    }

    #[test]
    fn reordered_delivery_reports_loss_then_reset() {
        let seq = EventSequencer::new();
        let checks: Vec<_> = [5, 7, 6, 8]
            .into_iter()
            .map(|n| seq.observe(&event("A", n)))
            .collect();
        assert_eq!(
            checks,
            vec![
                SequenceCheck::First,
                SequenceCheck::Lost(1),
                SequenceCheck::Reset,
                SequenceCheck::Lost(1),
            ]
        );
    }
}
