// src/event.rs - Raw event model and alarm record normalization

use crate::client::NodeRef;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A localized "display text" wrapper as delivered by the protocol layer.
/// Normalization substitutes the label for the raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayText {
    pub text: String,
    pub locale: Option<String>,
}

impl From<&str> for DisplayText {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
            locale: None,
        }
    }
}

/// Raw alarm/condition event as delivered by a session. Servers differ in
/// which attributes they populate; absent attributes stay `None` and are
/// never an error.
#[derive(Debug, Clone, Default)]
pub struct RawAlarmEvent {
    pub message: Option<DisplayText>,
    pub time: Option<DateTime<Utc>>,
    pub severity: Option<u16>,
    pub suppressed_or_shelved: Option<bool>,
    pub acked_state: Option<DisplayText>,
    pub condition_class_id: Option<NodeRef>,
    pub node_id: Option<NodeRef>,
    pub quality: Option<u32>,
    pub retain: Option<bool>,
    pub active_state: Option<DisplayText>,
    pub enabled_state: Option<DisplayText>,
}

/// Condition activity as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActiveState {
    Active,
    Inactive,
}

/// Acknowledgement state as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AckState {
    Acknowledged,
    Unacknowledged,
}

/// Canonical alarm record produced by [`normalize`]. Attributes missing on
/// the raw event are omitted rather than defaulted.
#[derive(Debug, Clone, Serialize)]
pub struct AlarmRecord {
    pub source_address: String,
    pub message: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: Option<u16>,
    pub active_state: Option<ActiveState>,
    pub acked_state: Option<AckState>,
    pub suppressed_or_shelved: Option<bool>,
    pub condition_class_id: Option<String>,
    pub node_id: Option<String>,
    pub quality: Option<u32>,
    pub retain: Option<bool>,
    pub enabled_state: Option<String>,
}

impl AlarmRecord {
    /// The condition is currently active.
    pub fn is_active(&self) -> bool {
        self.active_state == Some(ActiveState::Active)
    }
}

/// Convert a raw protocol event into a canonical [`AlarmRecord`].
pub fn normalize(event: &RawAlarmEvent, source_address: &str) -> AlarmRecord {
    AlarmRecord {
        source_address: source_address.to_string(),
        message: event.message.as_ref().map(|t| t.text.clone()),
        timestamp: event.time,
        severity: event.severity,
        active_state: event.active_state.as_ref().map(|t| parse_active(&t.text)),
        acked_state: event.acked_state.as_ref().map(|t| parse_acked(&t.text)),
        suppressed_or_shelved: event.suppressed_or_shelved,
        condition_class_id: event.condition_class_id.as_ref().map(NodeRef::to_string),
        node_id: event.node_id.as_ref().map(NodeRef::to_string),
        quality: event.quality,
        retain: event.retain,
        enabled_state: event.enabled_state.as_ref().map(|t| t.text.clone()),
    }
}

fn parse_active(text: &str) -> ActiveState {
    if text == "Active" {
        ActiveState::Active
    } else {
        ActiveState::Inactive
    }
}

fn parse_acked(text: &str) -> AckState {
    if text == "Acknowledged" {
        AckState::Acknowledged
    } else {
        AckState::Unacknowledged
    }
}

/// Capability interface a session delivers events through. The connection
/// manager supplies one implementation per active session and discards it on
/// teardown, so nothing downstream ever sees protocol-library types.
///
/// Implementations must not block beyond enqueueing a dispatch item.
pub trait EventSink: Send {
    /// A raw alarm/condition event arrived on the subscription.
    fn event(&mut self, event: RawAlarmEvent);

    /// The server pushed a status change notification.
    fn status_change(&mut self, status: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> RawAlarmEvent {
        RawAlarmEvent {
            message: Some(DisplayText {
                text: "Pump failure on line 3".into(),
                locale: Some("en".into()),
            }),
            severity: Some(700),
            acked_state: Some("Unacknowledged".into()),
            active_state: Some("Active".into()),
            node_id: Some(NodeRef::string(4, "Line3.Pump1.Failure")),
            retain: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn display_text_label_is_substituted() {
        let record = normalize(&sample_event(), "opc.tcp://plc1:4840");
        assert_eq!(record.message.as_deref(), Some("Pump failure on line 3"));
        assert_eq!(record.active_state, Some(ActiveState::Active));
        assert_eq!(record.acked_state, Some(AckState::Unacknowledged));
    }

    #[test]
    fn node_identifier_is_stringified() {
        let record = normalize(&sample_event(), "opc.tcp://plc1:4840");
        assert_eq!(record.node_id.as_deref(), Some("ns=4;s=Line3.Pump1.Failure"));
    }

    #[test]
    fn missing_attributes_stay_omitted() {
        let record = normalize(&RawAlarmEvent::default(), "opc.tcp://plc1:4840");
        assert!(record.message.is_none());
        assert!(record.severity.is_none());
        assert!(record.timestamp.is_none());
        assert!(record.active_state.is_none());
        assert!(record.acked_state.is_none());
        assert!(record.node_id.is_none());
        assert!(!record.is_active());
    }

    #[test]
    fn unknown_state_labels_fall_to_inactive_unacknowledged() {
        let event = RawAlarmEvent {
            active_state: Some("Aktiv".into()),
            acked_state: Some("Kvitterad".into()),
            ..Default::default()
        };
        let record = normalize(&event, "opc.tcp://plc1:4840");
        assert_eq!(record.active_state, Some(ActiveState::Inactive));
        assert_eq!(record.acked_state, Some(AckState::Unacknowledged));
    }
}
