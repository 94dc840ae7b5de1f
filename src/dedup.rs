// src/dedup.rs - Recurrence suppression for already-open conditions

use crate::event::{AckState, AlarmRecord};
use std::collections::HashSet;

/// Per-subscription set of alarm messages currently considered open and
/// unacknowledged. Owned exclusively by the server's task; never shared and
/// never persisted, so a restart starts clean.
///
/// The suppression key is the alarm message text only, not message plus
/// source node. Two sources emitting identical text dedup against each
/// other; see `dedup_key_ignores_source_node` below.
#[derive(Debug, Default)]
pub struct RecurrenceSet {
    open: HashSet<String>,
}

impl RecurrenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `record` represents a new alarm worth routing, and
    /// update the open set accordingly.
    ///
    /// Records without a message have no dedup key and always pass.
    /// A repeat of an open unacknowledged alarm is suppressed; an
    /// acknowledgement closes the entry but is itself suppressed (the ack
    /// is not a new alarm to route).
    pub fn should_process(&mut self, record: &AlarmRecord) -> bool {
        let message = match record.message.as_deref() {
            Some(m) if !m.is_empty() => m,
            _ => return true,
        };

        if self.open.contains(message) {
            if record.acked_state == Some(AckState::Acknowledged) {
                self.open.remove(message);
            }
            false
        } else {
            self.open.insert(message.to_string());
            true
        }
    }

    /// Number of currently-open unacknowledged alarms.
    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ActiveState;

    fn record(message: Option<&str>, acked: AckState) -> AlarmRecord {
        AlarmRecord {
            source_address: "opc.tcp://plc1:4840".into(),
            message: message.map(str::to_string),
            timestamp: None,
            severity: Some(500),
            active_state: Some(ActiveState::Active),
            acked_state: Some(acked),
            suppressed_or_shelved: None,
            condition_class_id: None,
            node_id: None,
            quality: None,
            retain: None,
            enabled_state: None,
        }
    }

    #[test]
    fn repeat_of_open_alarm_is_suppressed() {
        let mut set = RecurrenceSet::new();
        let first = record(Some("Tank overflow"), AckState::Unacknowledged);
        assert!(set.should_process(&first));
        assert!(!set.should_process(&first));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn acknowledgement_closes_entry_but_is_not_routed() {
        let mut set = RecurrenceSet::new();
        assert!(set.should_process(&record(Some("Tank overflow"), AckState::Unacknowledged)));

        // The ack itself is suppressed and removes the entry.
        assert!(!set.should_process(&record(Some("Tank overflow"), AckState::Acknowledged)));
        assert!(set.is_empty());

        // A fresh occurrence after the ack is processed again.
        assert!(set.should_process(&record(Some("Tank overflow"), AckState::Unacknowledged)));
    }

    #[test]
    fn missing_or_empty_message_always_passes() {
        let mut set = RecurrenceSet::new();
        assert!(set.should_process(&record(None, AckState::Unacknowledged)));
        assert!(set.should_process(&record(None, AckState::Unacknowledged)));
        assert!(set.should_process(&record(Some(""), AckState::Unacknowledged)));
        assert!(set.is_empty());
    }

    // Known limitation, preserved on purpose: the key is the message text
    // alone, so distinct source nodes with identical text suppress each
    // other.
    #[test]
    fn dedup_key_ignores_source_node() {
        let mut set = RecurrenceSet::new();

        let mut from_pump1 = record(Some("Motor overtemp"), AckState::Unacknowledged);
        from_pump1.node_id = Some("ns=4;s=Pump1".into());
        let mut from_pump2 = record(Some("Motor overtemp"), AckState::Unacknowledged);
        from_pump2.node_id = Some("ns=4;s=Pump2".into());

        assert!(set.should_process(&from_pump1));
        assert!(!set.should_process(&from_pump2));
    }
}
