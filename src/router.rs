// src/router.rs - Notification routing engine
//
// Pure function of the alarm record, the recipient directory and the
// supplied wall-clock instant. No hidden state; the caller decides what
// "now" is, which keeps every rule testable.

use crate::config::RoutingConfig;
use crate::directory::{RecipientDirectory, WordFilter};
use crate::dispatch::DispatchItem;
use crate::event::AlarmRecord;
use chrono::{DateTime, Local};
use tracing::debug;

/// Evaluate every active recipient's rules against `record` and produce the
/// dispatch items to enqueue. Recipients are visited in directory order;
/// within a recipient the first matching rule wins and evaluation moves on
/// to the next recipient.
pub fn route(
    record: &AlarmRecord,
    directory: &RecipientDirectory,
    routing: &RoutingConfig,
    now: DateTime<Local>,
) -> Vec<DispatchItem> {
    let weekday = now.format("%A").to_string();
    let translated_day = routing
        .day_translation
        .get(&weekday)
        .cloned()
        .unwrap_or(weekday);
    let current_time = now.time();

    let severity = record.severity.unwrap_or(0);
    let message = record.message.as_deref().unwrap_or_default();
    let message_lower = message.to_lowercase();

    let mut items = Vec::new();

    for recipient in directory.recipients() {
        if !recipient.active {
            continue;
        }

        for rule in &recipient.rules {
            if !rule.covers_day(&translated_day)
                || !rule.covers_time(current_time)
                || !rule.covers_severity(severity)
            {
                continue;
            }

            if !rule.word_filter.is_empty()
                && !WordFilter::parse(&rule.word_filter).matches(&message_lower)
            {
                continue;
            }

            debug!(
                recipient = %recipient.name,
                severity,
                "routing rule matched"
            );
            items.push(DispatchItem {
                phone_number: recipient.phone_number.clone(),
                message: format!("{} {}, severity {}", routing.message_template, message, severity),
            });
            // First matching rule wins for this recipient.
            break;
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::RecipientDirectory;
    use crate::event::{ActiveState, AckState};
    use chrono::TimeZone;

    fn record(message: &str, severity: u16) -> AlarmRecord {
        AlarmRecord {
            source_address: "opc.tcp://plc1:4840".into(),
            message: Some(message.into()),
            timestamp: None,
            severity: Some(severity),
            active_state: Some(ActiveState::Active),
            acked_state: Some(AckState::Unacknowledged),
            suppressed_or_shelved: None,
            condition_class_id: None,
            node_id: None,
            quality: None,
            retain: None,
            enabled_state: None,
        }
    }

    fn routing_with_swedish_days() -> RoutingConfig {
        let mut routing = RoutingConfig::default();
        routing.message_template = "Larm:".into();
        routing
            .day_translation
            .insert("Monday".into(), "Måndag".into());
        routing
    }

    // 2026-08-24 is a Monday.
    fn monday_at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 8, 24, hour, minute, 0).unwrap()
    }

    fn directory(json: &str) -> RecipientDirectory {
        RecipientDirectory::from_json(json).unwrap()
    }

    const OFFICE_HOURS: &str = r#"
    [
      {
        "Name": "Anna",
        "phone_number": "+46700000001",
        "Active": "Yes",
        "timeSettings": [
          {
            "days": ["Måndag"],
            "startTime": "08:00",
            "endTime": "17:00",
            "lowestSeverity": 0,
            "highestSeverity": 100
          }
        ]
      }
    ]
    "#;

    #[test]
    fn matches_inside_window_and_translated_day() {
        let items = route(
            &record("Pump failure", 50),
            &directory(OFFICE_HOURS),
            &routing_with_swedish_days(),
            monday_at(9, 30),
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].phone_number, "+46700000001");
        assert_eq!(items[0].message, "Larm: Pump failure, severity 50");
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let routing = routing_with_swedish_days();
        let dir = directory(OFFICE_HOURS);

        assert!(route(&record("x", 50), &dir, &routing, monday_at(7, 59)).is_empty());
        assert_eq!(route(&record("x", 50), &dir, &routing, monday_at(8, 0)).len(), 1);
        assert_eq!(route(&record("x", 50), &dir, &routing, monday_at(17, 0)).len(), 1);
        assert!(route(&record("x", 50), &dir, &routing, monday_at(17, 1)).is_empty());
    }

    #[test]
    fn untranslated_day_does_not_match_translated_rule() {
        // No translation table: the rule names "Måndag" but the weekday
        // stays "Monday".
        let routing = RoutingConfig::default();
        let items = route(
            &record("Pump failure", 50),
            &directory(OFFICE_HOURS),
            &routing,
            monday_at(9, 0),
        );
        assert!(items.is_empty());
    }

    #[test]
    fn first_matching_rule_wins() {
        let json = r#"
        [
          {
            "Name": "Anna",
            "phone_number": "+46700000001",
            "Active": "Yes",
            "timeSettings": [
              {
                "days": ["Måndag"],
                "startTime": "00:00",
                "endTime": "23:59",
                "lowestSeverity": 0,
                "highestSeverity": 100
              },
              {
                "days": ["Måndag"],
                "startTime": "00:00",
                "endTime": "23:59",
                "lowestSeverity": 40,
                "highestSeverity": 60
              }
            ]
          }
        ]
        "#;
        // Both rules cover severity 50; exactly one item is produced.
        let items = route(
            &record("Pump failure", 50),
            &directory(json),
            &routing_with_swedish_days(),
            monday_at(12, 0),
        );
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn inactive_recipients_are_skipped() {
        let json = r#"
        [
          {
            "Name": "Bosse",
            "phone_number": "+46700000002",
            "Active": "No",
            "timeSettings": [
              {
                "days": ["Måndag"],
                "startTime": "00:00",
                "endTime": "23:59",
                "lowestSeverity": 0,
                "highestSeverity": 100
              }
            ]
          }
        ]
        "#;
        let items = route(
            &record("Pump failure", 50),
            &directory(json),
            &routing_with_swedish_days(),
            monday_at(12, 0),
        );
        assert!(items.is_empty());
    }

    #[test]
    fn reversed_severity_band_still_matches() {
        let json = r#"
        [
          {
            "Name": "Anna",
            "phone_number": "+46700000001",
            "Active": "Yes",
            "timeSettings": [
              {
                "days": ["Måndag"],
                "startTime": "00:00",
                "endTime": "23:59",
                "lowestSeverity": 80,
                "highestSeverity": 20
              }
            ]
          }
        ]
        "#;
        let dir = directory(json);
        let routing = routing_with_swedish_days();
        assert_eq!(route(&record("x", 20), &dir, &routing, monday_at(12, 0)).len(), 1);
        assert_eq!(route(&record("x", 80), &dir, &routing, monday_at(12, 0)).len(), 1);
        assert!(route(&record("x", 81), &dir, &routing, monday_at(12, 0)).is_empty());
    }

    #[test]
    fn word_filter_gates_the_rule() {
        let json = r#"
        [
          {
            "Name": "Anna",
            "phone_number": "+46700000001",
            "Active": "Yes",
            "timeSettings": [
              {
                "days": ["Måndag"],
                "startTime": "00:00",
                "endTime": "23:59",
                "lowestSeverity": 0,
                "highestSeverity": 100,
                "wordFilter": "\"pump failure\".-test"
              }
            ]
          }
        ]
        "#;
        let dir = directory(json);
        let routing = routing_with_swedish_days();

        let items = route(
            &record("Pump Failure on line 3", 50),
            &dir,
            &routing,
            monday_at(12, 0),
        );
        assert_eq!(items.len(), 1);

        let items = route(
            &record("pump failure test run", 50),
            &dir,
            &routing,
            monday_at(12, 0),
        );
        assert!(items.is_empty());
    }

    #[test]
    fn recipients_evaluated_in_directory_order() {
        let json = r#"
        [
          {
            "Name": "Anna",
            "phone_number": "+46700000001",
            "Active": "Yes",
            "timeSettings": [
              { "days": ["Måndag"], "startTime": "00:00", "endTime": "23:59" }
            ]
          },
          {
            "Name": "Cilla",
            "phone_number": "+46700000003",
            "Active": "Yes",
            "timeSettings": [
              { "days": ["Måndag"], "startTime": "00:00", "endTime": "23:59" }
            ]
          }
        ]
        "#;
        let items = route(
            &record("Pump failure", 50),
            &directory(json),
            &routing_with_swedish_days(),
            monday_at(12, 0),
        );
        let numbers: Vec<_> = items.iter().map(|i| i.phone_number.as_str()).collect();
        assert_eq!(numbers, vec!["+46700000001", "+46700000003"]);
    }
}
