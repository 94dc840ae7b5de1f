// src/directory.rs - Recipient phone book and per-recipient routing rules
//
// The on-disk format matches the operator-maintained phone book JSON:
// recipients in notification order, each with ordered time-windowed rules.

use crate::error::Result;
use chrono::NaiveTime;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::path::Path;

/// Ordered recipient directory, read-only after load.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct RecipientDirectory {
    recipients: Vec<Recipient>,
}

impl RecipientDirectory {
    /// Load the phone book from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Parse the phone book from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Recipients in directory (notification) order.
    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }
}

/// One on-call person. `active` gates the whole entry; rules are evaluated
/// in order and the first match wins.
#[derive(Debug, Clone, Deserialize)]
pub struct Recipient {
    #[serde(rename = "Name")]
    pub name: String,
    pub phone_number: String,
    #[serde(rename = "Active", deserialize_with = "de_yes_no", default)]
    pub active: bool,
    #[serde(rename = "timeSettings", default)]
    pub rules: Vec<RoutingRule>,
}

/// A time-windowed routing rule.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingRule {
    /// Translated (locale) day names this rule covers
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(rename = "startTime", deserialize_with = "de_time", default = "midnight")]
    pub start_time: NaiveTime,
    #[serde(rename = "endTime", deserialize_with = "de_time", default = "midnight")]
    pub end_time: NaiveTime,
    #[serde(rename = "lowestSeverity", deserialize_with = "de_severity", default)]
    pub lowest_severity: u16,
    #[serde(
        rename = "highestSeverity",
        deserialize_with = "de_severity",
        default = "max_severity"
    )]
    pub highest_severity: u16,
    /// Keyword filter specification; empty means no filtering
    #[serde(rename = "wordFilter", default)]
    pub word_filter: String,
}

impl RoutingRule {
    /// Effective severity band, independent of the order the bounds were
    /// written in.
    pub fn severity_band(&self) -> (u16, u16) {
        (
            self.lowest_severity.min(self.highest_severity),
            self.lowest_severity.max(self.highest_severity),
        )
    }

    pub fn covers_day(&self, translated_day: &str) -> bool {
        self.days.iter().any(|d| d == translated_day)
    }

    /// Inclusive on both boundaries.
    pub fn covers_time(&self, time: NaiveTime) -> bool {
        self.start_time <= time && time <= self.end_time
    }

    pub fn covers_severity(&self, severity: u16) -> bool {
        let (low, high) = self.severity_band();
        low <= severity && severity <= high
    }
}

/// Parsed keyword filter. Terms come lowercased from the filter string;
/// matching is plain substring search on the lowercased message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordFilter {
    pub include_terms: Vec<String>,
    pub exclude_terms: Vec<String>,
}

impl WordFilter {
    /// Parse a filter specification: terms separated by `.`, a `"quoted"`
    /// term is an exact-phrase include, a `-` prefix marks an exclude term,
    /// anything else is a plain include term.
    pub fn parse(spec: &str) -> Self {
        let mut filter = WordFilter::default();
        for part in spec.split('.') {
            if part.len() >= 2 && part.starts_with('"') && part.ends_with('"') {
                filter
                    .include_terms
                    .push(part[1..part.len() - 1].to_lowercase());
            } else if let Some(rest) = part.strip_prefix('-') {
                filter.exclude_terms.push(rest.to_lowercase());
            } else {
                filter.include_terms.push(part.to_lowercase());
            }
        }
        filter
    }

    /// At least one include term present and no exclude term present.
    pub fn matches(&self, message_lower: &str) -> bool {
        self.include_terms.iter().any(|w| message_lower.contains(w))
            && !self.exclude_terms.iter().any(|w| message_lower.contains(w))
    }
}

fn midnight() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).unwrap()
}

fn max_severity() -> u16 {
    100
}

fn de_yes_no<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(value == "Yes")
}

fn de_time<'de, D>(deserializer: D) -> std::result::Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(&value, "%H:%M")
        .map_err(|e| de::Error::custom(format!("invalid time '{value}': {e}")))
}

// The phone book historically stores severities as either numbers or
// numeric strings; accept both.
fn de_severity<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u16),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|e| de::Error::custom(format!("invalid severity '{s}': {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHONE_BOOK: &str = r#"
    [
      {
        "Name": "Anna",
        "phone_number": "+46700000001",
        "Active": "Yes",
        "timeSettings": [
          {
            "days": ["Måndag", "Tisdag"],
            "startTime": "08:00",
            "endTime": "17:00",
            "lowestSeverity": "0",
            "highestSeverity": "100",
            "wordFilter": "\"pump failure\".-test"
          }
        ]
      },
      {
        "Name": "Bosse",
        "phone_number": "+46700000002",
        "Active": "No"
      }
    ]
    "#;

    #[test]
    fn phone_book_parses_in_order() {
        let directory = RecipientDirectory::from_json(PHONE_BOOK).unwrap();
        let recipients = directory.recipients();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].name, "Anna");
        assert!(recipients[0].active);
        assert!(!recipients[1].active);
        assert!(recipients[1].rules.is_empty());

        let rule = &recipients[0].rules[0];
        assert_eq!(rule.start_time, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(rule.end_time, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(rule.severity_band(), (0, 100));
        assert!(rule.covers_day("Måndag"));
        assert!(!rule.covers_day("Söndag"));
    }

    #[test]
    fn severity_band_is_order_independent() {
        let rule = RoutingRule {
            days: vec![],
            start_time: midnight(),
            end_time: midnight(),
            lowest_severity: 80,
            highest_severity: 20,
            word_filter: String::new(),
        };
        assert_eq!(rule.severity_band(), (20, 80));
        assert!(rule.covers_severity(20));
        assert!(rule.covers_severity(50));
        assert!(rule.covers_severity(80));
        assert!(!rule.covers_severity(81));
        assert!(!rule.covers_severity(19));
    }

    #[test]
    fn word_filter_parsing() {
        let filter = WordFilter::parse("\"pump failure\".-test.Motor");
        assert_eq!(
            filter.include_terms,
            vec!["pump failure".to_string(), "motor".to_string()]
        );
        assert_eq!(filter.exclude_terms, vec!["test".to_string()]);
    }

    #[test]
    fn word_filter_matching() {
        let filter = WordFilter::parse("\"pump failure\".-test");
        assert!(filter.matches("pump failure on line 3"));
        assert!(!filter.matches("pump failure test run"));
        assert!(!filter.matches("compressor stalled"));
    }

    #[test]
    fn time_window_is_inclusive() {
        let rule = RoutingRule {
            days: vec!["Monday".into()],
            start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            lowest_severity: 0,
            highest_severity: 100,
            word_filter: String::new(),
        };
        assert!(!rule.covers_time(NaiveTime::from_hms_opt(7, 59, 0).unwrap()));
        assert!(rule.covers_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap()));
        assert!(rule.covers_time(NaiveTime::from_hms_opt(17, 0, 0).unwrap()));
        assert!(!rule.covers_time(NaiveTime::from_hms_opt(17, 0, 1).unwrap()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn severity_band_always_covers_its_own_bounds(lo: u16, hi: u16) {
                let rule = RoutingRule {
                    days: vec![],
                    start_time: midnight(),
                    end_time: midnight(),
                    lowest_severity: lo,
                    highest_severity: hi,
                    word_filter: String::new(),
                };
                let (low, high) = rule.severity_band();
                prop_assert!(low <= high);
                prop_assert!(rule.covers_severity(low));
                prop_assert!(rule.covers_severity(high));
                prop_assert!(rule.covers_severity(lo));
                prop_assert!(rule.covers_severity(hi));
            }

            #[test]
            fn word_filter_parses_arbitrary_specifications(spec in ".*", message in ".*") {
                let filter = WordFilter::parse(&spec);
                let _ = filter.matches(&message.to_lowercase());
            }
        }
    }
}
