//! InfluxDB line protocol encoding for telemetry events.
//!
//! One event becomes one line:
//!
//! ```text
//! occupancy_count,room=lobby count=3i 1700000000000000000
//! ```
//!
//! The count is written as an integer field (`i` suffix) and the timestamp in
//! nanoseconds.

use std::collections::BTreeMap;

use crate::event::TelemetryEvent;

/// Field key carrying the count.
pub const FIELD_KEY: &str = "count";

/// Measurement name plus pre-escaped static tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFormat {
    prefix: String,
}

impl LineFormat {
    pub fn new(measurement: &str, tags: &BTreeMap<String, String>) -> Self {
        let mut prefix = escape_measurement(measurement);
        // BTreeMap iteration gives the key order the store prefers.
        for (k, v) in tags {
            if v.is_empty() {
                continue;
            }
            prefix.push(',');
            prefix.push_str(&escape_tag(k));
            prefix.push('=');
            prefix.push_str(&escape_tag(v));
        }
        Self { prefix }
    }

    /// Encode a single event, without trailing newline.
    pub fn line(&self, event: &TelemetryEvent) -> String {
        format!(
            "{} {FIELD_KEY}={}i {}",
            self.prefix,
            event.count,
            event.timestamp.as_nanos()
        )
    }

    /// Encode a batch, newline-terminated per line.
    pub fn encode(&self, events: &[TelemetryEvent]) -> String {
        let mut body = String::with_capacity(events.len() * (self.prefix.len() + 32));
        for event in events {
            body.push_str(&self.line(event));
            body.push('\n');
        }
        body
    }
}

/// Escape commas and spaces in a measurement name.
fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

/// Escape commas, equals signs, and spaces in a tag key or value.
fn escape_tag(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Timestamp;

    fn ev(count: u32, ns: u64) -> TelemetryEvent {
        TelemetryEvent {
            count,
            timestamp: Timestamp::from_nanos(ns),
        }
    }

    #[test]
    fn plain_line() {
        let fmt = LineFormat::new("occupancy_count", &BTreeMap::new());
        assert_eq!(
            fmt.line(&ev(3, 1_700_000_000_000_000_000)),
            "occupancy_count count=3i 1700000000000000000"
        );
    }

    #[test]
    fn tags_are_sorted_and_escaped() {
        let mut tags = BTreeMap::new();
        tags.insert("room".to_string(), "main hall".to_string());
        tags.insert("cam".to_string(), "a=b,c".to_string());
        let fmt = LineFormat::new("occupancy count", &tags);
        assert_eq!(
            fmt.line(&ev(0, 5)),
            r"occupancy\ count,cam=a\=b\,c,room=main\ hall count=0i 5"
        );
    }

    #[test]
    fn empty_tag_values_are_skipped() {
        let mut tags = BTreeMap::new();
        tags.insert("room".to_string(), String::new());
        let fmt = LineFormat::new("m", &tags);
        assert_eq!(fmt.line(&ev(1, 1)), "m count=1i 1");
    }

    #[test]
    fn encode_batch_one_line_per_event() {
        let fmt = LineFormat::new("m", &BTreeMap::new());
        let body = fmt.encode(&[ev(1, 10), ev(2, 20)]);
        assert_eq!(body, "m count=1i 10\nm count=2i 20\n");
        assert_eq!(fmt.encode(&[]), "");
    }

    #[test]
    fn backslash_is_escaped() {
        assert_eq!(escape_tag(r"a\b"), r"a\\b");
    }
}
