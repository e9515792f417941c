//! Flow entry match predicates and flow statistics records.

use crate::TableId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Match predicate of a flow entry.
///
/// Fields are kept in a sorted map so that two predicates with the same
/// fields compare, hash and display identically regardless of the order in
/// which the device listed them.
///
/// # Examples
///
/// ```
/// use ofstats_types::FlowMatch;
///
/// let a = FlowMatch::new().with("ipv4-destination", "10.0.0.1/32").with("in-port", "1");
/// let b = FlowMatch::new().with("in-port", "1").with("ipv4-destination", "10.0.0.1/32");
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "in-port=1,ipv4-destination=10.0.0.1/32");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowMatch {
    fields: BTreeMap<String, String>,
}

impl FlowMatch {
    /// Creates an empty (match-all) predicate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field to the predicate.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Returns the value for a field, if present.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Returns true if this predicate matches every packet.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            return f.write_str("*");
        }
        let mut first = true;
        for (field, value) in &self.fields {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", field, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Counters reported for one flow entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCounters {
    pub packet_count: u64,
    pub byte_count: u64,
    pub duration_sec: u32,
    pub duration_nsec: u32,
}

/// One flow entry as reported in a flow statistics reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStats {
    pub table_id: TableId,
    pub priority: u16,
    #[serde(default)]
    pub cookie: u64,
    #[serde(default, rename = "match")]
    pub flow_match: FlowMatch,
    #[serde(default)]
    pub idle_timeout: u16,
    #[serde(default)]
    pub hard_timeout: u16,
    #[serde(default)]
    pub counters: FlowCounters,
}

impl FlowStats {
    /// Creates a flow record with zeroed counters.
    pub fn new(table_id: TableId, priority: u16, flow_match: FlowMatch) -> Self {
        Self {
            table_id,
            priority,
            cookie: 0,
            flow_match,
            idle_timeout: 0,
            hard_timeout: 0,
            counters: FlowCounters::default(),
        }
    }

    /// Sets the flow cookie.
    pub fn with_cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    /// Sets the packet and byte counters.
    pub fn with_counters(mut self, packet_count: u64, byte_count: u64) -> Self {
        self.counters.packet_count = packet_count;
        self.counters.byte_count = byte_count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_match_display_empty() {
        assert_eq!(FlowMatch::new().to_string(), "*");
    }

    #[test]
    fn test_match_overwrites_field() {
        let m = FlowMatch::new().with("in-port", "1").with("in-port", "2");
        assert_eq!(m.get("in-port"), Some("2"));
        assert_eq!(m.iter().count(), 1);
    }

    #[test]
    fn test_flow_stats_deserialize_defaults() {
        let json = r#"{"table_id": 0, "priority": 100, "match": {"ipv4-destination": "10.0.0.1/32"}}"#;
        let flow: FlowStats = serde_json::from_str(json).unwrap();

        assert_eq!(flow.table_id, TableId::new(0).unwrap());
        assert_eq!(flow.cookie, 0);
        assert_eq!(flow.flow_match.get("ipv4-destination"), Some("10.0.0.1/32"));
        assert_eq!(flow.counters, FlowCounters::default());
    }
}
