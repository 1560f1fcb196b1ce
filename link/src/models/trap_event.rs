use serde::Deserialize;

/// Payload of a `logstorage-query-*` trap.
///
/// Both the main result-stream topic and the timeline aggregation topic
/// carry this shape; which counters are present depends on the topic.
#[derive(Debug, Clone, Deserialize)]
pub struct TrapEvent {
    /// Server-assigned query id the event refers to.
    pub id: u64,

    /// Event kind; `"eof"` signals completion.
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,

    /// Rows loaded so far (timeline topic).
    #[serde(default)]
    pub count: Option<u64>,

    /// Authoritative final row count (main topic, eof only).
    #[serde(default)]
    pub total_count: Option<u64>,
}

impl TrapEvent {
    /// True when the event finalizes the query.
    pub fn is_eof(&self) -> bool {
        self.event_type.as_deref() == Some("eof")
    }
}
