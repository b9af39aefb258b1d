//! Lifecycle timeline types: event classification, events, and structural diffs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic category of one audit verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Create,
    Update,
    Delete,
    Get,
}

impl EventType {
    /// Case-insensitive verb mapping. Verbs other than create/update/patch/delete/get
    /// (watch, list, unknown) fall back to `Update`.
    pub fn from_verb(verb: &str) -> Self {
        match verb.to_ascii_lowercase().as_str() {
            "create" => EventType::Create,
            "update" | "patch" => EventType::Update,
            "delete" => EventType::Delete,
            "get" => EventType::Get,
            _ => EventType::Update,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Create => "CREATE",
            EventType::Update => "UPDATE",
            EventType::Delete => "DELETE",
            EventType::Get => "GET",
        }
    }

    pub fn is_read_only(self) -> bool {
        matches!(self, EventType::Get)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field change between two states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub path: String,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
}

/// Structural delta keyed by dot-joined field paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDiff {
    #[serde(default)]
    pub added: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub removed: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub modified: BTreeMap<String, DiffEntry>,
}

impl ResourceDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// One entry of the reconstructed timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    /// Empty object for deletes and for events whose payload carried no object.
    pub resource_state: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<ResourceDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<serde_json::Value>,
}

/// Drop read-only (GET) events when `hide_read_only` is set; order is preserved.
pub fn filter_read_only(events: Vec<LifecycleEvent>, hide_read_only: bool) -> Vec<LifecycleEvent> {
    if !hide_read_only {
        return events;
    }
    events
        .into_iter()
        .filter(|e| !e.event_type.is_read_only())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: i64, event_type: EventType) -> LifecycleEvent {
        LifecycleEvent {
            id,
            event_type,
            timestamp: Utc::now(),
            user: "admin".to_string(),
            resource_state: serde_json::json!({}),
            diff: None,
            previous_state: None,
        }
    }

    #[test]
    fn verb_mapping() {
        assert_eq!(EventType::from_verb("create"), EventType::Create);
        assert_eq!(EventType::from_verb("UPDATE"), EventType::Update);
        assert_eq!(EventType::from_verb("Patch"), EventType::Update);
        assert_eq!(EventType::from_verb("delete"), EventType::Delete);
        assert_eq!(EventType::from_verb("get"), EventType::Get);
    }

    #[test]
    fn unknown_verbs_fall_back_to_update() {
        for verb in ["watch", "list", "deletecollection", "proxy", ""] {
            assert_eq!(
                EventType::from_verb(verb),
                EventType::Update,
                "verb {verb:?}"
            );
        }
    }

    #[test]
    fn serializes_type_and_omits_absent_diff() {
        let v = serde_json::to_value(event(7, EventType::Create)).unwrap();
        assert_eq!(v["type"], "CREATE");
        assert_eq!(v["id"], 7);
        assert!(v.get("diff").is_none());
        assert!(v.get("previousState").is_none());
        assert!(v.get("resourceState").is_some());
    }

    #[test]
    fn filter_hides_gets_only_when_asked() {
        let events = vec![
            event(3, EventType::Update),
            event(2, EventType::Get),
            event(1, EventType::Create),
        ];
        assert_eq!(filter_read_only(events.clone(), false).len(), 3);
        let ids: Vec<i64> = filter_read_only(events, true).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }
}
