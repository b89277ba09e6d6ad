//! Local event mirror for debugging and offline inspection.
//!
//! Best-effort and write-mostly: the delivery path never reads it back.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use tally_core::error::Result;
use tally_core::models::event::{Event, EventKind};

use crate::storage::Storage;

/// Counts derived from the mirrored events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_events: usize,
    pub event_types: BTreeMap<String, u64>,
    pub top_posts: BTreeMap<String, u64>,
    pub top_searches: BTreeMap<String, u64>,
    pub top_categories: BTreeMap<String, u64>,
}

impl AnalyticsSummary {
    pub fn from_events(events: &[Event]) -> Self {
        let mut summary = Self {
            total_events: events.len(),
            ..Self::default()
        };

        for event in events {
            *summary.event_types.entry(event.name.clone()).or_default() += 1;

            let bucket = match event.name.as_str() {
                n if n == EventKind::PostView.as_str() => {
                    Some((&mut summary.top_posts, "postSlug"))
                }
                n if n == EventKind::Search.as_str() => Some((&mut summary.top_searches, "query")),
                n if n == EventKind::CategoryView.as_str() => {
                    Some((&mut summary.top_categories, "categorySlug"))
                }
                _ => None,
            };

            if let Some((counts, field)) = bucket {
                if let Some(key) = event.properties.get(field).and_then(|v| v.as_str()) {
                    *counts.entry(key.to_string()).or_default() += 1;
                }
            }
        }

        summary
    }
}

/// Capped event log kept in durable storage under one key.
pub struct EventMirror {
    storage: Arc<dyn Storage>,
    key: String,
    limit: usize,
}

impl EventMirror {
    pub fn new(storage: Arc<dyn Storage>, key: impl Into<String>, limit: usize) -> Self {
        Self {
            storage,
            key: key.into(),
            limit: limit.max(1),
        }
    }

    /// Append a batch, keeping only the most recent `limit` events.
    pub fn append(&self, events: &[Event]) -> Result<()> {
        let mut all = self.load()?;
        all.extend_from_slice(events);
        let excess = all.len().saturating_sub(self.limit);
        all.drain(..excess);
        let json = serde_json::to_string(&all)?;
        self.storage.set(&self.key, &json)
    }

    pub fn load(&self) -> Result<Vec<Event>> {
        match self.storage.get(&self.key)? {
            Some(json) if !json.is_empty() => Ok(serde_json::from_str(&json)?),
            _ => Ok(Vec::new()),
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.storage.remove(&self.key)
    }

    pub fn summary(&self) -> Result<AnalyticsSummary> {
        Ok(AnalyticsSummary::from_events(&self.load()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use tally_core::models::event::{EventContext, Properties, Viewport};

    fn event(name: &str, props: serde_json::Value) -> Event {
        let properties: Properties = match props {
            serde_json::Value::Object(map) => map,
            _ => Properties::new(),
        };
        Event {
            name: name.to_string(),
            properties,
            timestamp: 0,
            session_id: "sess".into(),
            context: EventContext {
                url: "/".into(),
                referrer: "direct".into(),
                user_agent: String::new(),
                viewport: Viewport::default(),
            },
        }
    }

    #[test]
    fn append_and_load() {
        let mirror = EventMirror::new(Arc::new(MemoryStorage::new()), "events", 10);
        mirror
            .append(&[event("search", json!({"query": "rust"}))])
            .unwrap();
        mirror
            .append(&[event("share", json!({"platform": "x"}))])
            .unwrap();
        let loaded = mirror.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "search");
        assert_eq!(loaded[1].name, "share");
    }

    #[test]
    fn append_keeps_most_recent_events() {
        let mirror = EventMirror::new(Arc::new(MemoryStorage::new()), "events", 3);
        let batch: Vec<Event> = (0..5)
            .map(|n| event(&format!("e{n}"), json!({})))
            .collect();
        mirror.append(&batch).unwrap();
        let names: Vec<String> = mirror.load().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn clear_removes_everything() {
        let mirror = EventMirror::new(Arc::new(MemoryStorage::new()), "events", 10);
        mirror.append(&[event("search", json!({}))]).unwrap();
        mirror.clear().unwrap();
        assert!(mirror.load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_mirror_is_an_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("events", "{not json").unwrap();
        let mirror = EventMirror::new(storage, "events", 10);
        assert!(mirror.load().is_err());
        assert!(mirror.summary().is_err());
    }

    #[test]
    fn summary_counts_by_kind() {
        let events = vec![
            event("post_view", json!({"postSlug": "react-hooks"})),
            event("post_view", json!({"postSlug": "react-hooks"})),
            event("post_view", json!({"postSlug": "rust-intro"})),
            event("search", json!({"query": "hooks"})),
            event("category_view", json!({"categorySlug": "frontend"})),
            event("share", json!({"platform": "linkedin"})),
        ];
        let summary = AnalyticsSummary::from_events(&events);

        assert_eq!(summary.total_events, 6);
        assert_eq!(summary.event_types["post_view"], 3);
        assert_eq!(summary.event_types["share"], 1);
        assert_eq!(summary.top_posts["react-hooks"], 2);
        assert_eq!(summary.top_posts["rust-intro"], 1);
        assert_eq!(summary.top_searches["hooks"], 1);
        assert_eq!(summary.top_categories["frontend"], 1);
    }

    #[test]
    fn summary_serializes_camel_case() {
        let json = serde_json::to_value(AnalyticsSummary::default()).unwrap();
        assert_eq!(json["totalEvents"], 0);
        assert!(json.get("topSearches").is_some());
    }
}
