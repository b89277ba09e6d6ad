use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form event payload.
pub type Properties = Map<String, Value>;

/// Reading-progress percentages that produce an event. Every other value is dropped.
pub const READING_MILESTONES: [u8; 5] = [25, 50, 75, 90, 100];

/// Whether a scroll or progress percentage is a reporting milestone.
pub fn is_milestone(percentage: u8) -> bool {
    READING_MILESTONES.contains(&percentage)
}

/// Semantic event kinds emitted by the tracker's convenience methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PostView,
    Search,
    Share,
    CategoryView,
    ReadingProgress,
    TimeOnPage,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostView => "post_view",
            Self::Search => "search",
            Self::Share => "share",
            Self::CategoryView => "category_view",
            Self::ReadingProgress => "reading_progress",
            Self::TimeOnPage => "time_on_page",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewport dimensions at the time an event was recorded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Ambient page metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    /// Current path, without query string.
    pub url: String,
    /// Referring URL, or `"direct"`.
    pub referrer: String,
    /// Coarse `"{browser} on {os}"` user agent.
    pub user_agent: String,
    pub viewport: Viewport,
}

/// The canonical telemetry envelope. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
    /// Epoch milliseconds at enrichment time.
    pub timestamp: i64,
    pub session_id: String,
    pub context: EventContext,
}

/// Request body sent to the collector: `{"events": [...]}`.
#[derive(Debug, Serialize)]
pub struct BatchPayload<'a> {
    pub events: &'a [Event],
}
