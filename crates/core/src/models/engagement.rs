use serde::{Deserialize, Serialize};

/// Coarse dwell-time bucket attached to `time_on_page` events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl EngagementLevel {
    /// Bucket an elapsed active time: under 30s is low, under 2 minutes medium,
    /// under 5 minutes high, anything longer very high.
    pub fn from_elapsed_ms(elapsed_ms: i64) -> Self {
        let seconds = elapsed_ms as f64 / 1000.0;
        if seconds < 30.0 {
            Self::Low
        } else if seconds < 120.0 {
            Self::Medium
        } else if seconds < 300.0 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

impl std::fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
