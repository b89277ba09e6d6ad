//! Dwell-time tracking for the currently viewed content item.
//!
//! At most one item is tracked at a time. Finalizing an item yields a
//! [`TimeOnPage`] measurement only when the active time reaches the minimum dwell.

use tally_core::models::engagement::EngagementLevel;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveView {
    item_id: String,
    start_time: i64,
    last_active_time: i64,
}

/// Outcome of finalizing an item that was viewed long enough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeOnPage {
    pub item_id: String,
    pub elapsed_ms: i64,
    pub level: EngagementLevel,
}

impl TimeOnPage {
    /// Elapsed active time in whole seconds, rounded to nearest.
    pub fn seconds(&self) -> i64 {
        (self.elapsed_ms as f64 / 1000.0).round() as i64
    }
}

#[derive(Debug)]
pub struct EngagementTracker {
    min_dwell_ms: i64,
    active: Option<ActiveView>,
}

impl EngagementTracker {
    pub fn new(min_dwell_ms: i64) -> Self {
        Self {
            min_dwell_ms,
            active: None,
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        self.active.as_ref().map(|v| v.item_id.as_str())
    }

    /// Begin tracking `item_id`. A view already in progress is finalized first
    /// and its measurement returned.
    pub fn start(&mut self, item_id: &str, now: i64) -> Option<TimeOnPage> {
        let previous = self.finalize();
        self.active = Some(ActiveView {
            item_id: item_id.to_string(),
            start_time: now,
            last_active_time: now,
        });
        previous
    }

    /// Record user activity. Never moves the start time.
    pub fn touch(&mut self, now: i64) {
        if let Some(view) = self.active.as_mut() {
            view.last_active_time = view.last_active_time.max(now);
        }
    }

    /// End the current view. Views under the minimum dwell are discarded.
    pub fn finalize(&mut self) -> Option<TimeOnPage> {
        let view = self.active.take()?;
        let elapsed_ms = view.last_active_time - view.start_time;
        if elapsed_ms < self.min_dwell_ms {
            tracing::debug!(
                item_id = %view.item_id,
                elapsed_ms,
                "view below minimum dwell, discarded"
            );
            return None;
        }
        Some(TimeOnPage {
            item_id: view.item_id,
            elapsed_ms,
            level: EngagementLevel::from_elapsed_ms(elapsed_ms),
        })
    }

    /// Drop the current view without measuring it.
    pub fn reset(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN_DWELL: i64 = 10_000;

    #[test]
    fn idle_tracker_finalizes_to_nothing() {
        let mut tracker = EngagementTracker::new(MIN_DWELL);
        assert_eq!(tracker.item_id(), None);
        assert_eq!(tracker.finalize(), None);
    }

    #[test]
    fn below_threshold_is_discarded() {
        let mut tracker = EngagementTracker::new(MIN_DWELL);
        tracker.start("post-a", 0);
        tracker.touch(9_999);
        assert_eq!(tracker.finalize(), None);
        assert_eq!(tracker.item_id(), None);
    }

    #[test]
    fn above_threshold_emits_low_engagement() {
        let mut tracker = EngagementTracker::new(MIN_DWELL);
        tracker.start("post-a", 0);
        tracker.touch(10_001);
        let measured = tracker.finalize().expect("should emit");
        assert_eq!(measured.item_id, "post-a");
        assert_eq!(measured.elapsed_ms, 10_001);
        assert_eq!(measured.level, EngagementLevel::Low);
        assert_eq!(measured.seconds(), 10);
        assert_eq!(tracker.item_id(), None);
    }

    #[test]
    fn elapsed_uses_last_activity_not_finalize_time() {
        let mut tracker = EngagementTracker::new(MIN_DWELL);
        tracker.start("post-a", 1_000);
        tracker.touch(61_000);
        // No activity for a long time afterwards does not count.
        let measured = tracker.finalize().unwrap();
        assert_eq!(measured.elapsed_ms, 60_000);
        assert_eq!(measured.level, EngagementLevel::Medium);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut tracker = EngagementTracker::new(MIN_DWELL);
        tracker.start("post-a", 0);
        tracker.touch(200_000);
        tracker.touch(5_000);
        let measured = tracker.finalize().unwrap();
        assert_eq!(measured.elapsed_ms, 200_000);
        assert_eq!(measured.level, EngagementLevel::High);
    }

    #[test]
    fn new_view_finalizes_previous() {
        let mut tracker = EngagementTracker::new(MIN_DWELL);
        tracker.start("post-a", 0);
        tracker.touch(400_000);
        let previous = tracker.start("post-b", 400_000).expect("old view measured");
        assert_eq!(previous.item_id, "post-a");
        assert_eq!(previous.level, EngagementLevel::VeryHigh);
        assert_eq!(tracker.item_id(), Some("post-b"));
    }

    #[test]
    fn touch_without_view_is_ignored() {
        let mut tracker = EngagementTracker::new(MIN_DWELL);
        tracker.touch(50_000);
        assert_eq!(tracker.item_id(), None);
    }

    #[test]
    fn reset_discards_view() {
        let mut tracker = EngagementTracker::new(MIN_DWELL);
        tracker.start("post-a", 0);
        tracker.touch(100_000);
        tracker.reset();
        assert_eq!(tracker.finalize(), None);
    }
}
