//! One-way notification port for a secondary analytics sink.
//!
//! The engine never observes what the forwarder does: results are discarded and
//! panics are contained, so a broken forwarder cannot touch queue or delivery state.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tally_core::error::Result;
use tally_core::models::engagement::EngagementLevel;

/// Notifications mirrored to the secondary sink. Text fields are already sanitized.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardedEvent {
    PostView {
        slug: String,
        title: String,
        category: String,
        reading_time: u32,
    },
    Search {
        query: String,
        results_count: u64,
    },
    Share {
        platform: String,
        slug: String,
        title: String,
    },
    CategoryView {
        slug: String,
        name: String,
        post_count: u64,
    },
    ReadingProgress {
        slug: String,
        percentage: u8,
    },
    EngagementTime {
        slug: String,
        elapsed_ms: i64,
        level: EngagementLevel,
    },
}

pub trait Forwarder: Send + Sync {
    fn forward(&self, event: &ForwardedEvent) -> Result<()>;
}

/// Forwarder that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopForwarder;

impl Forwarder for NoopForwarder {
    fn forward(&self, _event: &ForwardedEvent) -> Result<()> {
        Ok(())
    }
}

/// Fire-and-forget delivery to a forwarder.
pub fn notify(forwarder: &dyn Forwarder, event: ForwardedEvent) {
    match catch_unwind(AssertUnwindSafe(|| forwarder.forward(&event))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "secondary forwarder rejected event");
        }
        Err(_) => {
            tracing::warn!("secondary forwarder panicked; event dropped");
        }
    }
}
