//! Event enrichment — wraps a raw event name and properties into the canonical envelope.

use tally_core::models::event::{Event, EventContext, Properties};
use tally_core::sanitize::sanitize_user_agent;

use crate::page::PageContext;

const DIRECT_REFERRER: &str = "direct";

/// Builds [`Event`] envelopes for one session.
pub struct EventCollector {
    session_id: String,
}

impl EventCollector {
    pub fn new(session_id: String) -> Self {
        Self { session_id }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Build an envelope from caller properties plus ambient page context.
    ///
    /// The user agent is reduced to its browser and OS families; the full string
    /// never leaves this function.
    pub fn collect_event(
        &self,
        name: &str,
        properties: Properties,
        timestamp: i64,
        page: &dyn PageContext,
    ) -> Event {
        let referrer = page
            .referrer()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DIRECT_REFERRER.to_string());

        Event {
            name: name.to_string(),
            properties,
            timestamp,
            session_id: self.session_id.clone(),
            context: EventContext {
                url: page.path(),
                referrer,
                user_agent: sanitize_user_agent(page.user_agent().as_deref()),
                viewport: page.viewport(),
            },
        }
    }
}
