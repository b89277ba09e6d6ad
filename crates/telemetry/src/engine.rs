//! The analytics engine: consent-gated tracking, batching and delivery.
//!
//! One [`Analytics`] is constructed per page load and handed to whatever calls
//! the tracking methods. Clones share state.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::runtime::Handle;

use tally_core::config::TallyConfig;
use tally_core::error::Result;
use tally_core::models::event::{is_milestone, EventKind, Properties};
use tally_core::sanitize::sanitize_text;

use crate::batcher::{decide, EventQueue, FlushDecision, FlushTimer};
use crate::clock::{Clock, SystemClock};
use crate::collector::EventCollector;
use crate::consent::ConsentStore;
use crate::engagement::{EngagementTracker, TimeOnPage};
use crate::forwarder::{notify, ForwardedEvent, Forwarder, NoopForwarder};
use crate::lifecycle::{LifecycleHooks, LifecycleSignal, Visibility};
use crate::mirror::{AnalyticsSummary, EventMirror};
use crate::page::PageContext;
use crate::reporter::{sink_from_config, EventSink};
use crate::session::generate_session_id;
use crate::storage::{FileStorage, MemoryStorage, Storage};

/// Host capabilities the engine runs against.
pub struct Ports {
    pub storage: Arc<dyn Storage>,
    pub sink: Arc<dyn EventSink>,
    pub page: Arc<dyn PageContext>,
    pub forwarder: Arc<dyn Forwarder>,
    pub clock: Arc<dyn Clock>,
}

impl Ports {
    /// Ports with no secondary forwarder and the system clock.
    pub fn new(
        storage: Arc<dyn Storage>,
        sink: Arc<dyn EventSink>,
        page: Arc<dyn PageContext>,
    ) -> Self {
        Self {
            storage,
            sink,
            page,
            forwarder: Arc::new(NoopForwarder),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_forwarder(mut self, forwarder: Arc<dyn Forwarder>) -> Self {
        self.forwarder = forwarder;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

struct EngineState {
    enabled: bool,
    /// Bumped on every consent withdrawal.
    epoch: u64,
    queue: EventQueue,
    timer: FlushTimer,
    flush_scheduled: bool,
    engagement: EngagementTracker,
    hooks: LifecycleHooks,
}

struct Inner {
    batch_timeout: Duration,
    mirror_active: bool,
    consent: ConsentStore,
    mirror: EventMirror,
    collector: EventCollector,
    sink: Arc<dyn EventSink>,
    page: Arc<dyn PageContext>,
    forwarder: Arc<dyn Forwarder>,
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
    /// Held for the whole of a delivery so at most one batch is in flight.
    delivery: tokio::sync::Mutex<()>,
}

/// Client-side analytics engine.
#[derive(Clone)]
pub struct Analytics {
    inner: Arc<Inner>,
}

impl Analytics {
    /// Create an engine. Collection starts immediately if consent was stored earlier.
    pub fn new(config: &TallyConfig, ports: Ports) -> Self {
        let consent = ConsentStore::new(ports.storage.clone(), config.storage.consent_key.clone());
        let mirror = EventMirror::new(
            ports.storage.clone(),
            config.storage.events_key.clone(),
            config.storage.mirror_limit,
        );
        let session_id = generate_session_id(ports.clock.now_millis());

        let enabled = consent.check();
        let mut hooks = LifecycleHooks::default();
        if enabled {
            hooks.bind();
        }

        let state = EngineState {
            enabled,
            epoch: 0,
            queue: EventQueue::new(config.batching.batch_size, config.batching.max_queue_len),
            timer: FlushTimer::default(),
            flush_scheduled: false,
            engagement: EngagementTracker::new(config.engagement.min_dwell_ms),
            hooks,
        };

        tracing::debug!(session_id = %session_id, enabled, "analytics engine created");

        Self {
            inner: Arc::new(Inner {
                batch_timeout: Duration::from_millis(config.batching.batch_timeout_ms),
                mirror_active: config.storage.mirror_active(config.collector.mode),
                consent,
                mirror,
                collector: EventCollector::new(session_id),
                sink: ports.sink,
                page: ports.page,
                forwarder: ports.forwarder,
                clock: ports.clock,
                state: Mutex::new(state),
                delivery: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Validate the configuration and build storage and sink from it.
    pub fn from_config(config: &TallyConfig, page: Arc<dyn PageContext>) -> Result<Self> {
        config.validate()?;
        let storage: Arc<dyn Storage> = match &config.storage.data_dir {
            Some(dir) => Arc::new(FileStorage::open(dir)?),
            None => Arc::new(MemoryStorage::new()),
        };
        let sink = sink_from_config(&config.collector)?;
        Ok(Self::new(config, Ports::new(storage, sink, page)))
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Consent ──────────────────────────────────────────────────────────

    /// Read the persisted consent flag. Any storage failure reads as `false`.
    pub fn check_consent(&self) -> bool {
        self.inner.consent.check()
    }

    /// Persist the user's choice and start or stop collection accordingly.
    ///
    /// Withdrawal always takes effect in memory, even if persisting it fails.
    pub fn set_consent(&self, granted: bool) {
        if let Err(err) = self.inner.consent.store(granted) {
            tracing::warn!(error = %err, granted, "could not persist analytics consent");
        }

        if granted {
            let newly_bound = {
                let mut state = self.lock();
                state.enabled = true;
                state.hooks.bind()
            };
            if newly_bound {
                tracing::info!("analytics consent granted, collection started");
            }
        } else {
            {
                let mut state = self.lock();
                state.enabled = false;
                state.epoch += 1;
                state.engagement.reset();
                state.hooks.unbind();
            }
            self.clear_data();
            tracing::info!("analytics consent withdrawn, collection stopped");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Drop queued events, cancel the pending flush and erase the local mirror.
    pub fn clear_data(&self) {
        {
            let mut state = self.lock();
            state.queue.clear();
            state.timer.cancel();
            state.flush_scheduled = false;
        }
        if let Err(err) = self.inner.mirror.clear() {
            tracing::warn!(error = %err, "could not clear mirrored analytics events");
        }
    }

    // ── Tracking ─────────────────────────────────────────────────────────

    /// Record an event with free-form properties. No-op without consent.
    pub fn track(&self, name: &str, properties: Properties) {
        self.record(name, properties);
    }

    pub fn track_post_view(&self, slug: &str, title: &str, category: &str, reading_time: u32) {
        let now = self.inner.clock.now_millis();
        let title = sanitize_text(title);

        let previous = {
            let mut state = self.lock();
            if !state.enabled {
                return;
            }
            let previous = state.engagement.start(slug, now);
            if let Some(measured) = &previous {
                self.enqueue(&mut state, EventKind::TimeOnPage.as_str(), time_on_page_properties(measured), now);
            }
            let properties = props([
                ("postSlug", json!(slug)),
                ("postTitle", json!(title)),
                ("category", json!(category)),
                ("readingTime", json!(reading_time)),
                ("viewStartTime", json!(now)),
            ]);
            self.enqueue(&mut state, EventKind::PostView.as_str(), properties, now);
            previous
        };

        if let Some(measured) = previous {
            self.forward_engagement(measured);
        }
        self.forward(ForwardedEvent::PostView {
            slug: slug.to_string(),
            title,
            category: category.to_string(),
            reading_time,
        });
    }

    pub fn track_search(&self, query: &str, results_count: u64, category: Option<&str>) {
        let clean = sanitize_text(query);
        let properties = props([
            ("query", json!(clean)),
            ("resultsCount", json!(results_count)),
            ("category", category.map_or(Value::Null, |c| json!(c))),
            ("queryLength", json!(query.chars().count())),
        ]);
        if self.record(EventKind::Search.as_str(), properties) {
            self.forward(ForwardedEvent::Search {
                query: clean,
                results_count,
            });
        }
    }

    pub fn track_share(&self, platform: &str, slug: &str, title: &str) {
        let title = sanitize_text(title);
        let properties = props([
            ("platform", json!(platform)),
            ("postSlug", json!(slug)),
            ("postTitle", json!(title)),
        ]);
        if self.record(EventKind::Share.as_str(), properties) {
            self.forward(ForwardedEvent::Share {
                platform: platform.to_string(),
                slug: slug.to_string(),
                title,
            });
        }
    }

    pub fn track_category_view(&self, slug: &str, name: &str, post_count: u64) {
        let name = sanitize_text(name);
        let properties = props([
            ("categorySlug", json!(slug)),
            ("categoryName", json!(name)),
            ("postsCount", json!(post_count)),
        ]);
        if self.record(EventKind::CategoryView.as_str(), properties) {
            self.forward(ForwardedEvent::CategoryView {
                slug: slug.to_string(),
                name,
                post_count,
            });
        }
    }

    /// Record reading progress. Only the 25/50/75/90/100 milestones are kept.
    pub fn track_reading_progress(&self, slug: &str, percentage: u8) {
        if !is_milestone(percentage) {
            return;
        }
        let properties = props([
            ("postSlug", json!(slug)),
            ("percentage", json!(percentage)),
            ("milestone", json!(format!("{percentage}%"))),
        ]);
        if self.record(EventKind::ReadingProgress.as_str(), properties) {
            self.forward(ForwardedEvent::ReadingProgress {
                slug: slug.to_string(),
                percentage,
            });
        }
    }

    fn record(&self, name: &str, properties: Properties) -> bool {
        let now = self.inner.clock.now_millis();
        let mut state = self.lock();
        if !state.enabled {
            return false;
        }
        self.enqueue(&mut state, name, properties, now);
        true
    }

    /// Append an enriched event and apply the flush policy.
    fn enqueue(&self, state: &mut EngineState, name: &str, properties: Properties, now: i64) {
        let event = self
            .inner
            .collector
            .collect_event(name, properties, now, self.inner.page.as_ref());

        let dropped = state.queue.push(event);
        if dropped > 0 {
            tracing::warn!(dropped, "analytics queue full, oldest events dropped");
        }

        match decide(&state.queue, &state.timer, state.flush_scheduled) {
            FlushDecision::FlushNow => self.spawn_flush(state),
            FlushDecision::StartTimer => self.start_timer(state),
            FlushDecision::Wait => {}
        }
    }

    fn forward(&self, event: ForwardedEvent) {
        notify(self.inner.forwarder.as_ref(), event);
    }

    fn forward_engagement(&self, measured: TimeOnPage) {
        self.forward(ForwardedEvent::EngagementTime {
            slug: measured.item_id,
            elapsed_ms: measured.elapsed_ms,
            level: measured.level,
        });
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Feed a page lifecycle signal. Ignored unless hooks are bound.
    pub async fn dispatch(&self, signal: LifecycleSignal) {
        let now = self.inner.clock.now_millis();
        match signal {
            LifecycleSignal::Visibility(Visibility::Hidden) => self.finish_view(now),
            LifecycleSignal::Visibility(Visibility::Visible) | LifecycleSignal::Activity(_) => {
                let mut state = self.lock();
                if state.hooks.is_bound() {
                    state.engagement.touch(now);
                }
            }
            LifecycleSignal::Scroll(metrics) => {
                let mut state = self.lock();
                if state.hooks.is_bound() {
                    state.engagement.touch(now);
                    state.hooks.record_scroll(metrics);
                }
            }
            LifecycleSignal::AnimationFrame => {
                let progress = {
                    let mut state = self.lock();
                    if !state.hooks.is_bound() {
                        return;
                    }
                    let sample = state.hooks.take_frame();
                    match (sample, state.engagement.item_id()) {
                        (Some(metrics), Some(item)) => {
                            metrics.depth_percent().map(|pct| (item.to_string(), pct))
                        }
                        _ => None,
                    }
                };
                if let Some((item, percentage)) = progress {
                    self.track_reading_progress(&item, percentage);
                }
            }
            LifecycleSignal::BeforeUnload => {
                if !self.hooks_bound() {
                    return;
                }
                self.finish_view(now);
                self.flush().await;
            }
        }
    }

    /// Finalize the active view and emit `time_on_page` if it qualifies.
    fn finish_view(&self, now: i64) {
        let measured = {
            let mut state = self.lock();
            if !state.hooks.is_bound() {
                return;
            }
            let measured = state.engagement.finalize();
            if let Some(m) = &measured {
                self.enqueue(&mut state, EventKind::TimeOnPage.as_str(), time_on_page_properties(m), now);
            }
            measured
        };
        if let Some(measured) = measured {
            self.forward_engagement(measured);
        }
    }

    pub fn hooks_bound(&self) -> bool {
        self.lock().hooks.is_bound()
    }

    /// How many times lifecycle hooks have been bound over the engine's life.
    pub fn hook_bind_count(&self) -> u32 {
        self.lock().hooks.bind_count()
    }

    // ── Batching & delivery ──────────────────────────────────────────────

    /// Detach the queue and deliver it. A failed batch goes back to the front
    /// of the queue for the next trigger.
    ///
    /// Flushes are serialized: a flush requested while a batch is in flight
    /// waits for it to settle, then takes whatever the queue holds at that point.
    pub async fn flush(&self) {
        let _delivery = self.inner.delivery.lock().await;
        let (batch, epoch) = {
            let mut state = self.lock();
            state.timer.cancel();
            state.flush_scheduled = false;
            if state.queue.is_empty() {
                return;
            }
            (state.queue.detach(), state.epoch)
        };

        let count = batch.len();
        match self.inner.sink.send_events(&batch).await {
            Ok(()) => {
                tracing::debug!(count, "analytics batch delivered");
                if self.inner.mirror_active {
                    // Under the state lock so a concurrent withdrawal cannot
                    // slip between the epoch check and the write.
                    let state = self.lock();
                    if state.epoch != epoch {
                        tracing::debug!(count, "consent withdrawn during delivery, batch not mirrored");
                        return;
                    }
                    if let Err(err) = self.inner.mirror.append(&batch) {
                        tracing::warn!(error = %err, "could not mirror analytics events");
                    }
                }
            }
            Err(err) => {
                let mut state = self.lock();
                if state.epoch != epoch {
                    tracing::debug!(count, "consent withdrawn during delivery, failed batch dropped");
                    return;
                }
                let dropped = state.queue.requeue(batch);
                tracing::warn!(
                    error = %err,
                    count,
                    dropped,
                    "failed to deliver analytics batch, requeued for retry"
                );
            }
        }
    }

    fn spawn_flush(&self, state: &mut EngineState) {
        match Handle::try_current() {
            Ok(handle) => {
                state.flush_scheduled = true;
                let engine = self.clone();
                handle.spawn(async move { engine.flush().await });
            }
            Err(_) => {
                tracing::warn!("no async runtime available, flush deferred to next trigger");
            }
        }
    }

    fn start_timer(&self, state: &mut EngineState) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no async runtime available, timed flush not scheduled");
                return;
            }
        };

        let id = state.timer.next_id();
        let delay = self.inner.batch_timeout;
        let weak = Arc::downgrade(&self.inner);
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Analytics { inner }.flush_on_timer(id).await;
            }
        });
        state.timer.arm(id, task.abort_handle());
    }

    async fn flush_on_timer(&self, id: u64) {
        let current = self.lock().timer.release(id);
        if current {
            self.flush().await;
        }
    }

    // ── Inspection ───────────────────────────────────────────────────────

    pub fn session_id(&self) -> &str {
        self.inner.collector.session_id()
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.lock().timer.is_pending()
    }

    /// Summary of the mirrored events, or `None` if the mirror cannot be read.
    pub fn analytics_summary(&self) -> Option<AnalyticsSummary> {
        match self.inner.mirror.summary() {
            Ok(summary) => Some(summary),
            Err(err) => {
                tracing::warn!(error = %err, "could not build analytics summary");
                None
            }
        }
    }
}

fn props<const N: usize>(entries: [(&str, Value); N]) -> Properties {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn time_on_page_properties(measured: &TimeOnPage) -> Properties {
    props([
        ("postSlug", json!(measured.item_id)),
        ("timeSpent", json!(measured.seconds())),
        ("engagementLevel", json!(measured.level.as_str())),
    ])
}
