//! Tally Telemetry — consent-gated client analytics.
//!
//! Events are only collected after the user opts in. Free text is scrubbed of
//! emails and long digit runs, user agents are reduced to browser and OS
//! families, and events leave the client in batches.

pub mod batcher;
pub mod clock;
pub mod collector;
pub mod consent;
pub mod engagement;
pub mod engine;
pub mod forwarder;
pub mod lifecycle;
pub mod mirror;
pub mod page;
pub mod reporter;
pub mod session;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Analytics, Ports};
pub use forwarder::{ForwardedEvent, Forwarder, NoopForwarder};
pub use lifecycle::{ActivityKind, LifecycleSignal, Visibility};
pub use mirror::AnalyticsSummary;
pub use page::{PageContext, ScrollMetrics, StaticPage};
pub use reporter::{CollectorClient, EventSink, LocalSink};
pub use storage::{FileStorage, MemoryStorage, Storage};
