//! Host page port: the ambient state the enricher reads for every event.

use std::sync::RwLock;

use tally_core::models::event::Viewport;

/// Read-only view of the page hosting the engine.
pub trait PageContext: Send + Sync {
    /// Current path, e.g. `/blog/react-hooks`.
    fn path(&self) -> String;
    fn referrer(&self) -> Option<String>;
    fn user_agent(&self) -> Option<String>;
    fn viewport(&self) -> Viewport;
}

/// Scroll position sampled by the host on a scroll signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    /// Scroll depth as a whole percentage of the scrollable height.
    ///
    /// `None` when the page cannot scroll or the position is out of range.
    pub fn depth_percent(&self) -> Option<u8> {
        let scrollable = self.scroll_height - self.viewport_height;
        if scrollable.is_nan() || scrollable <= 0.0 {
            return None;
        }
        let percent = (self.scroll_top / scrollable * 100.0).round();
        if (0.0..=100.0).contains(&percent) {
            Some(percent as u8)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PageState {
    path: String,
    referrer: Option<String>,
    user_agent: Option<String>,
    viewport: Viewport,
}

/// A page whose state the host sets explicitly (server-side renderers, tests, native shells).
#[derive(Debug, Default)]
pub struct StaticPage {
    state: RwLock<PageState>,
}

impl StaticPage {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(PageState {
                path: path.into(),
                ..PageState::default()
            }),
        }
    }

    pub fn with_referrer(self, referrer: impl Into<String>) -> Self {
        self.update(|s| s.referrer = Some(referrer.into()));
        self
    }

    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.update(|s| s.user_agent = Some(user_agent.into()));
        self
    }

    pub fn with_viewport(self, width: u32, height: u32) -> Self {
        self.update(|s| s.viewport = Viewport { width, height });
        self
    }

    /// Record a client-side navigation.
    pub fn navigate(&self, path: impl Into<String>) {
        let path = path.into();
        self.update(|s| s.path = path);
    }

    pub fn resize(&self, width: u32, height: u32) {
        self.update(|s| s.viewport = Viewport { width, height });
    }

    fn update(&self, f: impl FnOnce(&mut PageState)) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
    }

    fn read(&self) -> PageState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl PageContext for StaticPage {
    fn path(&self) -> String {
        self.read().path
    }

    fn referrer(&self) -> Option<String> {
        self.read().referrer
    }

    fn user_agent(&self) -> Option<String> {
        self.read().user_agent
    }

    fn viewport(&self) -> Viewport {
        self.read().viewport
    }
}
