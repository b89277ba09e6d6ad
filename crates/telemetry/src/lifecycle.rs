//! Page lifecycle signals and the hook registry that gates them.

use crate::page::ScrollMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Passive user-activity signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Click,
    Scroll,
    KeyPress,
    PointerMove,
}

/// Signals the host page pushes into the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LifecycleSignal {
    Visibility(Visibility),
    /// A scroll happened; depth is computed on the next animation frame.
    Scroll(ScrollMetrics),
    /// The host's render tick.
    AnimationFrame,
    Activity(ActivityKind),
    /// The page is about to unload.
    BeforeUnload,
}

/// Tracks whether lifecycle hooks are bound, and the scroll sample waiting for a frame.
#[derive(Debug, Default)]
pub struct LifecycleHooks {
    bound: bool,
    bindings: u32,
    pending_scroll: Option<ScrollMetrics>,
}

impl LifecycleHooks {
    /// Bind hooks. Returns false when they were already bound.
    pub fn bind(&mut self) -> bool {
        if self.bound {
            return false;
        }
        self.bound = true;
        self.bindings += 1;
        true
    }

    /// Unbind hooks and drop any pending scroll sample.
    pub fn unbind(&mut self) -> bool {
        self.pending_scroll = None;
        std::mem::replace(&mut self.bound, false)
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// How many times hooks went from unbound to bound.
    pub fn bind_count(&self) -> u32 {
        self.bindings
    }

    /// Remember the latest scroll sample until the next frame.
    pub fn record_scroll(&mut self, metrics: ScrollMetrics) {
        self.pending_scroll = Some(metrics);
    }

    /// Take the scroll sample for this frame, if any.
    pub fn take_frame(&mut self) -> Option<ScrollMetrics> {
        self.pending_scroll.take()
    }
}
