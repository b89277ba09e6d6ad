//! In-memory event queue and the single pending flush timer.
//!
//! Everything here is synchronous bookkeeping. The engine owns the async side:
//! spawning the timer task and awaiting the sink.

use std::collections::VecDeque;

use tokio::task::AbortHandle;

use tally_core::models::event::Event;

/// What the engine should do after an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// The size threshold was reached.
    FlushNow,
    /// No timer is pending; start one.
    StartTimer,
    /// A timer or flush is already on its way.
    Wait,
}

/// FIFO buffer of undelivered events.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<Event>,
    batch_size: usize,
    max_len: usize,
}

impl EventQueue {
    pub fn new(batch_size: usize, max_len: usize) -> Self {
        Self {
            events: VecDeque::new(),
            batch_size: batch_size.max(1),
            max_len: max_len.max(batch_size.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append an event. Returns how many of the oldest events were dropped to
    /// stay within the queue bound.
    pub fn push(&mut self, event: Event) -> usize {
        self.events.push_back(event);
        self.enforce_bound()
    }

    pub fn is_full_batch(&self) -> bool {
        self.events.len() >= self.batch_size
    }

    /// Take the whole queue as the in-flight batch, leaving it empty.
    pub fn detach(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Put a failed batch back in front of anything enqueued since it was detached.
    ///
    /// Returns the number of oldest events dropped to stay within the queue bound.
    pub fn requeue(&mut self, batch: Vec<Event>) -> usize {
        let newer = std::mem::take(&mut self.events);
        self.events = batch.into_iter().chain(newer).collect();
        self.enforce_bound()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    fn enforce_bound(&mut self) -> usize {
        let overflow = self.events.len().saturating_sub(self.max_len);
        self.events.drain(..overflow);
        overflow
    }
}

/// The one deferred flush allowed at a time.
///
/// Each scheduled timer gets a fresh id, so a timer that fires can tell whether
/// it is still the current one.
#[derive(Debug, Default)]
pub struct FlushTimer {
    pending: Option<(u64, AbortHandle)>,
    next_id: u64,
}

impl FlushTimer {
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Reserve an id for a timer about to be spawned.
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Register the spawned timer task, cancelling any previous one.
    pub fn arm(&mut self, id: u64, handle: AbortHandle) {
        if let Some((_, old)) = self.pending.replace((id, handle)) {
            old.abort();
        }
    }

    /// Cancel the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some((_, handle)) = self.pending.take() {
            handle.abort();
        }
    }

    /// Called from the timer task itself when it fires. Clears the slot without
    /// aborting the caller. Returns false if the timer was superseded.
    pub fn release(&mut self, id: u64) -> bool {
        match self.pending {
            Some((current, _)) if current == id => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

/// Decide the flush action for the queue state right after an enqueue.
pub fn decide(queue: &EventQueue, timer: &FlushTimer, flush_scheduled: bool) -> FlushDecision {
    if flush_scheduled {
        FlushDecision::Wait
    } else if queue.is_full_batch() {
        FlushDecision::FlushNow
    } else if timer.is_pending() {
        FlushDecision::Wait
    } else {
        FlushDecision::StartTimer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::models::event::{EventContext, Properties, Viewport};

    fn event(n: i64) -> Event {
        Event {
            name: format!("e{n}"),
            properties: Properties::new(),
            timestamp: n,
            session_id: "sess".into(),
            context: EventContext {
                url: "/".into(),
                referrer: "direct".into(),
                user_agent: String::new(),
                viewport: Viewport::default(),
            },
        }
    }

    fn names(queue: &EventQueue) -> Vec<String> {
        queue.iter().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn push_preserves_order() {
        let mut queue = EventQueue::new(10, 100);
        for n in 0..3 {
            queue.push(event(n));
        }
        assert_eq!(names(&queue), vec!["e0", "e1", "e2"]);
    }

    #[test]
    fn detach_empties_queue() {
        let mut queue = EventQueue::new(10, 100);
        queue.push(event(1));
        queue.push(event(2));
        let batch = queue.detach();
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn requeue_puts_failed_batch_first() {
        let mut queue = EventQueue::new(10, 100);
        queue.push(event(1));
        queue.push(event(2));
        let batch = queue.detach();

        // Enqueued while the batch was in flight.
        queue.push(event(3));

        let dropped = queue.requeue(batch);
        assert_eq!(dropped, 0);
        assert_eq!(names(&queue), vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn requeue_beyond_bound_drops_oldest() {
        let mut queue = EventQueue::new(2, 4);
        for n in 0..3 {
            queue.push(event(n));
        }
        let batch = queue.detach();
        for n in 3..6 {
            queue.push(event(n));
        }
        let dropped = queue.requeue(batch);
        assert_eq!(dropped, 2);
        assert_eq!(names(&queue), vec!["e2", "e3", "e4", "e5"]);
    }

    #[test]
    fn push_beyond_bound_drops_oldest() {
        let mut queue = EventQueue::new(1, 2);
        assert_eq!(queue.push(event(0)), 0);
        assert_eq!(queue.push(event(1)), 0);
        assert_eq!(queue.push(event(2)), 1);
        assert_eq!(names(&queue), vec!["e1", "e2"]);
    }

    #[test]
    fn full_batch_threshold() {
        let mut queue = EventQueue::new(3, 10);
        queue.push(event(0));
        queue.push(event(1));
        assert!(!queue.is_full_batch());
        queue.push(event(2));
        assert!(queue.is_full_batch());
    }

    #[test]
    fn decide_follows_policy() {
        let mut queue = EventQueue::new(2, 10);
        let timer = FlushTimer::default();

        queue.push(event(0));
        assert_eq!(decide(&queue, &timer, false), FlushDecision::StartTimer);
        queue.push(event(1));
        assert_eq!(decide(&queue, &timer, false), FlushDecision::FlushNow);
        assert_eq!(decide(&queue, &timer, true), FlushDecision::Wait);
    }

    #[tokio::test]
    async fn decide_waits_while_timer_pending() {
        let mut queue = EventQueue::new(5, 10);
        let mut timer = FlushTimer::default();
        let task = tokio::spawn(std::future::pending::<()>());
        let id = timer.next_id();
        timer.arm(id, task.abort_handle());

        queue.push(event(0));
        assert_eq!(decide(&queue, &timer, false), FlushDecision::Wait);

        timer.cancel();
        assert!(!timer.is_pending());
        assert!(task.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn release_only_matches_current_timer() {
        let mut timer = FlushTimer::default();
        let first = tokio::spawn(std::future::pending::<()>());
        let first_id = timer.next_id();
        timer.arm(first_id, first.abort_handle());

        let second = tokio::spawn(std::future::pending::<()>());
        let second_id = timer.next_id();
        timer.arm(second_id, second.abort_handle());

        // Arming the second timer cancelled the first.
        assert!(first.await.unwrap_err().is_cancelled());
        assert!(!timer.release(first_id));
        assert!(timer.is_pending());
        assert!(timer.release(second_id));
        assert!(!timer.is_pending());
        second.abort();
    }
}
