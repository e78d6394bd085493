//! `EventBus` and marker intake.
//!
//! A bounded, non-blocking queue of [`Event`] records drained into the next
//! outgoing `DataPoint`. A single mutex-guarded `Vec` rather than a channel,
//! since the bus's only readers are the Runner's own sampling ticks, not
//! independent subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{LoadBenchError, Result};
use crate::model::{Event, EventType};

/// Capacity is nominal here — unlike a channel, the backing `Vec` never
/// blocks a producer. Overflow past capacity is dropped silently, the same
/// way a full channel would drop the newest send (both are telemetry, not
/// commitments).
const CAPACITY: usize = 100;

pub struct EventBus {
    pending: Mutex<Vec<Event>>,
    active: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::with_capacity(CAPACITY)),
            active: AtomicBool::new(false),
        }
    }

    /// Internal producers (phase entry, iface start/stop, ramp step) call
    /// this. Non-blocking: once at capacity, further events are dropped
    /// silently.
    pub fn enqueue(&self, event: Event) {
        let mut pending = self.pending.lock().expect("event bus mutex poisoned");
        if pending.len() < CAPACITY {
            pending.push(event);
        }
    }

    /// Atomically swap out the pending slice for a fresh empty one; the
    /// caller attaches the returned slice to the outgoing `DataPoint`.
    pub fn drain(&self) -> Vec<Event> {
        let mut pending = self.pending.lock().expect("event bus mutex poisoned");
        std::mem::take(&mut *pending)
    }

    /// Marker intake: accepts `{message}` from an external actor. Succeeds
    /// only while a test is active; the message must be non-empty.
    pub fn add_marker(&self, message: &str) -> Result<()> {
        if !self.active.load(Ordering::Acquire) {
            return Err(LoadBenchError::NotActive);
        }
        if message.trim().is_empty() {
            return Err(LoadBenchError::MarkerRejected(
                "message must be non-empty".into(),
            ));
        }
        self.enqueue(Event::new(EventType::Custom, message));
        Ok(())
    }

    /// The Runner flips this at test start/end; marker intake consults it.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_enqueued_events_in_order() {
        let bus = EventBus::new();
        bus.enqueue(Event::new(EventType::Phase, "a"));
        bus.enqueue(Event::new(EventType::Phase, "b"));
        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].message, "a");
        assert_eq!(drained[1].message, "b");
    }

    #[test]
    fn drain_is_empty_after_previous_drain() {
        let bus = EventBus::new();
        bus.enqueue(Event::new(EventType::Phase, "a"));
        let _ = bus.drain();
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn marker_rejected_when_inactive() {
        let bus = EventBus::new();
        bus.set_active(false);
        assert!(matches!(
            bus.add_marker("hello"),
            Err(LoadBenchError::NotActive)
        ));
    }

    #[test]
    fn marker_rejected_when_empty() {
        let bus = EventBus::new();
        bus.set_active(true);
        assert!(bus.add_marker("   ").is_err());
    }

    #[test]
    fn marker_accepted_when_active_and_nonempty() {
        let bus = EventBus::new();
        bus.set_active(true);
        assert!(bus.add_marker("lap 1").is_ok());
        assert_eq!(bus.drain().len(), 1);
    }

    #[test]
    fn overflow_beyond_capacity_is_dropped_silently() {
        let bus = EventBus::new();
        for i in 0..(CAPACITY + 10) {
            bus.enqueue(Event::new(EventType::Custom, format!("e{i}")));
        }
        assert_eq!(bus.drain().len(), CAPACITY);
    }
}
