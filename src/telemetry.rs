//! `TelemetrySink`: the boundary the Runner emits each tick's `DataPoint`
//! to, plus a terminal `signal_done`.
//!
//! Fans out snapshots over a `tokio::sync::broadcast` channel sized well
//! above its expected burst rate so a slow or absent subscriber never backs
//! up the producer. `emit` is best-effort: a full or subscriber-less channel
//! drops the send, and the authoritative copy of every `DataPoint` still
//! lives in the `Runner`'s own `TestResult`.

use tokio::sync::broadcast;

use crate::model::DataPoint;

/// Broadcast channel capacity: generous relative to the minimum 1 Hz
/// sampling interval so a momentarily-slow subscriber doesn't lose points.
const SINK_CHANNEL_CAP: usize = 256;

#[async_trait::async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Best-effort, non-blocking. Dropping a point here never loses data —
    /// the Runner's `TestResult` remains authoritative.
    fn emit(&self, point: DataPoint);

    /// Terminal signal, sent exactly once when a test finishes or is
    /// cancelled.
    fn signal_done(&self);
}

/// A broadcast-channel-backed sink. `subscribe()` lets a control-surface
/// handler (e.g. the SSE endpoint in `server.rs`) attach a live listener.
pub struct BroadcastTelemetrySink {
    points: broadcast::Sender<DataPoint>,
    done: broadcast::Sender<()>,
}

impl BroadcastTelemetrySink {
    pub fn new() -> Self {
        let (points, _) = broadcast::channel(SINK_CHANNEL_CAP);
        let (done, _) = broadcast::channel(1);
        Self { points, done }
    }

    pub fn subscribe_points(&self) -> broadcast::Receiver<DataPoint> {
        self.points.subscribe()
    }

    pub fn subscribe_done(&self) -> broadcast::Receiver<()> {
        self.done.subscribe()
    }
}

impl Default for BroadcastTelemetrySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for BroadcastTelemetrySink {
    fn emit(&self, point: DataPoint) {
        // `send` only errors when there are no subscribers; that is a
        // dropped send, not a failure the Runner needs to know about.
        let _ = self.points.send(point);
    }

    fn signal_done(&self) {
        let _ = self.done.send(());
    }
}
