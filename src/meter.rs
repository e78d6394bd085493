//! `InterfaceMeter`: a per-interface atomic byte/packet counter with a
//! one-second sliding-window Mbps publisher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

struct MeterState {
    last_bytes: u64,
    last_update: Instant,
    mbps: f64,
    active_target_mbps: f64,
}

pub struct InterfaceMeter {
    accum_bytes: AtomicU64,
    state: Mutex<MeterState>,
    pub workers: usize,
}

impl InterfaceMeter {
    pub fn new(workers: usize, initial_target_mbps: f64) -> Self {
        Self {
            accum_bytes: AtomicU64::new(0),
            state: Mutex::new(MeterState {
                last_bytes: 0,
                last_update: Instant::now(),
                mbps: 0.0,
                active_target_mbps: initial_target_mbps,
            }),
            workers,
        }
    }

    /// Atomic add to the byte counter, called from a worker's send loop.
    pub fn add_bytes(&self, n: u64) {
        self.accum_bytes.fetch_add(n, Ordering::Relaxed);
    }

    /// Recompute the published Mbps if at least one second has elapsed since
    /// the last refresh. Safe to call more often than 1 Hz; it is a no-op
    /// between windows.
    pub fn refresh(&self) {
        let now = Instant::now();
        let current_bytes = self.accum_bytes.load(Ordering::Relaxed);

        let mut st = self.state.lock().expect("meter mutex poisoned");
        let elapsed = now.duration_since(st.last_update);
        if elapsed < MIN_REFRESH_INTERVAL {
            return;
        }

        let delta_bytes = current_bytes.saturating_sub(st.last_bytes);
        let mbps = (delta_bytes as f64 * 8.0) / elapsed.as_secs_f64() / 1_000_000.0;

        st.mbps = mbps;
        st.last_bytes = current_bytes;
        st.last_update = now;
    }

    /// The rate over the most recently completed >=1s window. Neither
    /// instantaneous nor cumulative.
    pub fn read_mbps(&self) -> f64 {
        self.state.lock().expect("meter mutex poisoned").mbps
    }

    pub fn read_target(&self) -> f64 {
        self.state
            .lock()
            .expect("meter mutex poisoned")
            .active_target_mbps
    }

    /// Visible to the next packet's rate computation.
    pub fn set_target(&self, mbps: f64) {
        self.state.lock().expect("meter mutex poisoned").active_target_mbps = mbps;
    }

    pub fn total_bytes(&self) -> u64 {
        self.accum_bytes.load(Ordering::Relaxed)
    }
}
