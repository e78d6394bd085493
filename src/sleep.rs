//! High-resolution sleep primitive.
//!
//! A coarse `tokio::time::sleep` covers all but the last ~1.5 ms, followed by
//! a spin-wait tail on a monotonic clock. The spin tail bounds jitter at the
//! cost of a few microseconds of CPU per call — generic OS sleep primitives
//! have ~1 ms (or worse) resolution, which at high packet rates smears the
//! target pacing.

use std::time::{Duration, Instant};

/// Spin tolerance: once within this much of the target, stop yielding to the
/// scheduler and just poll the clock.
const SPIN_TOLERANCE: Duration = Duration::from_micros(1_500);

/// Sleep for at least `d`, returning as close to `d` after entry as the host
/// clock allows. Returns immediately for `d == 0`.
pub async fn precise_sleep(d: Duration) {
    if d.is_zero() {
        return;
    }
    let target = Instant::now() + d;

    if d > SPIN_TOLERANCE {
        tokio::time::sleep(d - SPIN_TOLERANCE).await;
    }

    spin_until(target);
}

/// Blocking spin-wait variant for use from a non-async worker loop context
/// where yielding to the tokio scheduler via `.await` is undesirable inside a
/// tight send burst.
pub fn precise_sleep_blocking(d: Duration) {
    if d.is_zero() {
        return;
    }
    let target = Instant::now() + d;
    if d > SPIN_TOLERANCE {
        std::thread::sleep(d - SPIN_TOLERANCE);
    }
    spin_until(target);
}

fn spin_until(target: Instant) {
    while Instant::now() < target {
        std::hint::spin_loop();
    }
}
