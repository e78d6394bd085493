//! A pure function mapping (target Mbps, worker count, packet size) to a
//! per-packet pacing delay.

use std::time::Duration;

/// Below this raw per-packet delay, pacing is skipped entirely — the
/// scheduler/timer floor makes attempting it counterproductive.
const SKIP_THRESHOLD: Duration = Duration::from_micros(10);

/// Compensation factor applied to the raw delay to account for syscall
/// overhead, paired with [`crate::sleep::precise_sleep`].
const COMPENSATION_FACTOR: f64 = 0.95;

/// Compute the per-packet delay a single worker should sleep for, given the
/// interface's current active target throughput.
///
/// Returns `Duration::ZERO` for unlimited (no pacing).
pub fn compute_delay(target_mbps: f64, workers: usize, packet_bytes: usize) -> Duration {
    if target_mbps <= 0.0 || workers == 0 || packet_bytes == 0 {
        return Duration::ZERO;
    }

    let bytes_per_second_per_worker = target_mbps * 125_000.0 / workers as f64;
    let packets_per_second = bytes_per_second_per_worker / packet_bytes as f64;
    if packets_per_second <= 0.0 {
        return Duration::ZERO;
    }

    let raw_delay = Duration::from_secs_f64(1.0 / packets_per_second);
    if raw_delay < SKIP_THRESHOLD {
        return Duration::ZERO;
    }

    raw_delay.mul_f64(COMPENSATION_FACTOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_when_target_zero() {
        assert_eq!(compute_delay(0.0, 10, 1400), Duration::ZERO);
    }

    #[test]
    fn unlimited_when_negative_target() {
        assert_eq!(compute_delay(-5.0, 10, 1400), Duration::ZERO);
    }

    #[test]
    fn unlimited_when_zero_workers() {
        assert_eq!(compute_delay(100.0, 0, 1400), Duration::ZERO);
    }

    #[test]
    fn below_skip_threshold_is_unlimited() {
        // Huge target relative to worker count/packet size -> tiny raw delay.
        let d = compute_delay(100_000.0, 1, 1400);
        assert_eq!(d, Duration::ZERO);
    }

    #[test]
    fn typical_100mbps_10_workers_1400_bytes() {
        // bytes/s/worker = 100 * 125_000 / 10 = 1_250_000
        // pps = 1_250_000 / 1400 ≈ 892.857
        // raw delay ≈ 1.12 ms, * 0.95 ≈ 1.064 ms
        let d = compute_delay(100.0, 10, 1400);
        assert!(d > Duration::from_micros(900) && d < Duration::from_millis(2));
    }

    #[test]
    fn more_workers_yields_longer_per_worker_delay() {
        let d_few = compute_delay(100.0, 2, 1400);
        let d_many = compute_delay(100.0, 20, 1400);
        assert!(d_many > d_few);
    }

    #[test]
    fn larger_packets_yield_longer_delay() {
        let d_small = compute_delay(100.0, 10, 100);
        let d_large = compute_delay(100.0, 10, 1400);
        assert!(d_large > d_small);
    }

    proptest::proptest! {
        #[test]
        fn never_panics_and_never_negative(
            target in -10.0f64..200_000.0,
            workers in 0usize..64,
            bytes in 0usize..2000,
        ) {
            let d = compute_delay(target, workers, bytes);
            proptest::prop_assert!(d >= Duration::ZERO);
        }
    }
}
