//! `RampController`: per-interface stepwise ramp of an interface's active
//! target throughput.
//!
//! Holds no state of its own beyond its schedule — it is a driver over
//! [`crate::load_generator::LoadGenerator::set_interface_target`]; the
//! generator's meter map remains the single source of truth for an
//! interface's published target.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::InterfaceConfig;
use crate::events::EventBus;
use crate::load_generator::LoadGenerator;
use crate::model::{Event, EventType};

/// Drive one interface's target through its configured ramp steps, honoring
/// the interface's pre-delay first. Returns once the ramp completes or
/// `running` clears.
pub async fn run_ramp(
    ic: InterfaceConfig,
    generator: Arc<LoadGenerator>,
    events: Arc<EventBus>,
    running: Arc<AtomicBool>,
) {
    if !ic.ramping_enabled() {
        return;
    }

    if !ic.pre_delay.is_zero() && !sleep_or_stop(ic.pre_delay, &running).await {
        return;
    }

    let steps = ic.ramp_steps;
    let target = ic.target_throughput_mbps;
    let duration = ic.effective_ramp_duration();
    let step_duration = duration / steps.max(1);
    let step_size = target / steps as f64;
    let name = ic.key().to_string();

    for k in 1..=steps {
        if !sleep_or_stop(step_duration, &running).await {
            return;
        }

        let new_target = step_size * k as f64;
        generator.set_interface_target(&name, new_target);

        let message = if k == steps {
            format!("interface {name} ramp complete at {new_target:.0} Mbps")
        } else {
            format!("interface {name} ramp step {k}/{steps} to {new_target:.0} Mbps")
        };
        events.enqueue(Event::new(EventType::Ramp, message));
    }
}

/// Sleeps for `d`, racing cancellation. Returns `false` if cancelled first.
async fn sleep_or_stop(d: Duration, running: &Arc<AtomicBool>) -> bool {
    let deadline = tokio::time::Instant::now() + d;
    loop {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return true;
        }
        tokio::time::sleep((deadline - now).min(Duration::from_millis(50))).await;
    }
}
