//! `PowerSource`: the external power-meter capability the Runner samples
//! once per tick.
//!
//! An async trait at the system boundary: a `probe()` liveness check run
//! before a test starts, plus a read call that can fail on every tick
//! without that failure propagating into the sampling loop — a failed read
//! just skips that tick's data point.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait PowerSource: Send + Sync {
    /// Verify the meter is reachable before a test starts.
    async fn probe(&self) -> Result<()>;

    /// Instantaneous power draw in milliwatts.
    async fn current_power_mw(&self) -> Result<f64>;
}

/// A deterministic stand-in power source for tests and the `run-mock` CLI
/// smoke harness: `probe()` never fails, and readings oscillate around a
/// configurable baseline so the resulting data is visually distinguishable
/// from a flat line without depending on real hardware.
pub struct MockPowerSource {
    baseline_mw: f64,
}

impl MockPowerSource {
    pub fn new(baseline_mw: f64) -> Self {
        Self { baseline_mw }
    }
}

impl Default for MockPowerSource {
    fn default() -> Self {
        Self::new(2500.0)
    }
}

#[async_trait]
impl PowerSource for MockPowerSource {
    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn current_power_mw(&self) -> Result<f64> {
        let wobble = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_millis() as f64
            / 1000.0)
            * 50.0;
        Ok(self.baseline_mw + wobble)
    }
}
