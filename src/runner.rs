//! `Runner`: the three-phase (Pre → Load → Post) test execution state
//! machine.
//!
//! A single shared `Arc<AtomicBool>` cancellation flag, checked at each
//! loop's natural boundary (here: each sampling tick), stands in for a
//! per-test cancellation context — this crate's concurrency idiom is shared
//! atomics and locks, not a context-propagation library.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::config::TestConfig;
use crate::error::{LoadBenchError, Result};
use crate::events::EventBus;
use crate::load_generator::LoadGenerator;
use crate::model::{DataPoint, Event, EventType, Phase, TestResult};
use crate::power::PowerSource;
use crate::ramp::run_ramp;
use crate::store::RunStore;
use crate::telemetry::TelemetrySink;

/// Sleep after cancelling the Load sub-context to let in-flight writes
/// surface as bytes before the Post baseline begins.
const LOAD_DRAIN_DELAY: Duration = Duration::from_millis(500);

pub struct Runner {
    power_source: Arc<dyn PowerSource>,
    telemetry: Arc<dyn TelemetrySink>,
    store: Arc<dyn RunStore>,
    events: Arc<EventBus>,
    active: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    /// Serializes `start_test` so only one run's phase loop executes at a
    /// time; also the home for the in-progress `TestResult` a concurrent
    /// `stop_test` needs no access to (cancellation is signalled purely via
    /// `cancel`, never by touching this lock).
    run_lock: AsyncMutex<()>,
    /// Snapshot of the most recently finished run, for callers (the CLI's
    /// `run-mock` harness) that want the result without their own `RunStore`
    /// query path.
    last_result: std::sync::Mutex<Option<TestResult>>,
}

impl Runner {
    pub fn new(
        power_source: Arc<dyn PowerSource>,
        telemetry: Arc<dyn TelemetrySink>,
        store: Arc<dyn RunStore>,
    ) -> Self {
        Self {
            power_source,
            telemetry,
            store,
            events: Arc::new(EventBus::new()),
            active: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            run_lock: AsyncMutex::new(()),
            last_result: std::sync::Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn add_marker(&self, message: &str) -> Result<()> {
        self.events.add_marker(message)
    }

    /// The most recently finished (or cancelled) run, if any.
    pub fn last_result(&self) -> Option<TestResult> {
        self.last_result
            .lock()
            .expect("last_result mutex poisoned")
            .clone()
    }

    /// Rejects if a run is already active; otherwise runs the full
    /// Pre → Load → Post phase sequence to completion (or until cancelled)
    /// and persists the result.
    pub async fn start_test(&self, config: TestConfig) -> Result<()> {
        config.validate()?;
        self.power_source.probe().await?;

        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LoadBenchError::AlreadyActive);
        }

        let _guard = self.run_lock.lock().await;
        self.cancel.store(false, Ordering::Release);
        self.events.set_active(true);

        let result = self.run_phases(config).await;

        *self.last_result.lock().expect("last_result mutex poisoned") = Some(result.clone());

        self.events.set_active(false);
        self.active.store(false, Ordering::Release);
        self.telemetry.signal_done();

        if let Err(e) = self.store.save(&result).await {
            warn!("run store save failed (result remains in-memory only): {e}");
        }

        Ok(())
    }

    /// Idempotent: cancels the active run's context, if any.
    pub fn stop_test(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    async fn run_phases(&self, config: TestConfig) -> TestResult {
        let start_time = SystemTime::now();
        let mut data_points = Vec::new();

        self.collect_phase(
            config.pre_duration,
            Phase::Pre,
            &config,
            None,
            &mut data_points,
        )
        .await;

        let generator = if config.load_enabled && !self.cancel.load(Ordering::Acquire) {
            if let Some(lc) = &config.load_config {
                Some(self.start_load(lc).await)
            } else {
                None
            }
        } else {
            None
        };

        self.collect_phase(
            config.duration,
            Phase::Load,
            &config,
            generator.as_ref(),
            &mut data_points,
        )
        .await;

        if let Some(gen) = generator {
            gen.stop().await;
            tokio::time::sleep(LOAD_DRAIN_DELAY).await;
        }

        if !self.cancel.load(Ordering::Acquire) {
            self.collect_phase(
                config.post_duration,
                Phase::Post,
                &config,
                None,
                &mut data_points,
            )
            .await;
        }

        let end_time = SystemTime::now();
        info!(
            test_name = config.test_name,
            points = data_points.len(),
            "test run finished"
        );

        TestResult {
            config,
            data_points,
            start_time,
            end_time,
        }
    }

    async fn start_load(&self, lc: &crate::config::LoadConfig) -> Arc<LoadGenerator> {
        let generator = Arc::new(LoadGenerator::start(lc, self.events.clone()).await);

        for ic in lc.effective_interfaces() {
            if ic.ramping_enabled() {
                let generator = generator.clone();
                let events = self.events.clone();
                let cancel = self.cancel.clone();
                let running = Arc::new(AtomicBool::new(true));
                let cancel_watcher = running.clone();
                tokio::spawn(async move {
                    loop {
                        if cancel.load(Ordering::Acquire) {
                            cancel_watcher.store(false, Ordering::Release);
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                });
                tokio::spawn(run_ramp(ic, generator, events, running));
            }
        }

        generator
    }

    /// Sampling loop: one tick per `config.interval`, for `phase_duration`
    /// total. No-op when `phase_duration == 0`.
    async fn collect_phase(
        &self,
        phase_duration: Duration,
        phase: Phase,
        config: &TestConfig,
        generator: Option<&Arc<LoadGenerator>>,
        data_points: &mut Vec<DataPoint>,
    ) {
        if phase_duration.is_zero() {
            return;
        }

        self.events
            .enqueue(Event::new(EventType::Phase, format!("entering {phase}")));

        let deadline = tokio::time::Instant::now() + phase_duration;
        // `interval_at` rather than `interval`: the latter fires its first
        // tick immediately, but the first sample must land one `interval`
        // after phase entry, not at entry itself.
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + config.interval, config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if self.cancel.load(Ordering::Acquire) {
                return;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return;
            }

            ticker.tick().await;
            if self.cancel.load(Ordering::Acquire) {
                return;
            }

            match self.power_source.current_power_mw().await {
                Ok(power_mw) => {
                    if let Some(gen) = generator {
                        gen.refresh_meters();
                    }
                    let (throughput_by_interface, target_by_interface) = match generator {
                        Some(gen) if matches!(phase, Phase::Load) => {
                            (gen.throughput_by_interface(), gen.target_by_interface())
                        }
                        _ => (Default::default(), Default::default()),
                    };
                    let throughput_total_mbps = throughput_by_interface.values().sum();

                    let events = self.events.drain();
                    data_points.push(DataPoint {
                        timestamp: SystemTime::now(),
                        power_mw,
                        throughput_total_mbps,
                        throughput_by_interface,
                        target_by_interface,
                        phase,
                        events: events.clone(),
                    });
                    self.telemetry.emit(data_points.last().unwrap().clone());
                }
                Err(e) => {
                    warn!("power source read failed, skipping tick: {e}");
                }
            }
        }
    }
}
