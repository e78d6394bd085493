//! `LoadGenerator`: owns the set of `InterfaceMeter`s and all `Worker`s for
//! one load session. A shared `Arc<AtomicBool>` running flag is handed to
//! every worker and ramp controller; `stop()` clears it and joins every
//! worker-owning task. The per-interface meter map is the only mutable state
//! the ramp controller touches, and only through `set_interface_target`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::config::{InterfaceConfig, LoadConfig};
use crate::events::EventBus;
use crate::meter::InterfaceMeter;
use crate::model::{Event, EventType};
use crate::worker::{run_worker, WorkerTarget};

pub struct LoadGenerator {
    meters: HashMap<String, Arc<InterfaceMeter>>,
    running: Arc<AtomicBool>,
    worker_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl LoadGenerator {
    /// Register a meter per `InterfaceConfig` and spawn its workers, each
    /// racing pre-delay against cancellation.
    pub async fn start(load_config: &LoadConfig, events: Arc<EventBus>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let mut meters = HashMap::new();
        let mut worker_handles = Vec::new();

        for ic in load_config.effective_interfaces() {
            let key = ic.key().to_string();
            let initial_target = if ic.ramping_enabled() {
                0.0
            } else {
                ic.target_throughput_mbps
            };
            let meter = Arc::new(InterfaceMeter::new(ic.workers, initial_target));
            meters.insert(key.clone(), meter.clone());

            let lc = load_config.clone();
            let events = events.clone();
            let running = running.clone();
            let meter = meter.clone();

            worker_handles.push(tokio::spawn(async move {
                spawn_interface(ic, lc, meter, events, running).await;
            }));
        }

        Self {
            meters,
            running,
            worker_handles,
        }
    }

    pub fn total_mbps(&self) -> f64 {
        self.meters.values().map(|m| m.read_mbps()).sum()
    }

    pub fn throughput_by_interface(&self) -> HashMap<String, f64> {
        self.meters
            .iter()
            .map(|(k, m)| (k.clone(), m.read_mbps()))
            .collect()
    }

    pub fn target_by_interface(&self) -> HashMap<String, f64> {
        self.meters
            .iter()
            .map(|(k, m)| (k.clone(), m.read_target()))
            .collect()
    }

    /// The ramp controller's only mutating call.
    pub fn set_interface_target(&self, name: &str, mbps: f64) {
        if let Some(m) = self.meters.get(name) {
            m.set_target(mbps);
        }
    }

    pub fn refresh_meters(&self) {
        for m in self.meters.values() {
            m.refresh();
        }
    }

    /// Cancel and wait for every worker-owning task to return. Individual
    /// worker threads inside `spawn_blocking` observe `running` at their next
    /// burst boundary.
    pub async fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        for h in self.worker_handles {
            let _ = h.await;
        }
    }
}

async fn spawn_interface(
    ic: InterfaceConfig,
    lc: LoadConfig,
    meter: Arc<InterfaceMeter>,
    events: Arc<EventBus>,
    running: Arc<AtomicBool>,
) {
    if !ic.pre_delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(ic.pre_delay) => {}
            _ = wait_for_stop(&running) => return,
        }
    }
    if !running.load(Ordering::Relaxed) {
        return;
    }

    events.enqueue(Event::new(
        EventType::IfaceStart,
        format!("interface {} started", ic.key()),
    ));

    let target = WorkerTarget {
        protocol: lc.protocol,
        interface_name: ic.name.clone(),
        target_ip: lc.target_ip.clone(),
        target_port: lc.target_port,
        target_mac: lc.target_mac.clone(),
    };

    let mut handles = Vec::with_capacity(ic.workers);
    for worker_id in 0..ic.workers {
        let target = target.clone();
        let meter = meter.clone();
        let running = running.clone();
        let packet_size = lc.packet_size;
        // Opening the send handle (socket bind/connect, or a pnet datalink
        // channel) happens inside `run_worker`, on this blocking thread, so a
        // slow or hanging open never stalls an async task.
        handles.push(tokio::task::spawn_blocking(move || {
            run_worker(worker_id, target, meter, packet_size, running);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    events.enqueue(Event::new(
        EventType::IfaceStop,
        format!("interface {} stopped", ic.key()),
    ));
    info!(interface = ic.key(), "all workers exited");
}

async fn wait_for_stop(running: &Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
