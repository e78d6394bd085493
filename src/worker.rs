//! `Worker`: a single blocking send loop bound to one interface, one
//! transport, one target.
//!
//! Runs on `tokio::task::spawn_blocking` rather than as a plain async task:
//! opening the send handle (a socket bind/connect, or a `pnet` datalink
//! channel) and every subsequent write are blocking calls, and pairing them
//! with a blocking thread lets `PreciseSleep`'s spin tail run without
//! fighting the tokio scheduler for the thread.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use rand::RngCore;
use tracing::{debug, trace, warn};

use crate::config::Protocol;
use crate::meter::InterfaceMeter;
use crate::rate;
use crate::sleep::precise_sleep_blocking;
use crate::transport::SendHandle;
use crate::transport::l2_wire_bytes;

/// Parameters needed to open a worker's send handle, passed through from the
/// interface's `LoadConfig` without holding a reference into it (a worker
/// runs on its own blocking thread, detached from the async task tree).
#[derive(Clone)]
pub struct WorkerTarget {
    pub protocol: Protocol,
    pub interface_name: String,
    pub target_ip: String,
    pub target_port: u16,
    pub target_mac: String,
}

/// Consecutive transient I/O errors tolerated before a UDP/L2 worker gives
/// up and exits.
const MAX_CONSECUTIVE_ERRORS: u32 = 100;

/// Backoff applied after a transient send error, capped well below a burst
/// interval so a flaky link doesn't stall the whole interface.
const ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_millis(5);

fn burst_size(protocol: Protocol) -> usize {
    match protocol {
        Protocol::Tcp => 1,
        Protocol::Udp | Protocol::L2 => 64,
    }
}

/// One worker's send loop. Opens its own send handle (bind/connect or
/// datalink channel) as the first step so that a slow or hanging open (e.g.
/// a TCP connect against an unreachable target) only ever blocks this
/// worker's own blocking thread, never an async task. Runs until `running`
/// clears or it hits an unrecoverable error (handle open failure, TCP write
/// failure, or the consecutive-error cap).
pub fn run_worker(
    worker_id: usize,
    target: WorkerTarget,
    meter: Arc<InterfaceMeter>,
    packet_size: usize,
    running: Arc<AtomicBool>,
) {
    let mut handle = match SendHandle::open(
        target.protocol,
        &target.interface_name,
        &target.target_ip,
        target.target_port,
        &target.target_mac,
    ) {
        Ok(h) => h,
        Err(e) => {
            warn!(worker_id, "failed to open send handle: {e}");
            return;
        }
    };
    let protocol = target.protocol;
    let burst = burst_size(protocol);
    let mut payload = vec![0u8; packet_size.max(1)];
    rand::thread_rng().fill_bytes(&mut payload);
    let mut consecutive_errors: u32 = 0;

    while running.load(Ordering::Relaxed) {
        let delay = rate::compute_delay(meter.read_target(), meter.workers, packet_size);

        for _ in 0..burst {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            match send_one(&mut handle, &payload) {
                Ok(wire_bytes) => {
                    meter.add_bytes(wire_bytes as u64);
                    consecutive_errors = 0;
                }
                Err(e) => {
                    if matches!(protocol, Protocol::Tcp) {
                        debug!(worker_id, "tcp write failed, exiting worker: {e}");
                        return;
                    }
                    consecutive_errors += 1;
                    trace!(worker_id, "transient send error: {e}");
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        warn!(worker_id, "exiting after {consecutive_errors} consecutive errors");
                        return;
                    }
                    precise_sleep_blocking(ERROR_BACKOFF);
                }
            }
        }

        if !delay.is_zero() {
            precise_sleep_blocking(delay * burst as u32);
        }
    }
}

fn send_one(handle: &mut SendHandle, payload: &[u8]) -> std::io::Result<usize> {
    match handle {
        SendHandle::Udp { socket, target } => socket.send_to(payload, *target),
        SendHandle::Tcp { stream } => stream.write_all(payload).map(|_| payload.len()),
        SendHandle::L2 {
            tx,
            src_mac,
            dst_mac,
        } => {
            // Frame (header + payload) padded to the 60-byte minimum before FCS.
            let frame_len = (14 + payload.len()).max(60);
            let mut buf = vec![0u8; frame_len];
            {
                let mut eth = MutableEthernetPacket::new(&mut buf)
                    .expect("buffer sized for ethernet header");
                eth.set_destination(*dst_mac);
                eth.set_source(*src_mac);
                eth.set_ethertype(EtherTypes::Ipv4);
                let payload_region = eth.payload_mut();
                let n = payload.len().min(payload_region.len());
                payload_region[..n].copy_from_slice(&payload[..n]);
            }
            match tx.send_to(&buf, None) {
                Some(Ok(())) => Ok(l2_wire_bytes(frame_len)),
                Some(Err(e)) => Err(e),
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    "datalink sender backpressure",
                )),
            }
        }
    }
}
