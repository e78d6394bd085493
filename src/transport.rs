//! Per-protocol send handles: interface binding, socket buffer tuning, and
//! L2 Ethernet framing overhead accounting.
//!
//! Every open here is a blocking call (socket bind/connect, or a `pnet`
//! datalink channel), which is why [`crate::worker::run_worker`] opens its
//! handle on its own `tokio::task::spawn_blocking` thread rather than a
//! plain async task.

use std::net::{IpAddr, SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

use pnet::datalink::{self, Channel, DataLinkSender, MacAddr, NetworkInterface};
use socket2::{Domain, Socket, Type};

use crate::config::Protocol;
use crate::error::{LoadBenchError, Result};

/// Ethernet framing overhead a raw L2 send incurs on the wire, beyond the
/// frame bytes actually written to the datalink channel: 8-byte preamble +
/// SFD, 14-byte header already included in the frame we build, 4-byte FCS,
/// and a 12-byte inter-frame gap. We build the 14-byte header ourselves, so
/// only preamble+FCS+IFG (8 + 4 + 12 = 24 bytes) is extra over the frame we
/// hand to `pnet`.
pub const ETHERNET_WIRE_OVERHEAD_BYTES: usize = 8 + 4 + 12;

/// Minimum Ethernet payload (header + data) before FCS; frames shorter than
/// this are padded by the NIC/driver.
pub const ETHERNET_MIN_FRAME_BYTES: usize = 60;

/// Connect timeout applied when opening TCP handles from a worker; kept
/// short so a dead target fails the worker fast rather than hanging
/// indefinitely during a test's Load phase.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Total bytes a single L2 send consumes on the wire, including overhead not
/// present in the buffer we construct.
pub fn l2_wire_bytes(frame_len: usize) -> usize {
    frame_len.max(ETHERNET_MIN_FRAME_BYTES) + ETHERNET_WIRE_OVERHEAD_BYTES
}

/// Resolve the first non-loopback IPv4 address bound to a named interface.
/// Returns `Ok(None)` when the interface exists but carries no IPv4 address,
/// or when `name` is empty (OS-routed, no explicit bind).
pub fn interface_ipv4(name: &str) -> Result<Option<IpAddr>> {
    if name.is_empty() {
        return Ok(None);
    }
    let iface = find_interface(name)?;
    Ok(iface
        .ips
        .iter()
        .find(|ip| ip.is_ipv4() && !ip.ip().is_loopback())
        .map(|ip| ip.ip()))
}

fn find_interface(name: &str) -> Result<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .find(|i| i.name == name)
        .ok_or_else(|| LoadBenchError::Config(format!("no such interface: {name}")))
}

/// A bound, ready-to-send UDP socket with an enlarged send buffer.
pub fn open_udp(interface_name: &str) -> Result<UdpSocket> {
    let bind_addr = match interface_ipv4(interface_name)? {
        Some(ip) => SocketAddr::new(ip, 0),
        None => SocketAddr::new(IpAddr::from([0, 0, 0, 0]), 0),
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;
    socket.bind(&bind_addr.into())?;
    socket.set_send_buffer_size(4 * 1024 * 1024)?;
    socket.set_nonblocking(false)?;
    Ok(socket.into())
}

/// A connected TCP stream, bound through the named interface when it carries
/// an IPv4 address, with Nagle's algorithm disabled so pacing isn't smeared
/// across the kernel's send coalescing window.
pub fn open_tcp(interface_name: &str, target: SocketAddr) -> Result<TcpStream> {
    let domain = if target.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    if let Some(ip) = interface_ipv4(interface_name)? {
        socket.bind(&SocketAddr::new(ip, 0).into())?;
    }
    socket.set_send_buffer_size(4 * 1024 * 1024)?;
    socket.connect_timeout(&target.into(), TCP_CONNECT_TIMEOUT)?;
    socket.set_nodelay(true)?;
    Ok(socket.into())
}

/// A raw L2 datalink sender bound to `interface_name`, plus the interface's
/// own MAC (source) and the parsed destination MAC.
pub fn open_l2(
    interface_name: &str,
    target_mac: &str,
) -> Result<(Box<dyn DataLinkSender>, MacAddr, MacAddr)> {
    let iface = find_interface(interface_name)?;
    let src_mac = iface
        .mac
        .ok_or_else(|| LoadBenchError::Config(format!("interface {interface_name} has no MAC")))?;
    let dst_mac: MacAddr = target_mac
        .parse()
        .map_err(|_| LoadBenchError::Config(format!("invalid target_mac: {target_mac}")))?;

    let (tx, _rx) = match datalink::channel(&iface, Default::default()) {
        Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
        Ok(_) => {
            return Err(LoadBenchError::Config(format!(
                "unsupported datalink channel type on {interface_name}"
            )))
        }
        Err(e) => {
            return Err(LoadBenchError::Config(format!(
                "failed to open datalink channel on {interface_name}: {e}"
            )))
        }
    };

    Ok((tx, src_mac, dst_mac))
}

/// A fully-opened send handle for one worker, matched to the test's
/// configured protocol.
pub enum SendHandle {
    Udp {
        socket: UdpSocket,
        target: SocketAddr,
    },
    Tcp {
        stream: TcpStream,
    },
    L2 {
        tx: Box<dyn DataLinkSender>,
        src_mac: MacAddr,
        dst_mac: MacAddr,
    },
}

impl SendHandle {
    pub fn open(
        protocol: Protocol,
        interface_name: &str,
        target_ip: &str,
        target_port: u16,
        target_mac: &str,
    ) -> Result<Self> {
        match protocol {
            Protocol::Udp => {
                let socket = open_udp(interface_name)?;
                let target = format!("{target_ip}:{target_port}")
                    .parse()
                    .map_err(|_| LoadBenchError::Config(format!("invalid target_ip: {target_ip}")))?;
                Ok(SendHandle::Udp { socket, target })
            }
            Protocol::Tcp => {
                let target = format!("{target_ip}:{target_port}")
                    .parse()
                    .map_err(|_| LoadBenchError::Config(format!("invalid target_ip: {target_ip}")))?;
                let stream = open_tcp(interface_name, target)?;
                Ok(SendHandle::Tcp { stream })
            }
            Protocol::L2 => {
                let (tx, src_mac, dst_mac) = open_l2(interface_name, target_mac)?;
                Ok(SendHandle::L2 {
                    tx,
                    src_mac,
                    dst_mac,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_wire_bytes_pads_short_frames_to_minimum() {
        assert_eq!(l2_wire_bytes(10), ETHERNET_MIN_FRAME_BYTES + ETHERNET_WIRE_OVERHEAD_BYTES);
    }

    #[test]
    fn l2_wire_bytes_adds_overhead_for_full_frames() {
        assert_eq!(l2_wire_bytes(1400), 1400 + ETHERNET_WIRE_OVERHEAD_BYTES);
    }

    #[test]
    fn empty_interface_name_has_no_bind_address() {
        assert!(interface_ipv4("").unwrap().is_none());
    }

    #[test]
    fn unknown_interface_is_config_error() {
        let err = interface_ipv4("definitely-not-a-real-iface-xyz").unwrap_err();
        assert!(matches!(err, LoadBenchError::Config(_)));
    }
}
