//! `TestConfig`, `LoadConfig`, `InterfaceConfig`, and the validation rules a
//! `startTest` call enforces synchronously.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoadBenchError, Result};

/// The sentinel interface name used when an `InterfaceConfig::name` is empty
/// (OS-routed, no explicit bind).
pub const DEFAULT_INTERFACE_NAME: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
    L2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// OS interface identifier; empty ⇒ OS-routed, no bind.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub target_throughput_mbps: f64,
    #[serde(default)]
    pub ramp_steps: u32,
    #[serde(default)]
    pub ramp_duration: Duration,
    #[serde(default)]
    pub pre_delay: Duration,
}

fn default_workers() -> usize {
    10
}

impl InterfaceConfig {
    /// The key this interface is registered under in per-interface maps.
    pub fn key(&self) -> &str {
        if self.name.is_empty() {
            DEFAULT_INTERFACE_NAME
        } else {
            &self.name
        }
    }

    /// Effective ramp duration, applying the default of
    /// `max(30s, rampSteps * 5s)` when unset and ramping is enabled.
    pub fn effective_ramp_duration(&self) -> Duration {
        if self.ramp_duration.is_zero() && self.ramp_steps > 0 {
            Duration::from_secs(30).max(Duration::from_secs(5) * self.ramp_steps)
        } else {
            self.ramp_duration
        }
    }

    pub fn ramping_enabled(&self) -> bool {
        self.ramp_steps > 0 && self.target_throughput_mbps > 0.0
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(LoadBenchError::Config(format!(
                "interface {:?}: workers must be >= 1",
                self.name
            )));
        }
        if self.target_throughput_mbps < 0.0 {
            return Err(LoadBenchError::Config(format!(
                "interface {:?}: target_throughput_mbps must be >= 0",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            workers: default_workers(),
            target_throughput_mbps: 0.0,
            ramp_steps: 0,
            ramp_duration: Duration::ZERO,
            pre_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub protocol: Protocol,
    #[serde(default)]
    pub target_ip: String,
    #[serde(default)]
    pub target_port: u16,
    #[serde(default)]
    pub target_mac: String,
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
    #[serde(default)]
    pub interface_configs: Vec<InterfaceConfig>,
}

fn default_packet_size() -> usize {
    1400
}

impl LoadConfig {
    pub fn validate(&self) -> Result<()> {
        match self.protocol {
            Protocol::L2 => {
                if self.target_mac.trim().is_empty() {
                    return Err(LoadBenchError::Config(
                        "L2 protocol requires a non-empty target_mac".into(),
                    ));
                }
            }
            Protocol::Udp | Protocol::Tcp => {
                if self.target_ip.trim().is_empty() {
                    return Err(LoadBenchError::Config(
                        "udp/tcp protocol requires a non-empty target_ip".into(),
                    ));
                }
            }
        }
        if matches!(self.protocol, Protocol::Udp) && self.packet_size > 1472 {
            return Err(LoadBenchError::Config(format!(
                "udp packet_size {} exceeds 1472-byte fragmentation limit",
                self.packet_size
            )));
        }
        for ic in &self.interface_configs {
            ic.validate()?;
        }
        Ok(())
    }

    /// Interfaces to drive: the configured list, or a single synthetic
    /// OS-routed interface when the list is empty.
    pub fn effective_interfaces(&self) -> Vec<InterfaceConfig> {
        if self.interface_configs.is_empty() {
            vec![InterfaceConfig::default()]
        } else {
            self.interface_configs.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub duration: Duration,
    pub interval: Duration,
    #[serde(default)]
    pub pre_duration: Duration,
    #[serde(default)]
    pub post_duration: Duration,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub test_name: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub load_enabled: bool,
    #[serde(default)]
    pub load_config: Option<LoadConfig>,
}

impl TestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(LoadBenchError::Config("interval must be > 0".into()));
        }
        if self.load_enabled {
            match &self.load_config {
                Some(lc) => lc.validate()?,
                None => {
                    return Err(LoadBenchError::Config(
                        "load_enabled is true but load_config is absent".into(),
                    ))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> TestConfig {
        TestConfig {
            duration: Duration::from_secs(4),
            interval: Duration::from_secs(1),
            pre_duration: Duration::from_secs(2),
            post_duration: Duration::from_secs(2),
            description: String::new(),
            test_name: "smoke".into(),
            device_name: "dut".into(),
            load_enabled: false,
            load_config: None,
        }
    }

    #[test]
    fn zero_interval_rejected() {
        let mut c = base_config();
        c.interval = Duration::ZERO;
        assert!(c.validate().is_err());
    }

    #[test]
    fn load_enabled_without_config_rejected() {
        let mut c = base_config();
        c.load_enabled = true;
        assert!(c.validate().is_err());
    }

    #[test]
    fn l2_requires_mac() {
        let lc = LoadConfig {
            protocol: Protocol::L2,
            target_ip: String::new(),
            target_port: 0,
            target_mac: String::new(),
            packet_size: 128,
            interface_configs: vec![],
        };
        assert!(lc.validate().is_err());
    }

    #[test]
    fn udp_oversize_packet_rejected() {
        let lc = LoadConfig {
            protocol: Protocol::Udp,
            target_ip: "127.0.0.1".into(),
            target_port: 9,
            target_mac: String::new(),
            packet_size: 2000,
            interface_configs: vec![],
        };
        assert!(lc.validate().is_err());
    }

    #[test]
    fn empty_interfaces_yields_single_default() {
        let lc = LoadConfig {
            protocol: Protocol::Udp,
            target_ip: "127.0.0.1".into(),
            target_port: 9,
            target_mac: String::new(),
            packet_size: 1400,
            interface_configs: vec![],
        };
        let ifaces = lc.effective_interfaces();
        assert_eq!(ifaces.len(), 1);
        assert_eq!(ifaces[0].key(), DEFAULT_INTERFACE_NAME);
    }

    #[test]
    fn ramp_duration_defaults_to_max_30s_or_5s_per_step() {
        let ic = InterfaceConfig {
            ramp_steps: 10,
            ramp_duration: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(ic.effective_ramp_duration(), Duration::from_secs(50));

        let ic2 = InterfaceConfig {
            ramp_steps: 2,
            ramp_duration: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(ic2.effective_ramp_duration(), Duration::from_secs(30));
    }

    #[test]
    fn zero_workers_rejected() {
        let ic = InterfaceConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(ic.validate().is_err());
    }
}
