//! Relay configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::source::DEFAULT_BAUD_RATE;

/// Which sample source feeds the relay, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Read from the physical serial link
    Live,
    /// Generate samples from the decay simulation
    Simulated,
}

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Sample source selection
    pub mode: SourceMode,
    /// Serial device path (Live mode)
    pub port_name: String,
    /// Serial baud rate (Live mode)
    pub baud_rate: u32,
    /// Directory session logs are written to
    pub log_dir: PathBuf,
    /// Simulated sample emission interval
    pub sample_interval: Duration,
    /// Serial availability polling interval
    pub poll_interval: Duration,
    /// Delay between serial reconnect attempts
    pub reconnect_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Live,
            port_name: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            log_dir: PathBuf::from("."),
            sample_interval: Duration::from_millis(200),
            poll_interval: Duration::from_millis(100),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl RelayConfig {
    /// Configuration for a simulated run
    pub fn simulated() -> Self {
        Self {
            mode: SourceMode::Simulated,
            ..Self::default()
        }
    }
}
