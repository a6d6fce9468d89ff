//! Node engines - the relay Listen/Transmit machine and the supervising
//! monitor.
//!
//! Each engine owns its transport and all of its state; nodes share nothing
//! and coordinate only through frames on the wire.

mod monitor;
mod relay;

use std::time::Duration;

use crate::error::{RingError, Result};
use crate::protocol::MONITOR_ADDRESS;

pub use monitor::{Membership, MonitorEvent, MonitorNode, MonitorStats};
pub use relay::{ListenExit, RelayNode, RelayStats, TransmitExit};

/// Default Token-Holding-Time budget in payload bytes.
pub const DEFAULT_THT: usize = 150;

/// Default read timeout before a node reports "no frame arrived".
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30);

/// The relay that seeds the first token once its predecessor is connected.
pub const SEED_ADDRESS: u8 = 1;

/// Per-node settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    /// Ring address (0 = monitor).
    pub address: u8,
    /// Payload bytes a relay may send per token visit.
    pub tht: usize,
    /// How long `read_frame` waits before timing out.
    pub timeout: Duration,
}

impl NodeConfig {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            tht: DEFAULT_THT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Monitor settings.
    pub fn monitor() -> Self {
        Self::new(MONITOR_ADDRESS)
    }

    pub fn with_tht(mut self, tht: usize) -> Self {
        self.tht = tht;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the settings make sense for a relay.
    pub fn validate_relay(&self) -> Result<()> {
        if self.address == MONITOR_ADDRESS {
            return Err(RingError::Config(
                "relay address 0 is reserved for the monitor".to_string(),
            ));
        }
        if self.tht == 0 {
            return Err(RingError::Config("THT must be positive".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(RingError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_config_defaults() {
        let config = NodeConfig::new(3);
        assert_eq!(config.tht, 150);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.validate_relay().is_ok());
        assert_eq!(NodeConfig::monitor().address, 0);
    }

    #[test]
    fn test_relay_validation() {
        assert!(NodeConfig::monitor().validate_relay().is_err());
        assert!(NodeConfig::new(1).with_tht(0).validate_relay().is_err());
        assert!(NodeConfig::new(1)
            .with_timeout(Duration::ZERO)
            .validate_relay()
            .is_err());
    }
}
