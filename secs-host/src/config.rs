//! Host configuration

use secs_hsms::HsmsConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// HSMS session settings; hosts usually dial the equipment
    pub hsms: HsmsConfig,
    /// Wait between S1F13 attempts
    pub establish_communications_delay: Duration,
    /// Event and alarm reports buffered for slow consumers
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            hsms: HsmsConfig::default(),
            establish_communications_delay: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

impl HostConfig {
    pub fn new(hsms: HsmsConfig) -> Self {
        Self {
            hsms,
            ..Self::default()
        }
    }

    pub fn with_establish_communications_delay(mut self, delay: Duration) -> Self {
        self.establish_communications_delay = delay;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secs_hsms::ConnectMode;

    #[test]
    fn test_new_keeps_session_settings() {
        let hsms = HsmsConfig::active("10.0.0.5:5000".parse().unwrap()).with_session_id(7);
        let config = HostConfig::new(hsms).with_event_capacity(8);
        assert_eq!(config.hsms.mode, ConnectMode::Active);
        assert_eq!(config.hsms.session_id, 7);
        assert_eq!(config.event_capacity, 8);
        assert_eq!(config.establish_communications_delay, Duration::from_secs(10));
    }
}
