//! Equipment configuration

use secs_hsms::HsmsConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Equipment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentConfig {
    /// HSMS session settings; equipment is usually passive
    pub hsms: HsmsConfig,
    /// Model name reported in S1F2/S1F13/S1F14
    pub mdln: String,
    /// Software revision reported in S1F2/S1F13/S1F14
    pub softrev: String,
    /// Wait between S1F13 attempts
    pub establish_communications_delay: Duration,
    /// Largest process program accepted by S7F1/S7F3
    pub max_program_size: usize,
    /// Pause before reporting the event of a successful remote command
    pub command_event_delay: Duration,
}

impl Default for EquipmentConfig {
    fn default() -> Self {
        Self {
            hsms: HsmsConfig::default(),
            mdln: "secs4rs".to_string(),
            softrev: "0.1.0".to_string(),
            establish_communications_delay: Duration::from_secs(10),
            max_program_size: 1024 * 1024,
            command_event_delay: Duration::from_millis(50),
        }
    }
}

impl EquipmentConfig {
    pub fn new(hsms: HsmsConfig) -> Self {
        Self {
            hsms,
            ..Self::default()
        }
    }

    pub fn with_identity(mut self, mdln: impl Into<String>, softrev: impl Into<String>) -> Self {
        self.mdln = mdln.into();
        self.softrev = softrev.into();
        self
    }

    pub fn with_establish_communications_delay(mut self, delay: Duration) -> Self {
        self.establish_communications_delay = delay;
        self
    }

    pub fn with_max_program_size(mut self, size: usize) -> Self {
        self.max_program_size = size;
        self
    }

    pub fn with_command_event_delay(mut self, delay: Duration) -> Self {
        self.command_event_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EquipmentConfig::default();
        assert_eq!(config.mdln, "secs4rs");
        assert_eq!(config.softrev, "0.1.0");
        assert_eq!(config.establish_communications_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_builders() {
        let config = EquipmentConfig::new(HsmsConfig::passive("127.0.0.1:5001".parse().unwrap()))
            .with_identity("ETCHER", "2.3")
            .with_max_program_size(16);
        assert_eq!(config.mdln, "ETCHER");
        assert_eq!(config.max_program_size, 16);
        assert_eq!(config.hsms.address.port(), 5001);
    }
}
