//! HSMS session configuration

use crate::framer::DEFAULT_MAX_MESSAGE_SIZE;
use secs_core::{SecsError, SecsResult};
use secs_transport::{Connector, TcpAcceptor, TcpConnector, TcpSettings};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Connection role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectMode {
    /// Dial the peer and send select.req
    Active,
    /// Listen and wait for select.req
    Passive,
}

/// HSMS session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HsmsConfig {
    pub mode: ConnectMode,
    /// Remote address (active) or bind address (passive)
    pub address: SocketAddr,
    /// Session id, also the device id checked on data messages
    pub session_id: u16,
    /// Reply timeout
    pub t3: Duration,
    /// Connect separation timeout
    pub t5: Duration,
    /// Control transaction timeout
    pub t6: Duration,
    /// Not-selected timeout
    pub t7: Duration,
    /// Network intercharacter timeout
    pub t8: Duration,
    /// Periodic linktest while selected; `None` disables it
    pub linktest_interval: Option<Duration>,
    pub auto_reconnect: bool,
    /// Double the T5 delay per consecutive failure
    pub reconnect_backoff: bool,
    pub reconnect_max_delay: Duration,
    /// Consecutive failures before giving up; `None` retries forever
    pub max_reconnect_attempts: Option<u32>,
    pub max_message_size: usize,
    /// Emit S9F9 when T3 expires
    pub send_s9f9_on_t3: bool,
}

impl Default for HsmsConfig {
    fn default() -> Self {
        Self {
            mode: ConnectMode::Passive,
            address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5000)),
            session_id: 0,
            t3: Duration::from_secs(45),
            t5: Duration::from_secs(10),
            t6: Duration::from_secs(5),
            t7: Duration::from_secs(10),
            t8: Duration::from_secs(45),
            linktest_interval: Some(Duration::from_secs(10)),
            auto_reconnect: true,
            reconnect_backoff: false,
            reconnect_max_delay: Duration::from_secs(120),
            max_reconnect_attempts: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            send_s9f9_on_t3: true,
        }
    }
}

impl HsmsConfig {
    /// Active role dialing `address`
    pub fn active(address: SocketAddr) -> Self {
        Self {
            mode: ConnectMode::Active,
            address,
            ..Self::default()
        }
    }

    /// Passive role listening on `address`
    pub fn passive(address: SocketAddr) -> Self {
        Self {
            mode: ConnectMode::Passive,
            address,
            ..Self::default()
        }
    }

    pub fn with_session_id(mut self, session_id: u16) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_t3(mut self, timeout: Duration) -> Self {
        self.t3 = timeout;
        self
    }

    pub fn with_t5(mut self, timeout: Duration) -> Self {
        self.t5 = timeout;
        self
    }

    pub fn with_t6(mut self, timeout: Duration) -> Self {
        self.t6 = timeout;
        self
    }

    pub fn with_t7(mut self, timeout: Duration) -> Self {
        self.t7 = timeout;
        self
    }

    pub fn with_t8(mut self, timeout: Duration) -> Self {
        self.t8 = timeout;
        self
    }

    pub fn with_linktest_interval(mut self, interval: Option<Duration>) -> Self {
        self.linktest_interval = interval;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_backoff(mut self, enabled: bool, max_delay: Duration) -> Self {
        self.reconnect_backoff = enabled;
        self.reconnect_max_delay = max_delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_s9f9_on_t3(mut self, enabled: bool) -> Self {
        self.send_s9f9_on_t3 = enabled;
        self
    }

    /// Check timer and size values
    pub fn validate(&self) -> SecsResult<()> {
        let timers = [
            ("T3", self.t3),
            ("T5", self.t5),
            ("T6", self.t6),
            ("T7", self.t7),
            ("T8", self.t8),
        ];
        for (name, value) in timers {
            if value.is_zero() {
                return Err(SecsError::InvalidData(format!("{} must be positive", name)));
            }
        }
        if self.linktest_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(SecsError::InvalidData(
                "Linktest interval must be positive".to_string(),
            ));
        }
        if self.max_message_size < crate::header::HEADER_LENGTH {
            return Err(SecsError::InvalidData(format!(
                "Max message size {} is below the header length",
                self.max_message_size
            )));
        }
        Ok(())
    }

    /// Delay before the next connection attempt after `failures` consecutive failures
    pub fn reconnect_delay(&self, failures: u32) -> Duration {
        if !self.reconnect_backoff || failures <= 1 {
            return self.t5;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.t5
            .checked_mul(factor)
            .unwrap_or(self.reconnect_max_delay)
            .min(self.reconnect_max_delay)
    }

    /// TCP connector matching the configured role
    pub fn connector(&self) -> Box<dyn Connector> {
        let settings = TcpSettings::new(self.address);
        match self.mode {
            ConnectMode::Active => Box::new(TcpConnector::new(settings)),
            ConnectMode::Passive => Box::new(TcpAcceptor::new(settings)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timers() {
        let config = HsmsConfig::default();
        assert_eq!(config.t3, Duration::from_secs(45));
        assert_eq!(config.t5, Duration::from_secs(10));
        assert_eq!(config.t6, Duration::from_secs(5));
        assert_eq!(config.t7, Duration::from_secs(10));
        assert_eq!(config.max_message_size, 16 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timer() {
        let config = HsmsConfig::default().with_t6(Duration::ZERO);
        assert!(config.validate().is_err());
        let config = HsmsConfig::default().with_linktest_interval(Some(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_delay_backoff() {
        let config = HsmsConfig::active("127.0.0.1:5000".parse().unwrap())
            .with_t5(Duration::from_secs(2));
        assert_eq!(config.reconnect_delay(3), Duration::from_secs(2));

        let config = config.with_reconnect_backoff(true, Duration::from_secs(10));
        assert_eq!(config.reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(config.reconnect_delay(2), Duration::from_secs(4));
        assert_eq!(config.reconnect_delay(3), Duration::from_secs(8));
        assert_eq!(config.reconnect_delay(4), Duration::from_secs(10));
        assert_eq!(config.reconnect_delay(40), Duration::from_secs(10));
    }
}
