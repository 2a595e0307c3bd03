//! Host builder
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use secs_host::HostBuilder;
//! use std::time::Duration;
//!
//! # async fn run() -> secs_core::SecsResult<()> {
//! let host = HostBuilder::new()
//!     .tcp("192.168.1.50:5000")
//!     .session_id(1)
//!     .t3(Duration::from_secs(30))
//!     .build()?;
//! host.start()?;
//! # Ok(())
//! # }
//! ```

use crate::config::HostConfig;
use crate::host::GemHost;
use secs_core::{SecsError, SecsResult};
use secs_hsms::{ConnectMode, HsmsConfig};
use secs_transport::Connector;
use std::net::SocketAddr;
use std::time::Duration;

/// Builder for [`GemHost`]
///
/// Collects the endpoint and session settings, then validates them
/// once in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct HostBuilder {
    endpoint: Endpoint,
    session_id: u16,
    t3: Option<Duration>,
    linktest_interval: Option<Option<Duration>>,
    auto_reconnect: Option<bool>,
    establish_communications_delay: Option<Duration>,
    event_capacity: Option<usize>,
}

#[derive(Debug, Clone)]
enum Endpoint {
    Dial(String),
    Listen(String),
    None,
}

impl HostBuilder {
    /// Builder with no endpoint and session id 0
    pub fn new() -> Self {
        Self {
            endpoint: Endpoint::None,
            session_id: 0,
            t3: None,
            linktest_interval: None,
            auto_reconnect: None,
            establish_communications_delay: None,
            event_capacity: None,
        }
    }

    /// Dial the equipment at `address` ("host:port")
    pub fn tcp(mut self, address: &str) -> Self {
        self.endpoint = Endpoint::Dial(address.to_string());
        self
    }

    /// Wait for the equipment to dial in on `address`
    pub fn listen(mut self, address: &str) -> Self {
        self.endpoint = Endpoint::Listen(address.to_string());
        self
    }

    pub fn session_id(mut self, session_id: u16) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn t3(mut self, timeout: Duration) -> Self {
        self.t3 = Some(timeout);
        self
    }

    pub fn linktest_interval(mut self, interval: Option<Duration>) -> Self {
        self.linktest_interval = Some(interval);
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = Some(enabled);
        self
    }

    pub fn establish_communications_delay(mut self, delay: Duration) -> Self {
        self.establish_communications_delay = Some(delay);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Resolve the settings into a validated [`HostConfig`]
    ///
    /// # Errors
    /// `InvalidData` when no endpoint is set, the address does not parse
    /// or a timer is zero.
    pub fn config(&self) -> SecsResult<HostConfig> {
        let (mode, address) = match &self.endpoint {
            Endpoint::Dial(address) => (ConnectMode::Active, address),
            Endpoint::Listen(address) => (ConnectMode::Passive, address),
            Endpoint::None => {
                return Err(SecsError::InvalidData("No host endpoint configured".to_string()));
            }
        };
        let address: SocketAddr = address
            .parse()
            .map_err(|e| SecsError::InvalidData(format!("Invalid address {}: {}", address, e)))?;

        let mut hsms = match mode {
            ConnectMode::Active => HsmsConfig::active(address),
            ConnectMode::Passive => HsmsConfig::passive(address),
        }
        .with_session_id(self.session_id);
        if let Some(t3) = self.t3 {
            hsms = hsms.with_t3(t3);
        }
        if let Some(interval) = self.linktest_interval {
            hsms = hsms.with_linktest_interval(interval);
        }
        if let Some(enabled) = self.auto_reconnect {
            hsms = hsms.with_auto_reconnect(enabled);
        }
        hsms.validate()?;

        let mut config = HostConfig::new(hsms);
        if let Some(delay) = self.establish_communications_delay {
            config = config.with_establish_communications_delay(delay);
        }
        if let Some(capacity) = self.event_capacity {
            config = config.with_event_capacity(capacity);
        }
        Ok(config)
    }

    /// Build a host on the TCP endpoint
    pub fn build(self) -> SecsResult<GemHost> {
        Ok(GemHost::new(self.config()?))
    }

    /// Build a host on a caller-supplied connector
    pub fn build_with_connector(self, connector: Box<dyn Connector>) -> SecsResult<GemHost> {
        Ok(GemHost::with_connector(self.config()?, connector))
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_dial_config() {
        let config = HostBuilder::new()
            .tcp("127.0.0.1:5000")
            .session_id(3)
            .t3(Duration::from_secs(5))
            .linktest_interval(None)
            .config()
            .unwrap();
        assert_eq!(config.hsms.mode, ConnectMode::Active);
        assert_eq!(config.hsms.session_id, 3);
        assert_eq!(config.hsms.t3, Duration::from_secs(5));
        assert_eq!(config.hsms.linktest_interval, None);
    }

    #[test]
    fn test_listen_config() {
        let config = assert_ok!(HostBuilder::new().listen("0.0.0.0:6000").config());
        assert_eq!(config.hsms.mode, ConnectMode::Passive);
        assert_eq!(config.hsms.address.port(), 6000);
    }

    #[test]
    fn test_rejects_missing_or_bad_endpoint() {
        assert!(matches!(HostBuilder::new().config(), Err(SecsError::InvalidData(_))));
        assert!(matches!(
            HostBuilder::new().tcp("not an address").config(),
            Err(SecsError::InvalidData(_))
        ));
        assert_err!(HostBuilder::new().tcp("127.0.0.1:5000").t3(Duration::ZERO).config());
    }
}
