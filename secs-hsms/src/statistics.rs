//! HSMS session statistics

/// Counters for one HSMS connection, accumulated across reconnects.
///
/// Updated by the session driver; query them through
/// `HsmsConnection::statistics` for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatistics {
    /// Total number of frames written
    pub frames_sent: u64,
    /// Total number of frames read
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Data messages dispatched to handlers
    pub primaries_received: u64,
    /// T3 expiries
    pub reply_timeouts: u64,
    /// T6/T7/T8 expiries
    pub control_timeouts: u64,
    /// Reject.req sent
    pub rejects_sent: u64,
    /// Stream 9 error messages sent
    pub s9_sent: u64,
    /// Linktest round trips completed
    pub linktests: u64,
    /// Sessions established after the first one
    pub reconnects: u64,
}

impl SessionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all counters to zero
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
    }

    pub fn increment_primaries_received(&mut self) {
        self.primaries_received += 1;
    }

    pub fn increment_reply_timeouts(&mut self) {
        self.reply_timeouts += 1;
    }

    pub fn increment_control_timeouts(&mut self) {
        self.control_timeouts += 1;
    }

    pub fn increment_rejects_sent(&mut self) {
        self.rejects_sent += 1;
    }

    pub fn increment_s9_sent(&mut self) {
        self.s9_sent += 1;
    }

    pub fn increment_linktests(&mut self) {
        self.linktests += 1;
    }

    pub fn increment_reconnects(&mut self) {
        self.reconnects += 1;
    }

    /// Percentage of received frames answered with a reject or S9
    pub fn error_rate(&self) -> f64 {
        if self.frames_received == 0 {
            0.0
        } else {
            ((self.rejects_sent + self.s9_sent) as f64 / self.frames_received as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_clear() {
        let mut stats = SessionStatistics::new();
        stats.record_sent(14);
        stats.record_received(20);
        stats.record_received(20);
        stats.increment_s9_sent();
        assert_eq!(stats.bytes_sent, 14);
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.error_rate(), 50.0);

        stats.clear();
        assert_eq!(stats, SessionStatistics::default());
        assert_eq!(stats.error_rate(), 0.0);
    }
}
