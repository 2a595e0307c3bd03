//! Equipment clock (S2F17/S2F18, S2F31/S2F32)

use crate::ack::TiAck;
use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use std::fmt;
use std::sync::Arc;

/// Source of equipment time in place of the local clock
pub type TimeProvider = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Decides an S2F31 time-set request
pub type ClockSyncHandler = Arc<dyn Fn(NaiveDateTime) -> anyhow::Result<TiAck> + Send + Sync>;

/// Local clock shifted by the offset the host last set.
///
/// A [`TimeProvider`] replaces the local clock. A [`ClockSyncHandler`]
/// decides time-set requests; without one every valid time is accepted.
#[derive(Clone)]
pub struct GemClock {
    offset: TimeDelta,
    provider: Option<TimeProvider>,
    sync: Option<ClockSyncHandler>,
}

impl Default for GemClock {
    fn default() -> Self {
        Self {
            offset: TimeDelta::zero(),
            provider: None,
            sync: None,
        }
    }
}

impl fmt::Debug for GemClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GemClock")
            .field("offset", &self.offset)
            .field("provider", &self.provider.is_some())
            .field("sync", &self.sync.is_some())
            .finish()
    }
}

impl GemClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time_provider(&mut self, provider: TimeProvider) {
        self.provider = Some(provider);
    }

    pub fn set_sync_handler(&mut self, handler: ClockSyncHandler) {
        self.sync = Some(handler);
    }

    pub fn now(&self) -> NaiveDateTime {
        match &self.provider {
            Some(provider) => provider(),
            None => Local::now().naive_local() + self.offset,
        }
    }

    /// Current time as `YYYYMMDDhhmmsscc`
    pub fn now_string(&self) -> String {
        format_time(&self.now())
    }

    pub fn offset(&self) -> TimeDelta {
        self.offset
    }

    /// Take over the offset of `other`, keeping this clock's hooks
    pub fn adopt_offset(&mut self, other: &GemClock) {
        self.offset = other.offset;
    }

    /// Set the clock from S2F31 TIME text.
    ///
    /// With a time provider installed only the sync handler sees the
    /// accepted time; the offset stays untouched.
    pub fn set(&mut self, text: &str) -> TiAck {
        let Some(target) = parse_time(text) else {
            log::warn!("Rejected clock value {:?}", text);
            return TiAck::NotDone;
        };
        if let Some(handler) = &self.sync {
            match handler(target) {
                Ok(TiAck::Accepted) => {}
                Ok(ack) => {
                    log::warn!("Clock set to {} refused: {:?}", text, ack);
                    return ack;
                }
                Err(err) => {
                    log::warn!("Clock set to {} failed: {}", text, err);
                    return TiAck::NotDone;
                }
            }
        }
        if self.provider.is_none() {
            self.offset = target - Local::now().naive_local();
        }
        log::info!("Clock set to {} (offset {}s)", text, self.offset.num_seconds());
        TiAck::Accepted
    }
}

/// Render as the 16-character form `YYYYMMDDhhmmsscc`
pub fn format_time(time: &NaiveDateTime) -> String {
    let centis = (time.nanosecond() / 10_000_000).min(99);
    format!("{}{:02}", time.format("%Y%m%d%H%M%S"), centis)
}

fn field(text: &str, range: std::ops::Range<usize>) -> Option<u32> {
    text.get(range)?.parse().ok()
}

/// Parse `YYYYMMDDhhmmsscc` or `YYMMDDhhmmss`.
///
/// Two-digit years below 70 are in the 2000s.
pub fn parse_time(text: &str) -> Option<NaiveDateTime> {
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (year, rest, centis) = match text.len() {
        16 => (field(text, 0..4)? as i32, &text[4..14], field(text, 14..16)?),
        12 => {
            let short = field(text, 0..2)? as i32;
            let year = if short < 70 { 2000 + short } else { 1900 + short };
            (year, &text[2..12], 0)
        }
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, field(rest, 0..2)?, field(rest, 2..4)?)?.and_hms_milli_opt(
        field(rest, 4..6)?,
        field(rest, 6..8)?,
        field(rest, 8..10)?,
        centis * 10,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_forms() {
        let long = parse_time("2024031512304599").unwrap();
        assert_eq!(format_time(&long), "2024031512304599");

        let short = parse_time("240315123045").unwrap();
        assert_eq!(format_time(&short), "2024031512304500");
        let old = parse_time("991231235959").unwrap();
        assert_eq!(format_time(&old), "1999123123595900");
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(parse_time("2024133112304500").is_none());
        assert!(parse_time("20240315").is_none());
        assert!(parse_time("2024-03-15T12:3").is_none());
        assert!(parse_time("2024023012000000").is_none());
    }

    #[test]
    fn test_set_moves_clock() {
        let mut clock = GemClock::new();
        assert_eq!(clock.set("2001010100000000"), TiAck::Accepted);
        assert!(clock.now_string().starts_with("20010101"));
        assert!(clock.offset() < TimeDelta::zero());

        assert_eq!(clock.set("garbage"), TiAck::NotDone);
        assert!(clock.now_string().starts_with("20010101"));
    }

    #[test]
    fn test_provider_and_sync_handler() {
        let fixed = parse_time("2025060108000000").unwrap();
        let mut clock = GemClock::new();
        clock.set_time_provider(Arc::new(move || fixed));
        clock.set_sync_handler(Arc::new(|target: NaiveDateTime| {
            if target.format("%Y").to_string() == "1999" {
                anyhow::bail!("clock locked");
            }
            Ok(if target.format("%Y").to_string() == "2025" {
                TiAck::Accepted
            } else {
                TiAck::OutOfSyncLimit
            })
        }));
        assert_eq!(clock.now_string(), "2025060108000000");

        assert_eq!(clock.set("2030010100000000"), TiAck::OutOfSyncLimit);
        assert_eq!(clock.set("1999010100000000"), TiAck::NotDone);
        assert_eq!(clock.set("2025060109000000"), TiAck::Accepted);
        assert_eq!(clock.offset(), TimeDelta::zero());
        assert_eq!(clock.now_string(), "2025060108000000");
        assert_eq!(clock.set("not a time"), TiAck::NotDone);
    }
}
