//! Bit-period and skew-offset arithmetic.
//!
//! Both engines schedule against plain `u64` nanosecond timestamps
//! relative to an epoch the scheduling layer owns; the core never touches
//! wall-clock types. All durations derive from the configured baud rate:
//! one bit lasts `1_000_000_000 / baud` nanoseconds.

use crate::config::ConfigError;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// What a timer callback tells the periodic timer to do next.
///
/// The timer fires once per armed interval; each callback either re-arms
/// it for an absolute deadline or lets it go idle. There is no recursive
/// scheduling — at most one timer instance is ever active per engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerDecision {
    /// Fire again at the given absolute deadline (nanoseconds from epoch).
    Rearm(u64),
    /// Go idle; the engine will arm again from an edge or a write.
    Stop,
}

/// Per-engine copy of the derived bit timing.
///
/// `skew_ns` only matters on the receive side; the transmit engine is
/// built with a zero skew percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitTiming {
    period_ns: u64,
    skew_ns: u64,
    skew_percent: u8,
}

impl BitTiming {
    /// Derive timing from a baud rate and a skew percent.
    ///
    /// The skew percent is clamped to 0..=100; a zero baud rate is a
    /// setup-time error.
    pub fn from_baud(baud_rate: u32, skew_percent: u8) -> Result<Self, ConfigError> {
        if baud_rate == 0 {
            return Err(ConfigError::ZeroBaudRate);
        }
        let skew_percent = skew_percent.min(100);
        let period_ns = NANOS_PER_SEC / baud_rate as u64;
        Ok(Self {
            period_ns,
            skew_ns: period_ns * skew_percent as u64 / 100,
            skew_percent,
        })
    }

    /// Recompute period and skew for a new baud rate, keeping the
    /// configured skew percent.
    ///
    /// Safe while the engine is idle between bytes; changing the rate with
    /// a byte in flight desynchronizes the remaining samples of that byte.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ConfigError> {
        *self = Self::from_baud(baud_rate, self.skew_percent)?;
        Ok(())
    }

    /// Duration of one bit, nanoseconds.
    #[inline]
    pub const fn period_ns(&self) -> u64 {
        self.period_ns
    }

    /// Delay from a detected edge to the first sample, nanoseconds.
    #[inline]
    pub const fn skew_ns(&self) -> u64 {
        self.skew_ns
    }

    /// Configured skew percent after clamping.
    #[inline]
    pub const fn skew_percent(&self) -> u8 {
        self.skew_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_9600() {
        let timing = BitTiming::from_baud(9600, 30).unwrap();
        assert_eq!(timing.period_ns(), 104_166);
        assert_eq!(timing.skew_ns(), 31_249);
    }

    #[test]
    fn test_skew_bounds() {
        // 0%: sample immediately at the edge.
        let timing = BitTiming::from_baud(9600, 0).unwrap();
        assert_eq!(timing.skew_ns(), 0);

        // 100%: sample a full bit period after the edge.
        let timing = BitTiming::from_baud(9600, 100).unwrap();
        assert_eq!(timing.skew_ns(), timing.period_ns());
    }

    #[test]
    fn test_skew_clamped() {
        let timing = BitTiming::from_baud(9600, 250).unwrap();
        assert_eq!(timing.skew_percent(), 100);
        assert_eq!(timing.skew_ns(), timing.period_ns());
    }

    #[test]
    fn test_zero_baud_rejected() {
        assert_eq!(
            BitTiming::from_baud(0, 30),
            Err(ConfigError::ZeroBaudRate)
        );
    }

    #[test]
    fn test_set_baud_rate_keeps_skew_percent() {
        let mut timing = BitTiming::from_baud(9600, 50).unwrap();
        timing.set_baud_rate(19_200).unwrap();
        assert_eq!(timing.period_ns(), 52_083);
        assert_eq!(timing.skew_percent(), 50);
        assert_eq!(timing.skew_ns(), 26_041);
        assert_eq!(timing.set_baud_rate(0), Err(ConfigError::ZeroBaudRate));
    }
}
