//! Receive bit-timing engine.
//!
//! Pure logic, no hardware dependencies. Consumes edge timestamps and
//! sampled line levels, produces decoded bytes. Fully testable on host.
//!
//! A frame is reconstructed from two entry points:
//! - [`RxSampler::on_falling_edge`] arms the sample timer when the line
//!   drops into a start-bit candidate
//! - [`RxSampler::on_sample`] runs once per armed interval, walking the
//!   frame one bit at a time
//!
//! Only the first sample is delayed by the skew offset from the edge;
//! every later sample is one full bit period after the previous sample,
//! which keeps sampling locked to bit centers instead of re-synchronizing
//! on every bit.

use crate::config::ConfigError;
use crate::line::Level;
use crate::timing::{BitTiming, TimerDecision};

/// Outcome of one timed sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleOutcome {
    /// Whether the sample timer re-arms or goes idle.
    pub timer: TimerDecision,
    /// Completed byte, present only after a valid stop bit.
    pub byte: Option<u8>,
    /// An invalid start or stop bit discarded the frame in progress.
    pub framing_error: bool,
}

/// Receive sampler state machine.
///
/// `bit_index` walks `-1` (awaiting/validating the start bit) through
/// `0..=7` (data bits, LSB first) to `8` (stop bit). All transitions for
/// one byte are serialized by the caller's engine lock; at most one timer
/// interval is armed at any time.
#[derive(Debug)]
pub struct RxSampler {
    timing: BitTiming,

    bit_index: i8,
    payload: u8,
    timer_armed: bool,
}

impl RxSampler {
    /// Create an idle sampler with the given timing.
    pub fn new(timing: BitTiming) -> Self {
        Self {
            timing,
            bit_index: -1,
            payload: 0,
            timer_armed: false,
        }
    }

    /// Falling-edge entry: a start-bit candidate was detected.
    ///
    /// Returns the absolute deadline for the first sample (`now + skew`),
    /// or `None` when the edge is ignored because a byte is already in
    /// progress or the timer is already armed. Ignoring overlapping edges
    /// stands in for masking the edge source while a byte is being read.
    #[inline]
    pub fn on_falling_edge(&mut self, now_ns: u64) -> Option<u64> {
        if self.bit_index != -1 || self.timer_armed {
            return None;
        }

        self.payload = 0;
        self.timer_armed = true;
        Some(now_ns + self.timing.skew_ns())
    }

    /// Timed-sample entry: the armed interval fired and `level` was read
    /// from the line.
    #[inline]
    pub fn on_sample(&mut self, now_ns: u64, level: Level) -> SampleOutcome {
        if self.bit_index == -1 {
            if level.is_high() {
                // Start bit is invalid.
                self.timer_armed = false;
                return SampleOutcome {
                    timer: TimerDecision::Stop,
                    byte: None,
                    framing_error: true,
                };
            }
            self.bit_index = 0;
        } else if self.bit_index < 8 {
            self.payload = (level.bit() << 7) | (self.payload >> 1);
            self.bit_index += 1;
        } else {
            // Stop-bit sample: a valid stop completes the byte, an
            // invalid one discards it. Either way the engine goes back to
            // waiting for the next falling edge.
            let valid = level.is_high();
            let byte = if valid { Some(self.payload) } else { None };
            self.bit_index = -1;
            self.timer_armed = false;
            return SampleOutcome {
                timer: TimerDecision::Stop,
                byte,
                framing_error: !valid,
            };
        }

        SampleOutcome {
            timer: TimerDecision::Rearm(now_ns + self.timing.period_ns()),
            byte: None,
            framing_error: false,
        }
    }

    /// Recompute period and skew for a new baud rate.
    ///
    /// Call while the line is quiescent; a byte in flight keeps sampling
    /// on the old schedule until its stop bit.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ConfigError> {
        self.timing.set_baud_rate(baud_rate)
    }

    /// Check if a byte is currently being sampled.
    #[inline]
    pub fn in_progress(&self) -> bool {
        self.bit_index != -1 || self.timer_armed
    }

    /// Current timing.
    #[inline]
    pub fn timing(&self) -> &BitTiming {
        &self.timing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(baud: u32, skew: u8) -> RxSampler {
        RxSampler::new(BitTiming::from_baud(baud, skew).unwrap())
    }

    /// Walk a full frame through the sampler and collect the result.
    fn run_frame(rx: &mut RxSampler, start: Level, bits: [u8; 8], stop: Level) -> SampleOutcome {
        let period = rx.timing().period_ns();
        let mut t = rx.on_falling_edge(0).expect("edge should arm");

        let mut outcome = rx.on_sample(t, start);
        for &bit in &bits {
            match outcome.timer {
                TimerDecision::Rearm(next) => t = next,
                TimerDecision::Stop => return outcome,
            }
            assert_eq!(t % period, rx.timing().skew_ns() % period);
            outcome = rx.on_sample(t, Level::from_bit(bit));
        }
        match outcome.timer {
            TimerDecision::Rearm(next) => t = next,
            TimerDecision::Stop => return outcome,
        }
        rx.on_sample(t, stop)
    }

    #[test]
    fn test_decode_0x41() {
        let mut rx = sampler(9600, 30);

        // 0x41 LSB-first: 1,0,0,0,0,0,1,0
        let outcome = run_frame(&mut rx, Level::Low, [1, 0, 0, 0, 0, 0, 1, 0], Level::High);
        assert_eq!(outcome.byte, Some(0x41));
        assert!(!outcome.framing_error);
        assert_eq!(outcome.timer, TimerDecision::Stop);
        assert!(!rx.in_progress());
    }

    #[test]
    fn test_skew_offsets_first_sample_only() {
        let mut rx = sampler(9600, 30);
        let period = rx.timing().period_ns();
        let skew = rx.timing().skew_ns();

        let first = rx.on_falling_edge(1_000).unwrap();
        assert_eq!(first, 1_000 + skew);

        // Subsequent samples are one period from the previous sample,
        // not from the edge.
        let outcome = rx.on_sample(first, Level::Low);
        assert_eq!(outcome.timer, TimerDecision::Rearm(first + period));
    }

    #[test]
    fn test_skew_boundaries() {
        // 0%: the first sample lands on the edge itself.
        let mut rx = sampler(9600, 0);
        assert_eq!(rx.on_falling_edge(500), Some(500));

        // 100%: the first sample lands a full period after the edge.
        let mut rx = sampler(9600, 100);
        let period = rx.timing().period_ns();
        assert_eq!(rx.on_falling_edge(500), Some(500 + period));
    }

    #[test]
    fn test_invalid_start_bit_discards() {
        let mut rx = sampler(9600, 30);

        let t = rx.on_falling_edge(0).unwrap();
        let outcome = rx.on_sample(t, Level::High);
        assert_eq!(outcome.timer, TimerDecision::Stop);
        assert_eq!(outcome.byte, None);
        assert!(outcome.framing_error);

        // Engine is idle again and accepts the next edge.
        assert!(!rx.in_progress());
        assert!(rx.on_falling_edge(10_000).is_some());
    }

    #[test]
    fn test_invalid_stop_bit_discards() {
        let mut rx = sampler(9600, 30);

        let outcome = run_frame(&mut rx, Level::Low, [1, 1, 1, 1, 1, 1, 1, 1], Level::Low);
        assert_eq!(outcome.byte, None);
        assert!(outcome.framing_error);
        assert_eq!(outcome.timer, TimerDecision::Stop);

        // Still ready for the next frame.
        let outcome = run_frame(&mut rx, Level::Low, [0, 1, 0, 1, 0, 1, 0, 1], Level::High);
        assert_eq!(outcome.byte, Some(0xaa));
    }

    #[test]
    fn test_edge_ignored_while_busy() {
        let mut rx = sampler(9600, 30);

        let t = rx.on_falling_edge(0).unwrap();

        // Timer armed, byte not yet started: edge ignored.
        assert_eq!(rx.on_falling_edge(10), None);

        // Mid-byte: edge ignored.
        rx.on_sample(t, Level::Low);
        assert_eq!(rx.on_falling_edge(t + 1), None);
    }

    #[test]
    fn test_lsb_first_assembly() {
        let mut rx = sampler(9600, 30);

        // Bit sampled at bit_index 0 ends up as payload bit 0.
        let outcome = run_frame(&mut rx, Level::Low, [1, 0, 0, 0, 0, 0, 0, 0], Level::High);
        assert_eq!(outcome.byte, Some(0x01));

        let outcome = run_frame(&mut rx, Level::Low, [0, 0, 0, 0, 0, 0, 0, 1], Level::High);
        assert_eq!(outcome.byte, Some(0x80));
    }

    #[test]
    fn test_set_baud_rate_between_bytes() {
        let mut rx = sampler(9600, 30);
        rx.set_baud_rate(4800).unwrap();
        assert_eq!(rx.timing().period_ns(), 208_333);
        assert_eq!(rx.set_baud_rate(0), Err(ConfigError::ZeroBaudRate));
    }
}
