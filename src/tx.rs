//! Transmit bit-timing engine.
//!
//! Pure logic, no hardware dependencies. Clocks queued bytes out one bit
//! per armed interval; the caller drives the physical line with the level
//! each tick returns and owns the byte queue, handing the clocker a lazy
//! fetch so the queue is only touched at a stop bit.

use crate::config::ConfigError;
use crate::line::Level;
use crate::timing::{BitTiming, TimerDecision};

/// Outcome of one bit-clock tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockOutcome {
    /// Level to drive onto the line for this bit period.
    pub level: Level,
    /// Whether the bit clock re-arms or goes idle.
    pub timer: TimerDecision,
    /// The queue drained at this stop bit; the wakeup task should run.
    pub went_idle: bool,
}

/// Transmit bit-clock state machine.
///
/// `bit_index` walks `-1` (start bit) through `0..=7` (data bits, LSB
/// first) to `8` (stop bit, then next-byte dequeue). Frames of queued
/// bytes are emitted back to back with no idle gap: a successful dequeue
/// at the stop bit leaves `bit_index` at `-1` with the timer re-armed, so
/// the next tick drives the next start bit one period after the stop bit
/// began.
#[derive(Debug)]
pub struct TxClocker {
    timing: BitTiming,

    bit_index: i8,
    payload: u8,
    active: bool,
}

impl TxClocker {
    /// Create an idle clocker with the given timing.
    pub fn new(timing: BitTiming) -> Self {
        Self {
            timing,
            bit_index: -1,
            payload: 0,
            active: false,
        }
    }

    /// Begin a frame with the first byte of a burst.
    ///
    /// Only valid while idle. The caller arms the timer one full period
    /// in the future so the first tick is not late against the nominal
    /// bit schedule.
    #[inline]
    pub fn load(&mut self, byte: u8) {
        self.payload = byte;
        self.bit_index = -1;
        self.active = true;
    }

    /// Bit-clock entry: the armed interval fired.
    ///
    /// `fetch_next` is consulted only at a stop bit, to decide between a
    /// back-to-back next frame and going idle.
    #[inline]
    pub fn on_clock<F>(&mut self, now_ns: u64, fetch_next: F) -> ClockOutcome
    where
        F: FnOnce() -> Option<u8>,
    {
        let level;
        if self.bit_index == -1 {
            level = Level::Low; // Start bit
            self.bit_index = 0;
        } else if self.bit_index < 8 {
            level = Level::from_bit(self.payload & 0b1);
            self.payload >>= 1;
            self.bit_index += 1;
        } else {
            level = Level::High; // Stop bit
            self.bit_index = -1;

            // Next queued byte keeps the clock running; an empty queue
            // stops it and hands off to the wakeup task.
            match fetch_next() {
                Some(byte) => self.payload = byte,
                None => {
                    self.active = false;
                    return ClockOutcome {
                        level,
                        timer: TimerDecision::Stop,
                        went_idle: true,
                    };
                }
            }
        }

        ClockOutcome {
            level,
            timer: TimerDecision::Rearm(now_ns + self.timing.period_ns()),
            went_idle: false,
        }
    }

    /// Check if a frame is in flight (timer armed or byte loaded).
    #[inline]
    pub fn active(&self) -> bool {
        self.active
    }

    /// Recompute the bit period for a new baud rate.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), ConfigError> {
        self.timing.set_baud_rate(baud_rate)
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

    fn clocker(baud: u32) -> TxClocker {
        TxClocker::new(BitTiming::from_baud(baud, 0).unwrap())
    }

    /// Clock one loaded frame to completion, collecting driven levels.
    fn run_frame<F>(tx: &mut TxClocker, mut fetch: F) -> (Vec<Level>, bool)
    where
        F: FnMut() -> Option<u8>,
    {
        let mut levels = Vec::new();
        let mut t = tx.timing().period_ns();
        loop {
            let out = tx.on_clock(t, &mut fetch);
            levels.push(out.level);
            match out.timer {
                TimerDecision::Rearm(next) => t = next,
                TimerDecision::Stop => return (levels, out.went_idle),
            }
            if levels.len() > 11 {
                // One frame is exactly 10 bit periods.
                return (levels, out.went_idle);
            }
        }
    }

    #[test]
    fn test_frame_0x41() {
        let mut tx = clocker(9600);
        tx.load(0x41);

        let (levels, went_idle) = run_frame(&mut tx, || None);

        // low (start), 1,0,0,0,0,0,1,0 (0x41 LSB first), high (stop)
        let expected = [
            Level::Low,
            Level::High,
            Level::Low,
            Level::Low,
            Level::Low,
            Level::Low,
            Level::Low,
            Level::High,
            Level::Low,
            Level::High,
        ];
        assert_eq!(levels, expected);
        assert!(went_idle);
        assert!(!tx.active());
    }

    #[test]
    fn test_ticks_are_one_period_apart() {
        let mut tx = clocker(9600);
        let period = tx.timing().period_ns();
        tx.load(0xff);

        let mut t = period;
        for _ in 0..9 {
            let out = tx.on_clock(t, || None);
            assert_eq!(out.timer, TimerDecision::Rearm(t + period));
            t += period;
        }
        let out = tx.on_clock(t, || None);
        assert_eq!(out.timer, TimerDecision::Stop);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut tx = clocker(9600);
        let mut queue = vec![0x55u8];
        tx.load(0x00);

        let mut levels = Vec::new();
        let mut t = tx.timing().period_ns();
        loop {
            let out = tx.on_clock(t, || queue.pop());
            levels.push(out.level);
            match out.timer {
                TimerDecision::Rearm(next) => t = next,
                TimerDecision::Stop => break,
            }
        }

        // Two full frames, 20 bit periods, no gap: the stop bit of the
        // first byte is immediately followed by the next start bit.
        assert_eq!(levels.len(), 20);
        assert_eq!(levels[9], Level::High); // stop of byte 0
        assert_eq!(levels[10], Level::Low); // start of byte 1
        assert_eq!(levels[19], Level::High); // stop of byte 1

        // 0x55 LSB first: 1,0,1,0,1,0,1,0
        let byte1_bits: Vec<u8> = levels[11..19].iter().map(|l| l.bit()).collect();
        assert_eq!(byte1_bits, [1, 0, 1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_idle_after_drain_signals_wakeup() {
        let mut tx = clocker(9600);
        tx.load(0x7f);

        let (_, went_idle) = run_frame(&mut tx, || None);
        assert!(went_idle);

        // Loading again restarts from the start bit.
        tx.load(0x01);
        assert!(tx.active());
        let out = tx.on_clock(0, || None);
        assert_eq!(out.level, Level::Low);
    }

    #[test]
    fn test_set_baud_rate() {
        let mut tx = clocker(9600);
        tx.set_baud_rate(19_200).unwrap();
        assert_eq!(tx.timing().period_ns(), 52_083);
        assert_eq!(tx.set_baud_rate(0), Err(ConfigError::ZeroBaudRate));
    }
}
