//! Module: line
//!
//! Purpose: logic-level type and the line-driver seam between the bit
//! engines and whatever owns the physical pins.
//!
//! Architecture:
//! - `Level` is the wire-level truth both engines speak (idle = high)
//! - `InputLine`/`OutputLine` are object-safe so the scheduling layer can
//!   hold boxed drivers without growing pin type parameters
//! - Any `embedded-hal` digital pin adapts for free via blanket impls
//!
//! Safety: Safe. No unsafe blocks. Copy types only.

use embedded_hal::digital::{InputPin, OutputPin};

/// Logic level on a serial line.
///
/// An idle asynchronous serial line rests high; a frame opens with a
/// falling edge into the low start bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Check if the level is logic high.
    #[inline]
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    /// Check if the level is logic low.
    #[inline]
    pub const fn is_low(self) -> bool {
        matches!(self, Level::Low)
    }

    /// Wire bit value: 0 for low, 1 for high.
    #[inline]
    pub const fn bit(self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    /// Level for a wire bit: any non-zero bit is high.
    #[inline]
    pub const fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Level::Low
        } else {
            Level::High
        }
    }

    /// The opposite level.
    #[inline]
    pub const fn inverted(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl From<bool> for Level {
    #[inline]
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl From<Level> for bool {
    #[inline]
    fn from(level: Level) -> Self {
        level.is_high()
    }
}

/// Sampling side of a digital line.
///
/// Called from the timed-sample context, so implementations must be
/// non-blocking and safe to call at interrupt-like latency.
pub trait InputLine: Send {
    /// Read the current level of the line.
    fn level(&mut self) -> Level;
}

/// Driving side of a digital line.
///
/// Called from the bit-clock context, same latency contract as
/// [`InputLine`].
pub trait OutputLine: Send {
    /// Drive the line to the given level.
    fn set_level(&mut self, level: Level);
}

// Line electrical faults are setup-time failures; a pin that errors
// mid-operation degrades to "no data", never to a crash. Reads fall back
// to the idle level, writes are dropped.

impl<P: InputPin + Send> InputLine for P {
    #[inline]
    fn level(&mut self) -> Level {
        match self.is_high() {
            Ok(high) => Level::from(high),
            Err(_) => Level::High,
        }
    }
}

impl<P: OutputPin + Send> OutputLine for P {
    #[inline]
    fn set_level(&mut self, level: Level) {
        let _ = match level {
            Level::High => self.set_high(),
            Level::Low => self.set_low(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_bits() {
        assert_eq!(Level::Low.bit(), 0);
        assert_eq!(Level::High.bit(), 1);
        assert_eq!(Level::from_bit(0), Level::Low);
        assert_eq!(Level::from_bit(1), Level::High);
        assert_eq!(Level::from_bit(0x80), Level::High);
    }

    #[test]
    fn test_level_inverted() {
        assert_eq!(Level::Low.inverted(), Level::High);
        assert_eq!(Level::High.inverted(), Level::Low);
    }

    #[test]
    fn test_level_bool_conversion() {
        assert_eq!(Level::from(true), Level::High);
        assert_eq!(Level::from(false), Level::Low);
        assert!(bool::from(Level::High));
        assert!(!bool::from(Level::Low));
    }
}
