//! Transceiver observability counters.
//!
//! The protocol has no parity and no error reporting on the wire: invalid
//! frames are discarded and a stalled consumer drops bytes. These counters
//! make those silent outcomes observable without changing them. Updated
//! from the timing-critical contexts with relaxed atomics, read from
//! anywhere.

use core::sync::atomic::{AtomicU32, Ordering};

/// Thread-safe counter block shared by both engines of an instance.
pub struct UartStats {
    /// Bytes handed to the bit clock for emission.
    bytes_sent: AtomicU32,

    /// Bytes decoded with a valid stop bit and queued for delivery.
    bytes_received: AtomicU32,

    /// Frames discarded for an invalid start or stop bit.
    framing_errors: AtomicU32,

    /// Decoded bytes dropped because the RX queue was full.
    rx_overruns: AtomicU32,
}

impl UartStats {
    /// Create a zeroed counter block.
    pub const fn new() -> Self {
        Self {
            bytes_sent: AtomicU32::new(0),
            bytes_received: AtomicU32::new(0),
            framing_errors: AtomicU32::new(0),
            rx_overruns: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn record_sent(&self) {
        self.bytes_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_received(&self) {
        self.bytes_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rx_overrun(&self) {
        self.rx_overruns.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a consistent-enough point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            rx_overruns: self.rx_overruns.load(Ordering::Relaxed),
        }
    }
}

impl Default for UartStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub bytes_sent: u32,
    pub bytes_received: u32,
    pub framing_errors: u32,
    pub rx_overruns: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_accumulate() {
        let stats = UartStats::new();

        stats.record_sent();
        stats.record_sent();
        stats.record_received();
        stats.record_framing_error();

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_sent, 2);
        assert_eq!(snap.bytes_received, 1);
        assert_eq!(snap.framing_errors, 1);
        assert_eq!(snap.rx_overruns, 0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let stats = UartStats::new();
        let before = stats.snapshot();
        stats.record_rx_overrun();
        let after = stats.snapshot();

        assert_eq!(before.rx_overruns, 0);
        assert_eq!(after.rx_overruns, 1);
    }
}
