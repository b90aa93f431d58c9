//! Transceiver configuration.
//!
//! The registration layer that binds lines and devices lives outside this
//! crate; it hands the core a [`UartConfig`] and the line drivers, nothing
//! more. Invalid configuration is a setup-time failure — once an instance
//! exists, no configuration path can fail mid-operation.

use thiserror::Error;

/// Default baud rate when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default RX sampling skew, percent of one bit period.
pub const DEFAULT_RX_SKEW: u8 = 30;

/// Configuration for one transceiver instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UartConfig {
    /// Line rate in bits per second. Must be positive.
    pub baud_rate: u32,

    /// How far into the nominal start-bit period the first RX sample is
    /// delayed past the detected edge, as a percent of one bit period.
    /// Clamped to 0..=100. Trades interrupt-latency tolerance against
    /// clock-drift sensitivity.
    pub rx_skew_percent: u8,

    /// Sampling-instant debug mode: RX toggles a marker output line on
    /// every accepted edge and every sample, and TX is suppressed for as
    /// long as the instance lives. For tuning `rx_skew_percent` against a
    /// scope trace.
    pub rx_debug: bool,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            rx_skew_percent: DEFAULT_RX_SKEW,
            rx_debug: false,
        }
    }
}

impl UartConfig {
    /// Config at the given baud rate with default skew, debug off.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }
}

/// Setup-time configuration errors. Fatal to instance creation; never
/// surfaced mid-operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The baud rate was zero; the bit period is derived as `1s / baud`.
    #[error("baud rate must be a positive number of bits per second")]
    ZeroBaudRate,

    /// Debug mode was requested without a marker output line to toggle.
    #[error("rx_debug requires a marker output line")]
    DebugLineMissing,
}
