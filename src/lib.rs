//! # softuart
//!
//! Software-defined serial transceiver: an asynchronous 8-N-1 bitstream
//! reconstructed and produced on a pair of digital I/O lines using only
//! edge events and a high-resolution timer, no UART hardware.
//!
//! ## Architecture
//!
//! Two independent bit-timing engines, each a pure state machine behind
//! one exclusive lock, fed by interrupt-like contexts that never block or
//! allocate:
//! - [`RxSampler`]: a falling edge arms the sample timer at a skew offset;
//!   the timer re-arms itself once per bit period until the byte completes
//!   or the frame is invalid
//! - [`TxClocker`]: a write arms the bit clock; the clock re-arms itself
//!   once per bit period until the queue drains
//! - [`ByteFifo`]: lock-free SPSC rings decouple the engines from the
//!   deferred delivery/wakeup tasks, which may block and call consumer
//!   callbacks
//!
//! The `std` feature (default) adds the scheduling layer in [`runtime`]:
//! timer threads, deferred workers, blocking drain waits, and teardown
//! joins. The core builds without it for targets that bring their own
//! interrupt and timer plumbing.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod config;
pub mod fifo;
pub mod line;
pub mod rx;
pub mod stats;
pub mod timing;
pub mod tx;

#[cfg(feature = "std")]
pub mod runtime;

pub use config::{ConfigError, UartConfig, DEFAULT_BAUD_RATE, DEFAULT_RX_SKEW};
pub use fifo::{ByteFifo, RX_FIFO_SIZE, TX_FIFO_SIZE};
pub use line::{InputLine, Level, OutputLine};
pub use rx::{RxSampler, SampleOutcome};
pub use stats::{StatsSnapshot, UartStats};
pub use timing::{BitTiming, TimerDecision};
pub use tx::{ClockOutcome, TxClocker};

#[cfg(feature = "std")]
pub use runtime::{RxCallback, SetupError, SoftUart, TxRoomCallback, UartRx, UartTx};
