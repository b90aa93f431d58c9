//! Scheduling layer: owned transceiver handles.
//!
//! Wires the pure engines to real concurrency:
//! - one `BitTimer` thread per engine plays the high-resolution timer;
//!   its callback does bounded work under the engine lock and decides
//!   re-arm or idle
//! - one `DeferredTask` per engine runs the non-critical side (byte
//!   delivery, drain wakeups, consumer callbacks)
//! - one mutex per engine is the critical section: the RX edge path and
//!   RX sample path contend on it, as do the TX write path and TX clock
//!   path; no two state transitions for the same byte ever interleave
//!
//! Teardown is Drop: gate the edge source, join the timer (waiting out an
//! in-flight callback), then join the worker. No partial-teardown state is
//! observable.
//!
//! Logging discipline: the edge and timer contexts never log; `log` calls
//! sit only in setup paths.

mod serial;
mod timer;
mod worker;

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::{ConfigError, UartConfig};
use crate::fifo::{ByteFifo, RX_FIFO_SIZE, TX_FIFO_SIZE};
use crate::line::{InputLine, Level, OutputLine};
use crate::rx::RxSampler;
use crate::stats::{StatsSnapshot, UartStats};
use crate::timing::{BitTiming, TimerDecision};
use crate::tx::TxClocker;

use timer::BitTimer;
use worker::{DeferredTask, Kicker};

/// Consumer-supplied delivery callback: receives each batch of completed
/// bytes from the deferred-delivery context. At-least-once per byte,
/// batched opportunistically; must not block indefinitely.
pub type RxCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Consumer-supplied wakeup callback: invoked from the deferred-wakeup
/// context when the TX queue drains, so an upstream writer can resume.
pub type TxRoomCallback = Box<dyn FnMut() + Send>;

/// Setup failures, fatal to instance creation.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("failed to spawn {role} thread")]
    Spawn {
        role: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Lock a mutex, riding through poisoning.
///
/// A consumer callback that panicked on a worker thread must not wedge the
/// bit engines; the guarded state is index/flag arithmetic that stays
/// consistent under any unwind.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
fn ns_since(epoch: Instant, now: Instant) -> u64 {
    now.saturating_duration_since(epoch).as_nanos() as u64
}

// ============================================================================
// Receive handle
// ============================================================================

struct Marker {
    line: Box<dyn OutputLine>,
    level: Level,
}

impl Marker {
    fn toggle(&mut self) {
        self.level = self.level.inverted();
        self.line.set_level(self.level);
    }
}

/// State behind the RX engine lock.
struct RxInner {
    sampler: RxSampler,
    line: Box<dyn InputLine>,
    /// Debug-mode sampling marker; the physical TX line, handed over at
    /// open. The documented exception to one-line-one-owner.
    marker: Option<Marker>,
}

struct RxShared {
    inner: Mutex<RxInner>,
    fifo: ByteFifo<RX_FIFO_SIZE>,
    stats: Arc<UartStats>,
    /// Edge-acceptance gate; the stand-in for enabling the line interrupt.
    active: AtomicBool,
    epoch: Instant,
}

impl RxShared {
    fn deadline(&self, ns: u64) -> Instant {
        self.epoch + Duration::from_nanos(ns)
    }
}

/// Owned receive engine.
///
/// The excluded wiring layer feeds falling edges in through
/// [`UartRx::notify_falling_edge`]; decoded bytes leave through the
/// delivery callback, or through [`UartRx::read`] when no callback was
/// configured.
pub struct UartRx {
    shared: Arc<RxShared>,
    timer: Option<BitTimer>,
    delivery: Option<DeferredTask>,
}

impl UartRx {
    /// Set up a receive engine.
    ///
    /// `marker` is required exactly when `config.rx_debug` is set and is
    /// dropped otherwise. With `delivery` present, a deferred task drains
    /// completed bytes to it; without, the consumer polls [`UartRx::read`].
    /// The engine starts deactivated; call [`UartRx::activate`].
    pub fn open(
        config: &UartConfig,
        line: Box<dyn InputLine>,
        marker: Option<Box<dyn OutputLine>>,
        delivery: Option<RxCallback>,
    ) -> Result<Self, SetupError> {
        let timing = BitTiming::from_baud(config.baud_rate, config.rx_skew_percent)?;
        let marker = if config.rx_debug {
            let line = marker.ok_or(ConfigError::DebugLineMissing)?;
            Some(Marker {
                line,
                level: Level::Low,
            })
        } else {
            None
        };

        let shared = Arc::new(RxShared {
            inner: Mutex::new(RxInner {
                sampler: RxSampler::new(timing),
                line,
                marker,
            }),
            fifo: ByteFifo::new(),
            stats: Arc::new(UartStats::new()),
            active: AtomicBool::new(false),
            epoch: Instant::now(),
        });

        let delivery = match delivery {
            Some(mut callback) => {
                let worker_shared = Arc::clone(&shared);
                let task = DeferredTask::spawn("softuart-rx-push", move || {
                    let mut buf = [0u8; RX_FIFO_SIZE];
                    let n = worker_shared.fifo.read(&mut buf);
                    if n > 0 {
                        callback(&buf[..n]);
                    }
                })
                .map_err(|source| SetupError::Spawn {
                    role: "rx delivery",
                    source,
                })?;
                Some(task)
            }
            None => None,
        };
        let kicker = delivery.as_ref().map(DeferredTask::kicker);

        let timer_shared = Arc::clone(&shared);
        let timer = BitTimer::spawn("softuart-rx-timer", move |now| {
            rx_timer_tick(&timer_shared, kicker.as_ref(), now)
        })
        .map_err(|source| SetupError::Spawn {
            role: "rx timer",
            source,
        })?;

        log::debug!(
            "softuart rx: open, period {} ns, skew {} ns",
            timing.period_ns(),
            timing.skew_ns()
        );

        Ok(Self {
            shared,
            timer: Some(timer),
            delivery,
        })
    }

    /// Edge-detect entry: the line transitioned high to low.
    ///
    /// Interrupt-context contract: bounded work under the engine lock,
    /// never blocks. Ignored while deactivated, while a byte is in
    /// progress, or while the sample timer is armed.
    pub fn notify_falling_edge(&self) {
        if !self.shared.active.load(Ordering::Acquire) {
            return;
        }
        let Some(timer) = self.timer.as_ref() else {
            return;
        };

        let mut inner = lock(&self.shared.inner);
        let now_ns = ns_since(self.shared.epoch, Instant::now());
        if let Some(deadline_ns) = inner.sampler.on_falling_edge(now_ns) {
            timer.arm(self.shared.deadline(deadline_ns));
            if let Some(marker) = inner.marker.as_mut() {
                marker.toggle();
            }
        }
    }

    /// Enable edge acceptance without touching engine state.
    pub fn activate(&self) {
        self.shared.active.store(true, Ordering::Release);
    }

    /// Disable edge acceptance without destroying engine state.
    ///
    /// A byte already being sampled still completes; no new frame starts.
    pub fn shutdown(&self) {
        self.shared.active.store(false, Ordering::Release);
    }

    /// Check the edge-acceptance gate.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Reconfigure the bit period and skew offset.
    ///
    /// Safe while the line is quiescent; behavior for a byte in flight is
    /// undefined (it keeps the old schedule until its stop bit).
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<(), ConfigError> {
        lock(&self.shared.inner).sampler.set_baud_rate(baud_rate)
    }

    /// Drain up to `buf.len()` decoded bytes. Polling-consumption mode
    /// only: returns 0 when a delivery callback owns the queue.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        if self.delivery.is_some() {
            return 0;
        }
        self.shared.fifo.read(buf)
    }

    /// Pop one decoded byte. Polling-consumption mode only.
    pub fn try_read(&self) -> Option<u8> {
        if self.delivery.is_some() {
            return None;
        }
        self.shared.fifo.pop()
    }

    /// Point-in-time counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl fmt::Debug for UartRx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UartRx")
            .field("active", &self.is_active())
            .field("queued", &self.shared.fifo.len())
            .finish_non_exhaustive()
    }
}

impl Drop for UartRx {
    fn drop(&mut self) {
        self.shared.active.store(false, Ordering::Release);
        // Timer first: joining it retires any in-flight sample callback
        // and releases its kick handle, then the delivery task can stop.
        drop(self.timer.take());
        drop(self.delivery.take());
    }
}

fn rx_timer_tick(shared: &RxShared, kicker: Option<&Kicker>, now: Instant) -> Option<Instant> {
    let mut inner = lock(&shared.inner);
    let now_ns = ns_since(shared.epoch, now);

    let level = inner.line.level();
    if let Some(marker) = inner.marker.as_mut() {
        marker.toggle();
    }

    let outcome = inner.sampler.on_sample(now_ns, level);

    if outcome.framing_error {
        shared.stats.record_framing_error();
    }
    if let Some(byte) = outcome.byte {
        // A full queue drops the byte; RX has no backpressure path to the
        // physical line.
        if shared.fifo.push(byte) {
            shared.stats.record_received();
        } else {
            shared.stats.record_rx_overrun();
        }
        if let Some(kicker) = kicker {
            kicker.kick();
        }
    }

    match outcome.timer {
        TimerDecision::Rearm(ns) => Some(shared.deadline(ns)),
        TimerDecision::Stop => None,
    }
}

// ============================================================================
// Transmit handle
// ============================================================================

/// State behind the TX engine lock.
struct TxInner {
    clocker: TxClocker,
    line: Box<dyn OutputLine>,
}

struct TxShared {
    inner: Mutex<TxInner>,
    fifo: ByteFifo<TX_FIFO_SIZE>,
    /// Pairs with `drained` for missed-wakeup-free drain waits: the final
    /// dequeue's wakeup task takes this lock before notifying.
    drain_lock: Mutex<()>,
    drained: Condvar,
    stats: Arc<UartStats>,
    epoch: Instant,
}

impl TxShared {
    fn deadline(&self, ns: u64) -> Instant {
        self.epoch + Duration::from_nanos(ns)
    }
}

/// Everything a live (non-suppressed) TX engine runs.
///
/// Field order is teardown order: the timer joins before the wakeup task
/// so its kick handle is gone when the worker stops.
struct TxParts {
    shared: Arc<TxShared>,
    timer: BitTimer,
    wakeup: DeferredTask,
}

/// Owned transmit engine.
///
/// In debug mode (`config.rx_debug`) the handle is built suppressed: the
/// physical line belongs to the RX marker, writes report full acceptance
/// and are discarded, and the queue is permanently empty.
pub struct UartTx {
    parts: Option<TxParts>,
    stats: Arc<UartStats>,
}

impl UartTx {
    /// Set up a transmit engine. The line idles high immediately.
    pub fn open(
        config: &UartConfig,
        line: Box<dyn OutputLine>,
        room: Option<TxRoomCallback>,
    ) -> Result<Self, SetupError> {
        if config.rx_debug {
            return Self::suppressed(config);
        }
        let timing = BitTiming::from_baud(config.baud_rate, 0)?;
        Self::open_parts(timing, line, room)
    }

    /// Debug-mode handle: validated config, no engine.
    fn suppressed(config: &UartConfig) -> Result<Self, SetupError> {
        BitTiming::from_baud(config.baud_rate, 0)?;
        log::debug!("softuart tx: suppressed for rx debug mode");
        Ok(Self {
            parts: None,
            stats: Arc::new(UartStats::new()),
        })
    }

    fn open_parts(
        timing: BitTiming,
        mut line: Box<dyn OutputLine>,
        room: Option<TxRoomCallback>,
    ) -> Result<Self, SetupError> {
        line.set_level(Level::High); // Idle line

        let stats = Arc::new(UartStats::new());
        let shared = Arc::new(TxShared {
            inner: Mutex::new(TxInner {
                clocker: TxClocker::new(timing),
                line,
            }),
            fifo: ByteFifo::new(),
            drain_lock: Mutex::new(()),
            drained: Condvar::new(),
            stats: Arc::clone(&stats),
            epoch: Instant::now(),
        });

        let wakeup = {
            let worker_shared = Arc::clone(&shared);
            let mut room = room;
            DeferredTask::spawn("softuart-tx-wakeup", move || {
                // Hold the drain lock across the condition change so a
                // waiter between its emptiness check and its wait cannot
                // miss the notification.
                drop(lock(&worker_shared.drain_lock));
                worker_shared.drained.notify_all();
                if let Some(callback) = room.as_mut() {
                    callback();
                }
            })
            .map_err(|source| SetupError::Spawn {
                role: "tx wakeup",
                source,
            })?
        };
        let kicker = wakeup.kicker();

        let timer_shared = Arc::clone(&shared);
        let timer = BitTimer::spawn("softuart-tx-timer", move |now| {
            tx_timer_tick(&timer_shared, &kicker, now)
        })
        .map_err(|source| SetupError::Spawn {
            role: "tx timer",
            source,
        })?;

        log::debug!("softuart tx: open, period {} ns", timing.period_ns());

        Ok(Self {
            parts: Some(TxParts {
                shared,
                timer,
                wakeup,
            }),
            stats,
        })
    }

    /// Enqueue as many bytes as fit and start emission if idle.
    ///
    /// Returns the accepted count; a full queue yields a short write,
    /// never an error. Never blocks.
    pub fn write(&self, buf: &[u8]) -> usize {
        let Some(parts) = self.parts.as_ref() else {
            // Debug mode disables TX entirely; pretend the bytes left.
            return buf.len();
        };
        let shared = &parts.shared;

        let mut inner = lock(&shared.inner);
        let accepted = shared.fifo.write(buf);

        if !inner.clocker.active() {
            if let Some(byte) = shared.fifo.pop() {
                shared.stats.record_sent();
                inner.clocker.load(byte);
                // One period out so the first clock tick isn't
                // automatically late.
                let now_ns = ns_since(shared.epoch, Instant::now());
                let deadline_ns = now_ns + inner.clocker.timing().period_ns();
                parts.timer.arm(shared.deadline(deadline_ns));
            }
        }

        accepted
    }

    /// Remaining queue capacity.
    pub fn write_room(&self) -> usize {
        match self.parts.as_ref() {
            None => TX_FIFO_SIZE,
            Some(parts) => {
                let _inner = lock(&parts.shared.inner);
                parts.shared.fifo.room()
            }
        }
    }

    /// Bytes still queued (excludes the byte currently shifting out).
    pub fn pending(&self) -> usize {
        self.parts.as_ref().map_or(0, |parts| parts.shared.fifo.len())
    }

    /// Block until the queue is empty or the timeout expires.
    ///
    /// Returns whether the queue drained. `None` waits indefinitely. The
    /// condition is queue emptiness, so a byte mid-shift at call time does
    /// not extend the wait. Safe to call concurrently with writes.
    pub fn wait_until_sent(&self, timeout: Option<Duration>) -> bool {
        let Some(parts) = self.parts.as_ref() else {
            return true;
        };
        let shared = &parts.shared;
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut guard = lock(&shared.drain_lock);
        while !shared.fifo.is_empty() {
            match deadline {
                None => {
                    guard = shared
                        .drained
                        .wait(guard)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (g, _) = shared
                        .drained
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard = g;
                }
            }
        }
        true
    }

    /// Reconfigure the bit period.
    ///
    /// Safe while idle between bytes; a byte in flight keeps the old
    /// schedule until its stop bit.
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<(), ConfigError> {
        match self.parts.as_ref() {
            None => BitTiming::from_baud(baud_rate, 0).map(|_| ()),
            Some(parts) => lock(&parts.shared.inner).clocker.set_baud_rate(baud_rate),
        }
    }

    /// Point-in-time counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl fmt::Debug for UartTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UartTx")
            .field("suppressed", &self.parts.is_none())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

fn tx_timer_tick(shared: &TxShared, kicker: &Kicker, now: Instant) -> Option<Instant> {
    let mut inner = lock(&shared.inner);
    let now_ns = ns_since(shared.epoch, now);
    let stats = &shared.stats;

    let outcome = inner.clocker.on_clock(now_ns, || {
        let byte = shared.fifo.pop();
        if byte.is_some() {
            stats.record_sent();
        }
        byte
    });
    inner.line.set_level(outcome.level);

    if outcome.went_idle {
        kicker.kick();
    }

    match outcome.timer {
        TimerDecision::Rearm(ns) => Some(shared.deadline(ns)),
        TimerDecision::Stop => None,
    }
}

// ============================================================================
// Paired transceiver
// ============================================================================

/// Both directions of one transceiver instance.
///
/// [`SoftUart::open`] performs the debug-mode line handoff: with
/// `config.rx_debug` set, the TX line becomes the RX sampling marker and
/// the TX engine is suppressed.
pub struct SoftUart {
    pub rx: UartRx,
    pub tx: UartTx,
}

impl SoftUart {
    /// Set up a paired transceiver on one line set.
    pub fn open(
        config: &UartConfig,
        rx_line: Box<dyn InputLine>,
        tx_line: Box<dyn OutputLine>,
        delivery: Option<RxCallback>,
        room: Option<TxRoomCallback>,
    ) -> Result<Self, SetupError> {
        if config.rx_debug {
            let rx = UartRx::open(config, rx_line, Some(tx_line), delivery)?;
            let tx = UartTx::suppressed(config)?;
            Ok(Self { rx, tx })
        } else {
            let rx = UartRx::open(config, rx_line, None, delivery)?;
            let tx = UartTx::open(config, tx_line, room)?;
            Ok(Self { rx, tx })
        }
    }

    /// Reconfigure both engines, typically while the line is quiescent.
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<(), ConfigError> {
        self.rx.set_baud_rate(baud_rate)?;
        self.tx.set_baud_rate(baud_rate)
    }
}
