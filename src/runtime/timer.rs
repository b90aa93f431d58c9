//! Self-rescheduling deadline timer.
//!
//! One dedicated thread per engine stands in for the high-resolution
//! timer: it sleeps until the armed deadline, runs the callback, and
//! re-arms or goes idle on the callback's say-so. Plain loop, no recursive
//! scheduling, so stack depth stays bounded and cancellation is a state
//! flip.
//!
//! Dropping the timer is a synchronous join: it waits out any in-flight
//! callback before returning, so engine state can never be torn down under
//! a running callback.

use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::lock;

struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    cond: Condvar,
}

/// A repeating one-shot timer driven by a dedicated thread.
///
/// The callback runs with no timer-internal lock held and returns the next
/// absolute deadline to stay armed, or `None` to go idle. At most one
/// deadline is armed at any time; [`BitTimer::arm`] is only called while
/// the owning engine knows the timer is idle, which is what makes the
/// re-arm-after-callback handoff race-free.
pub(crate) struct BitTimer {
    shared: Arc<TimerShared>,
    thread: Option<JoinHandle<()>>,
}

impl BitTimer {
    /// Spawn the timer thread.
    pub fn spawn<F>(name: &str, mut callback: F) -> io::Result<Self>
    where
        F: FnMut(Instant) -> Option<Instant> + Send + 'static,
    {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                deadline: None,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new().name(name.into()).spawn(move || {
            let mut state = lock(&thread_shared.state);
            loop {
                if state.shutdown {
                    break;
                }
                let Some(deadline) = state.deadline else {
                    state = thread_shared
                        .cond
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                    continue;
                };

                let now = Instant::now();
                if now < deadline {
                    let (guard, _) = thread_shared
                        .cond
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|e| e.into_inner());
                    state = guard;
                    continue;
                }

                // Fire. The deadline is consumed before the callback runs;
                // a `Stop` decision leaves any deadline armed concurrently
                // by the engine (possible only after `Stop`) untouched.
                state.deadline = None;
                drop(state);
                let next = callback(now);
                state = lock(&thread_shared.state);
                if let Some(next) = next {
                    state.deadline = Some(next);
                }
            }
        })?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Arm the timer for an absolute deadline.
    ///
    /// The caller guarantees the timer is idle (engine-lock discipline).
    pub fn arm(&self, deadline: Instant) {
        lock(&self.shared.state).deadline = Some(deadline);
        self.shared.cond.notify_one();
    }
}

impl Drop for BitTimer {
    fn drop(&mut self) {
        lock(&self.shared.state).shutdown = true;
        self.shared.cond.notify_one();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
