//! Kicked deferred-work thread.
//!
//! The timing-critical contexts never copy buffers, call consumer code, or
//! wake sleepers; they kick one of these instead. A kick is a wait-free
//! `try_send` on a bounded(1) channel, so bursts coalesce into a single
//! run and the kicker can never block or allocate.

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Sender};

/// Wait-free signaling handle for a [`DeferredTask`].
///
/// Safe to use from timer-callback context.
#[derive(Clone)]
pub(crate) struct Kicker(Sender<()>);

impl Kicker {
    /// Request a run. Coalesces with an already-pending kick.
    #[inline]
    pub fn kick(&self) {
        let _ = self.0.try_send(());
    }
}

/// A worker thread that runs its job once per kick.
///
/// The job runs outside every engine lock and is allowed to block, copy,
/// and call consumer callbacks. Dropping the task stops and joins the
/// thread synchronously.
pub(crate) struct DeferredTask {
    kick_tx: Sender<()>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeferredTask {
    /// Spawn the worker thread.
    pub fn spawn<F>(name: &str, mut job: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (kick_tx, kick_rx) = bounded::<()>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = thread::Builder::new().name(name.into()).spawn(move || loop {
            select! {
                recv(kick_rx) -> msg => match msg {
                    Ok(()) => job(),
                    Err(_) => break,
                },
                recv(stop_rx) -> _ => break,
            }
        })?;

        Ok(Self {
            kick_tx,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// A clonable kick handle for the timer contexts.
    pub fn kicker(&self) -> Kicker {
        Kicker(self.kick_tx.clone())
    }
}

impl Drop for DeferredTask {
    fn drop(&mut self) {
        // Closing the stop channel ends the select loop even while kicker
        // clones are still alive elsewhere.
        drop(self.stop_tx.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
