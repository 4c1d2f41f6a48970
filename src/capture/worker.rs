//! Dedicated OS thread running the capture loop, with a wake-up channel so
//! a pending pacing wait can be cut short when acquisition stops.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::error::{AdaptorError, Result};

/// Receiving end of the stop signal, owned by the worker body.
pub struct StopSignal {
    rx: Receiver<()>,
}

impl StopSignal {
    /// A signal nobody can raise; [`pace`](Self::pace) always waits the full
    /// interval.
    pub fn detached() -> Self {
        let (_tx, rx) = channel::bounded(1);
        Self { rx }
    }

    /// Wait for `interval` or until the stop signal is raised.
    ///
    /// Returns `true` when woken early.
    pub fn pace(&self, interval: Duration) -> bool {
        if interval.is_zero() {
            return self.rx.try_recv().is_ok();
        }
        match self.rx.recv_timeout(interval) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(interval);
                false
            }
        }
    }
}

/// Handle to a running capture worker.
pub struct CaptureTask {
    handle: JoinHandle<()>,
    wake: Sender<()>,
}

impl CaptureTask {
    /// Spawn `body` on a named thread.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let (wake, rx) = channel::bounded(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(StopSignal { rx }))
            .map_err(AdaptorError::WorkerSpawn)?;

        debug!(worker = name, "capture worker spawned");
        Ok(Self { handle, wake })
    }

    /// Interrupt a pacing wait in progress. The worker still exits only once
    /// it observes the cleared acquisition flag.
    pub fn signal_stop(&self) {
        let _ = self.wake.try_send(());
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the worker has returned.
    pub fn join(self) -> Result<()> {
        self.handle.join().map_err(|_| AdaptorError::WorkerPanicked)
    }
}
