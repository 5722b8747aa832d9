//! Pending results of background operations

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{Error, Result};

/// Result of an operation running on a background thread
///
/// Resolves exactly once. If the worker ends without sending (it panicked or
/// could not be started) the result is `Error::Abandoned`.
#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<Result<T>>,
}

impl<T: Send + 'static> Pending<T> {
    /// Run `job` on a new thread
    pub(crate) fn spawn<F>(job: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (tx, rx) = channel::bounded(1);
        let spawned = std::thread::Builder::new()
            .name("renode-async".to_string())
            .spawn(move || {
                // Receiver may have been dropped; the result is then unwanted
                let _ = tx.send(job());
            });
        if let Err(e) = spawned {
            tracing::warn!("Failed to start background operation: {}", e);
        }
        Self { rx }
    }

    /// Block until the result is available
    pub fn wait(self) -> Result<T> {
        self.rx.recv().unwrap_or(Err(Error::Abandoned))
    }

    /// Block up to `timeout`; gives the pending result back if it expires
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(Error::Abandoned)),
        }
    }

    /// Take the result if it is ready
    pub fn try_wait(self) -> std::result::Result<Result<T>, Self> {
        match self.rx.try_recv() {
            Ok(result) => Ok(result),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Disconnected) => Ok(Err(Error::Abandoned)),
        }
    }

    /// Whether `wait` would return without blocking
    pub fn is_ready(&self) -> bool {
        !self.rx.is_empty()
    }
}
