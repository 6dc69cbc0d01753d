//! Byte availability tracking shared with the range server.
//!
//! The manager publishes how far the contiguous prefix of the session file
//! reaches; readers wait on that value without holding any lock and ask the
//! manager to pull missing ranges forward.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::debug;

use super::engine::ByteRange;

/// Errors raised while waiting for bytes to arrive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Timed out after {waited:?} waiting for byte {needed} ({available} available)")]
    Timeout {
        waited: Duration,
        needed: u64,
        available: u64,
    },

    #[error("Session stopped while waiting for data")]
    Cancelled,
}

/// Published availability of the bound file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub contiguous_bytes: u64,
    pub total_size: u64,
    /// Set when the session is torn down; waiters must give up
    pub closed: bool,
}

impl Availability {
    /// True when bytes `[0, end_exclusive)` are on disk.
    pub fn covers(&self, end_exclusive: u64) -> bool {
        end_exclusive <= self.contiguous_bytes
    }
}

/// Read side of the availability channel.
#[derive(Debug, Clone)]
pub struct AvailabilityWatch {
    receiver: watch::Receiver<Availability>,
}

impl AvailabilityWatch {
    /// Publisher and reader pair for a file of `total_size` bytes, starting empty.
    pub fn channel(total_size: u64) -> (watch::Sender<Availability>, Self) {
        let (sender, receiver) = watch::channel(Availability {
            contiguous_bytes: 0,
            total_size,
            closed: false,
        });
        (sender, Self { receiver })
    }

    /// Availability for a file that is already fully on disk.
    pub fn complete(total_size: u64) -> Self {
        let (_sender, receiver) = watch::channel(Availability {
            contiguous_bytes: total_size,
            total_size,
            closed: false,
        });
        Self { receiver }
    }

    pub fn current(&self) -> Availability {
        *self.receiver.borrow()
    }

    /// Waits until bytes `[0, end_exclusive)` are available.
    ///
    /// Re-checks on every published update and gives up at `timeout`.
    ///
    /// # Errors
    /// - `AvailabilityError::Timeout` - The bytes did not arrive in time
    /// - `AvailabilityError::Cancelled` - The session was stopped
    pub async fn wait_for(
        &mut self,
        end_exclusive: u64,
        timeout: Duration,
    ) -> Result<(), AvailabilityError> {
        let deadline = Instant::now() + timeout;

        loop {
            let current = *self.receiver.borrow_and_update();
            if current.closed {
                return Err(AvailabilityError::Cancelled);
            }
            if current.covers(end_exclusive) {
                return Ok(());
            }

            match tokio::time::timeout_at(deadline, self.receiver.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Err(AvailabilityError::Cancelled),
                Err(_) => {
                    return Err(AvailabilityError::Timeout {
                        waited: timeout,
                        needed: end_exclusive,
                        available: current.contiguous_bytes,
                    });
                }
            }
        }
    }
}

/// Non-blocking channel back to the manager for range prioritization.
#[derive(Debug, Clone, Default)]
pub struct PriorityRequester {
    sender: Option<mpsc::Sender<ByteRange>>,
}

impl PriorityRequester {
    pub fn new(sender: mpsc::Sender<ByteRange>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Requester for bindings with nothing left to download.
    pub fn none() -> Self {
        Self { sender: None }
    }

    /// Asks for `range` to be downloaded first. Dropped when the queue is full.
    pub fn request(&self, range: ByteRange) {
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.try_send(range) {
                debug!("Dropping prioritization request {:?}: {}", range, e);
            }
        }
    }
}

/// Read-only view of the session file handed to the range server.
#[derive(Debug, Clone)]
pub struct FileBinding {
    pub path: PathBuf,
    pub total_size: u64,
    pub availability: AvailabilityWatch,
    pub priorities: PriorityRequester,
}

impl FileBinding {
    /// Binding for a file that is already complete on disk.
    pub fn complete(path: PathBuf, total_size: u64) -> Self {
        Self {
            path,
            total_size,
            availability: AvailabilityWatch::complete(total_size),
            priorities: PriorityRequester::none(),
        }
    }

    /// Waits until every byte of `range` is available, requesting it first
    /// if it is missing.
    ///
    /// # Errors
    /// - `AvailabilityError::Timeout` - The bytes did not arrive in time
    /// - `AvailabilityError::Cancelled` - The session was stopped
    pub async fn wait_for_range(
        &self,
        range: ByteRange,
        timeout: Duration,
    ) -> Result<(), AvailabilityError> {
        let needed = range.end.saturating_add(1);
        let mut watch = self.availability.clone();

        let current = watch.current();
        if current.closed {
            return Err(AvailabilityError::Cancelled);
        }
        if current.covers(needed) {
            return Ok(());
        }

        debug!(
            "Range {}-{} not yet available ({} bytes on disk), waiting",
            range.start, range.end, current.contiguous_bytes
        );
        self.priorities.request(range);
        watch.wait_for(needed, timeout).await
    }
}

/// Receiver of the session file, implemented by the range server.
pub trait StreamBinder: Send + Sync {
    /// Replaces any existing binding.
    fn bind(&self, binding: FileBinding);

    fn unbind(&self);
}

/// Binder that discards bindings, for managers running without a server.
#[derive(Debug, Default)]
pub struct DetachedBinder;

impl StreamBinder for DetachedBinder {
    fn bind(&self, _binding: FileBinding) {}

    fn unbind(&self) {}
}

impl<T: StreamBinder + ?Sized> StreamBinder for Arc<T> {
    fn bind(&self, binding: FileBinding) {
        (**self).bind(binding)
    }

    fn unbind(&self) {
        (**self).unbind()
    }
}
