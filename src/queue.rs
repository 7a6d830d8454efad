//! Fixed-capacity FIFO channels between sensing tasks and aggregators.
//!
//! Two policies are used on the device:
//! - [`bounded_queue`]: block-until-space. The producer waits while the queue is
//!   full, so nothing it produced is ever lost.
//! - [`mailbox`]: a single slot where only the latest value matters. Pushing into
//!   a full mailbox evicts the unread value and never blocks the producer.
//!
//! Receivers block indefinitely. A receive returns `None` only once every
//! sender is gone, which is how task loops learn their upstream has stopped.

use crossbeam_channel::{bounded, Receiver, SendError, Sender, TrySendError};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// The other side of a queue has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl std::fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("queue closed")
    }
}

impl std::error::Error for QueueClosed {}

/// Create a block-until-space queue holding at most `capacity` values.
pub fn bounded_queue<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = bounded(capacity.max(1));
    (QueueSender { inner: tx }, QueueReceiver { inner: rx })
}

/// Create a capacity-1 latest-value-wins mailbox.
pub fn mailbox<T>() -> (MailboxSender<T>, QueueReceiver<T>) {
    let (tx, rx) = bounded(1);
    let sender = MailboxSender {
        inner: tx,
        evict: rx.clone(),
        superseded: Arc::new(AtomicUsize::new(0)),
    };
    (sender, QueueReceiver { inner: rx })
}

/// Producer half of a block-until-space queue.
#[derive(Debug)]
pub struct QueueSender<T> {
    inner: Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Push `value`, waiting for a free slot if the queue is full.
    pub fn push(&self, value: T) -> Result<(), QueueClosed> {
        self.inner.send(value).map_err(|SendError(_)| QueueClosed)
    }

    /// Push without waiting. Returns the value back when the queue is full.
    pub fn try_push(&self, value: T) -> Result<(), TryPushError<T>> {
        self.inner.try_send(value).map_err(|err| match err {
            TrySendError::Full(value) => TryPushError::Full(value),
            TrySendError::Disconnected(_) => TryPushError::Closed,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TryPushError<T> {
    Full(T),
    Closed,
}

/// Producer half of a latest-value-wins mailbox.
#[derive(Debug)]
pub struct MailboxSender<T> {
    inner: Sender<T>,
    evict: Receiver<T>,
    superseded: Arc<AtomicUsize>,
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            evict: self.evict.clone(),
            superseded: self.superseded.clone(),
        }
    }
}

impl<T> MailboxSender<T> {
    /// Store `value` as the latest, discarding any value the consumer has not
    /// read yet. Never blocks.
    pub fn push(&self, value: T) -> Result<(), QueueClosed> {
        let mut pending = value;
        loop {
            match self.inner.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(value)) => {
                    // The consumer may win the race for the stale value; either way
                    // the slot frees up and the retry succeeds.
                    if self.evict.try_recv().is_ok() {
                        self.superseded.fetch_add(1, Ordering::Relaxed);
                    }
                    pending = value;
                }
                Err(TrySendError::Disconnected(_)) => return Err(QueueClosed),
            }
        }
    }

    /// Number of values overwritten before anyone read them.
    pub fn superseded(&self) -> usize {
        self.superseded.load(Ordering::Relaxed)
    }
}

/// Consumer half shared by both queue policies.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    inner: Receiver<T>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Wait forever for the next value. `None` once all producers are gone and
    /// the queue has been drained.
    pub fn recv(&self) -> Option<T> {
        self.inner.recv().ok()
    }

    pub fn try_recv(&self) -> Option<T> {
        self.inner.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Underlying channel, for `crossbeam_channel::Select` in multi-queue consumers.
    pub(crate) fn channel(&self) -> &Receiver<T> {
        &self.inner
    }
}
