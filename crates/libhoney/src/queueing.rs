// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A bounded multi-producer multi-consumer queue whose push and pop
//! operations support timeouts.
//!
//! The transmission pipeline uses this primitive twice (event intake and
//! batch hand-off) and once more for the caller-facing response queue.
//! Shutdown is signalled in-band: queues carry `Option<T>` and a `None`
//! item means "no more work" to consuming loops.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How long a queue operation is willing to block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Block until the operation can complete.
    Forever,
    /// Attempt the operation once and fail fast if it would block.
    NoWait,
    /// Block for at most this long.
    For(Duration),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("timed out waiting for space on the queue")]
    PushTimedOut,

    #[error("timed out waiting for an item on the queue")]
    PopTimedOut,
}

/// A fixed-capacity queue guarded by one mutex and two condition
/// variables: one signalled when space frees up, one when an item lands.
pub struct SizedQueueWithTimeout<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    space_available: Condvar,
    item_available: Condvar,
}

impl<T> SizedQueueWithTimeout<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            space_available: Condvar::new(),
            item_available: Condvar::new(),
        }
    }

    /// Pushes an item, waiting up to `wait` for space to become
    /// available. Fails with [`QueueError::PushTimedOut`] when the queue
    /// stayed full for the whole wait, which lets callers tell
    /// backpressure apart from any other failure.
    pub fn push(&self, item: T, wait: Wait) -> Result<(), QueueError> {
        let deadline = deadline_for(wait);
        let mut items = self.lock_items();

        while items.len() >= self.capacity {
            items = match wait {
                Wait::NoWait => return Err(QueueError::PushTimedOut),
                Wait::Forever => self.wait(&self.space_available, items),
                Wait::For(_) => match self.wait_until(&self.space_available, items, deadline) {
                    Some(guard) => guard,
                    None => return Err(QueueError::PushTimedOut),
                },
            };
        }

        items.push_back(item);
        self.item_available.notify_one();
        Ok(())
    }

    /// Pops the oldest item, waiting up to `wait` for one to arrive.
    /// Fails with [`QueueError::PopTimedOut`] on expiry; callers that
    /// prefer a default over an error can chain `unwrap_or_else` on the
    /// result.
    pub fn pop(&self, wait: Wait) -> Result<T, QueueError> {
        let deadline = deadline_for(wait);
        let mut items = self.lock_items();

        while items.is_empty() {
            items = match wait {
                Wait::NoWait => return Err(QueueError::PopTimedOut),
                Wait::Forever => self.wait(&self.item_available, items),
                Wait::For(_) => match self.wait_until(&self.item_available, items, deadline) {
                    Some(guard) => guard,
                    None => return Err(QueueError::PopTimedOut),
                },
            };
        }

        let item = items.pop_front().expect("queue checked non-empty");
        self.space_available.notify_one();
        Ok(item)
    }

    /// Atomically empties the queue, returning whatever was buffered and
    /// waking every producer blocked on space. Used for the hard
    /// (non-draining) shutdown path.
    pub fn clear(&self) -> Vec<T> {
        let mut items = self.lock_items();
        let drained = items.drain(..).collect();
        self.space_available.notify_all();
        drained
    }

    /// Point-in-time check; the answer can be stale by the time the
    /// caller acts on it.
    pub fn is_full(&self) -> bool {
        self.lock_items().len() >= self.capacity
    }

    /// Point-in-time check; the answer can be stale by the time the
    /// caller acts on it.
    pub fn is_empty(&self) -> bool {
        self.lock_items().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    fn lock_items(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A poisoning panic in one producer must not wedge the rest of
        // the pipeline; the queue contents stay structurally valid.
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait<'a>(
        &self,
        condvar: &Condvar,
        guard: MutexGuard<'a, VecDeque<T>>,
    ) -> MutexGuard<'a, VecDeque<T>> {
        condvar
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Waits on `condvar` until `deadline`, tolerating spurious wakeups.
    /// Returns `None` once the deadline has passed.
    fn wait_until<'a>(
        &self,
        condvar: &Condvar,
        guard: MutexGuard<'a, VecDeque<T>>,
        deadline: Option<Instant>,
    ) -> Option<MutexGuard<'a, VecDeque<T>>> {
        let deadline = deadline.expect("Wait::For always carries a deadline");
        let now = Instant::now();
        if now >= deadline {
            return None;
        }

        let (guard, _timed_out) = condvar
            .wait_timeout(guard, deadline - now)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // The caller re-checks its predicate; a timeout that raced an
        // arriving item still counts as a wakeup.
        Some(guard)
    }
}

fn deadline_for(wait: Wait) -> Option<Instant> {
    match wait {
        Wait::For(timeout) => Some(Instant::now() + timeout),
        Wait::Forever | Wait::NoWait => None,
    }
}
