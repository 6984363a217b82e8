use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::domain::entities::Record;
use crate::domain::errors::{BrokerError, Result};

/// Staging queue for records awaiting the background writer
///
/// A FIFO with blocking pops and a shutdown signal. Capacity is
/// unbounded; producers are never backpressured.
#[derive(Debug, Default)]
pub struct Inbox {
    queue: Mutex<VecDeque<Record>>,
    available: Condvar,
    shutdown: AtomicBool,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a record and wake one waiter
    ///
    /// After shutdown the record is dropped silently; returns whether
    /// the record was accepted.
    pub fn push(&self, record: Record) -> bool {
        let mut queue = self.queue.lock();
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        queue.push_back(record);
        self.available.notify_one();
        true
    }

    /// Block until a record is available or the inbox shuts down
    pub fn pop(&self) -> Result<Record> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(record) = queue.pop_front() {
                return Ok(record);
            }
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(BrokerError::Closed);
            }
            self.available.wait(&mut queue);
        }
    }

    /// Wait up to `timeout` for a record
    ///
    /// Returns `None` on timeout or when the inbox was shut down with an
    /// empty queue. Records still queued at shutdown are returned.
    pub fn try_pop(&self, timeout: Duration) -> Option<Record> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        loop {
            if let Some(record) = queue.pop_front() {
                return Some(record);
            }
            if self.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            if self
                .available
                .wait_until(&mut queue, deadline)
                .timed_out()
            {
                return queue.pop_front();
            }
        }
    }

    pub fn size(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Set the shutdown flag and wake every waiter
    ///
    /// Once this returns, no `pop` or `try_pop` blocks indefinitely.
    pub fn shutdown(&self) {
        let _queue = self.queue.lock();
        self.shutdown.store(true, Ordering::SeqCst);
        self.available.notify_all();
    }
}
