use log::{error, info};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::domain::entities::Partition;
use crate::domain::errors::Result;
use crate::domain::retention::RetentionPolicy;

const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);
/// Pause after a failed sweep before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Background task that periodically evaluates retention over tracked
/// partitions
///
/// The sweep reports what a destructive cleanup would remove and feeds
/// the cleaned counters; partitions are never mutated, which keeps
/// offsets dense.
#[derive(Debug)]
pub struct RetentionCleaner {
    state: Arc<CleanerState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct CleanerState {
    partitions: Mutex<Vec<TrackedPartition>>,
    running: AtomicBool,
    interval: Mutex<Duration>,
    total_cleaned_messages: AtomicU64,
    total_cleaned_bytes: AtomicU64,
    parked: Mutex<()>,
    wake: Condvar,
}

#[derive(Debug, Clone)]
struct TrackedPartition {
    partition: Arc<Partition>,
    policy: RetentionPolicy,
}

impl RetentionCleaner {
    pub fn new() -> Self {
        Self {
            state: Arc::new(CleanerState {
                partitions: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                interval: Mutex::new(DEFAULT_CLEANUP_INTERVAL),
                total_cleaned_messages: AtomicU64::new(0),
                total_cleaned_bytes: AtomicU64::new(0),
                parked: Mutex::new(()),
                wake: Condvar::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Start the cleanup thread; no-op when already running
    pub fn start(&self) {
        if self.state.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let state = Arc::clone(&self.state);
        *self.handle.lock() = Some(thread::spawn(move || state.run()));
        info!("retention cleaner started");
    }

    /// Flip the running flag and wake the interval wait
    pub fn stop(&self) {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let _parked = self.state.parked.lock();
        self.state.wake.notify_all();
        info!("retention cleaner stopping");
    }

    /// Wait for the cleanup thread to exit
    pub fn join(&self) {
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
            info!("retention cleaner stopped");
        }
    }

    /// Track a partition under the given policy
    pub fn add_partition(&self, partition: Arc<Partition>, policy: RetentionPolicy) {
        info!("tracking partition {} with {policy}", partition.id());
        self.state
            .partitions
            .lock()
            .push(TrackedPartition { partition, policy });
    }

    /// Stop tracking a partition; identity is by handle, not by id
    pub fn remove_partition(&self, partition: &Arc<Partition>) {
        self.state
            .partitions
            .lock()
            .retain(|tracked| !Arc::ptr_eq(&tracked.partition, partition));
    }

    /// Replace the policy of a tracked partition
    pub fn update_policy(&self, partition: &Arc<Partition>, policy: RetentionPolicy) {
        let mut partitions = self.state.partitions.lock();
        for tracked in partitions.iter_mut() {
            if Arc::ptr_eq(&tracked.partition, partition) {
                tracked.policy = policy;
            }
        }
    }

    pub fn set_cleanup_interval(&self, interval: Duration) {
        *self.state.interval.lock() = interval;
    }

    pub fn cleanup_interval(&self) -> Duration {
        *self.state.interval.lock()
    }

    pub fn total_cleaned_messages(&self) -> u64 {
        self.state.total_cleaned_messages.load(Ordering::SeqCst)
    }

    pub fn total_cleaned_bytes(&self) -> u64 {
        self.state.total_cleaned_bytes.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }
}

impl Default for RetentionCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RetentionCleaner {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

impl CleanerState {
    fn run(&self) {
        info!("retention cleaner thread started");

        while self.running.load(Ordering::SeqCst) {
            match self.sweep() {
                Ok(()) => self.park(*self.interval.lock()),
                Err(err) => {
                    error!("retention sweep failed: {err}");
                    self.park(ERROR_BACKOFF);
                }
            }
        }

        info!("retention cleaner thread finished");
    }

    fn sweep(&self) -> Result<()> {
        let tracked = self.partitions.lock().clone();
        for entry in &tracked {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.clean_partition(&entry.partition, &entry.policy)?;
        }
        Ok(())
    }

    /// Walk one partition in offset order, counting records that fall
    /// outside the policy
    fn clean_partition(&self, partition: &Partition, policy: &RetentionPolicy) -> Result<()> {
        let records = partition.all_records()?;
        if records.is_empty() {
            return Ok(());
        }

        let mut cumulative_size = 0u64;
        let mut cleaned_count = 0u64;
        let mut cleaned_bytes = 0u64;
        for record in &records {
            let size = record.estimated_size();
            cumulative_size += size;
            if !policy.should_retain(record.timestamp, cumulative_size) {
                cleaned_count += 1;
                cleaned_bytes += size;
            }
        }

        if cleaned_count > 0 {
            info!(
                "partition {}: {cleaned_count} records ({cleaned_bytes} bytes) past retention",
                partition.id()
            );
            self.total_cleaned_messages
                .fetch_add(cleaned_count, Ordering::SeqCst);
            self.total_cleaned_bytes
                .fetch_add(cleaned_bytes, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Interruptible sleep: `stop()` wakes it immediately
    fn park(&self, timeout: Duration) {
        let mut parked = self.parked.lock();
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.wake.wait_for(&mut parked, timeout);
    }
}
