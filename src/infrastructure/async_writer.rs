use log::{error, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::domain::entities::Record;
use crate::domain::value_objects::TopicName;

use super::inbox::Inbox;
use super::metrics::Metrics;
use super::registry::TopicRegistry;

/// How long one drain pass waits on a single inbox.
const POP_TIMEOUT: Duration = Duration::from_millis(100);
/// Pause between drain passes that processed nothing.
const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Background task draining per-topic inboxes into synchronous appends
///
/// A single writer thread walks every inbox per pass, so the relative
/// order of appends across topics is unspecified while each topic's
/// enqueue-to-append pipeline stays FIFO.
#[derive(Debug)]
pub struct AsyncWriter {
    state: Arc<WriterState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct WriterState {
    registry: Arc<TopicRegistry>,
    inboxes: Mutex<HashMap<TopicName, Arc<Inbox>>>,
    running: AtomicBool,
    total_processed: AtomicU64,
}

impl AsyncWriter {
    pub(crate) fn new(registry: Arc<TopicRegistry>) -> Self {
        Self {
            state: Arc::new(WriterState {
                registry,
                inboxes: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                total_processed: AtomicU64::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Start the writer thread; no-op when already running
    pub fn start(&self) {
        if self.state.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let state = Arc::clone(&self.state);
        *self.handle.lock() = Some(thread::spawn(move || state.run()));
        info!("async writer started");
    }

    /// Flip the running flag and shut down every inbox
    ///
    /// Non-blocking. Records still queued are not drained and stay in
    /// their shut-down inboxes.
    pub fn stop(&self) {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let inboxes = self.state.inboxes.lock();
        for inbox in inboxes.values() {
            inbox.shutdown();
        }
        info!("async writer stopping");
    }

    /// Wait for the writer thread to exit
    pub fn join(&self) {
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
            info!("async writer stopped");
        }
    }

    /// Hand a record to the topic's inbox, creating it on first use
    pub fn enqueue(&self, topic: &TopicName, record: Record) {
        let inbox = self.inbox(topic);
        if !inbox.push(record) {
            Metrics::global().increment_dropped();
            return;
        }
        Metrics::global().update_queue_size(topic, inbox.size());
    }

    /// Current inbox depth for a topic, 0 when the topic has no inbox
    pub fn queue_size(&self, topic: &TopicName) -> usize {
        self.state
            .inboxes
            .lock()
            .get(topic)
            .map(|inbox| inbox.size())
            .unwrap_or(0)
    }

    /// Number of records successfully appended by the writer thread
    pub fn total_processed(&self) -> u64 {
        self.state.total_processed.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    fn inbox(&self, topic: &TopicName) -> Arc<Inbox> {
        let mut inboxes = self.state.inboxes.lock();
        Arc::clone(inboxes.entry(topic.clone()).or_default())
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

impl WriterState {
    fn run(&self) {
        info!("async writer thread started");

        while self.running.load(Ordering::SeqCst) {
            let mut processed_any = false;
            {
                // Holding the map lock for the whole pass serializes
                // enqueue against drain.
                let inboxes = self.inboxes.lock();
                for (topic, inbox) in inboxes.iter() {
                    let Some(record) = inbox.try_pop(POP_TIMEOUT) else {
                        continue;
                    };
                    match self.registry.append_sync(topic, record) {
                        Ok(_) => {
                            self.total_processed.fetch_add(1, Ordering::SeqCst);
                            processed_any = true;
                            Metrics::global().update_queue_size(topic, inbox.size());
                        }
                        Err(err) => {
                            error!("failed to write record to topic {topic}: {err}");
                        }
                    }
                }
            }

            if !processed_any {
                thread::sleep(IDLE_SLEEP);
            }
        }

        info!("async writer thread finished");
    }
}
