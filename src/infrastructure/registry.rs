use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::entities::{Record, Topic};
use crate::domain::errors::{BrokerError, Result};
use crate::domain::value_objects::{Offset, PartitionId, TopicName};

use super::metrics::Metrics;

/// Registry of topics by name
///
/// Its mutex is the broker-wide lock: it guards topic membership and is
/// held for the duration of every synchronous append. It is never held
/// while waiting on a background task.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: Mutex<HashMap<TopicName, Arc<Topic>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a topic
    pub fn create(&self, name: TopicName, num_partitions: u32) -> Result<Arc<Topic>> {
        let mut topics = self.topics.lock();
        if topics.contains_key(&name) {
            return Err(BrokerError::TopicAlreadyExists(name));
        }

        let topic = Arc::new(Topic::new(name.clone(), num_partitions));
        topics.insert(name, Arc::clone(&topic));
        Ok(topic)
    }

    pub fn get(&self, name: &TopicName) -> Result<Arc<Topic>> {
        self.topics
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownTopic(name.clone()))
    }

    pub fn contains(&self, name: &TopicName) -> bool {
        self.topics.lock().contains_key(name)
    }

    /// Snapshot of registered topic names, in no particular order
    pub fn names(&self) -> Vec<TopicName> {
        self.topics.lock().keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<Arc<Topic>> {
        self.topics.lock().values().cloned().collect()
    }

    /// Route a record into the named topic under the registry lock
    ///
    /// Records the append latency and the processed counter. This is the
    /// writer thread's path into the log.
    pub fn append_sync(&self, name: &TopicName, record: Record) -> Result<(PartitionId, Offset)> {
        let topics = self.topics.lock();
        let topic = topics
            .get(name)
            .ok_or_else(|| BrokerError::UnknownTopic(name.clone()))?;

        let started = Instant::now();
        let routed = topic.append(record);
        Metrics::global().record_processing_time(name, started.elapsed());
        Metrics::global().increment_processed();
        Ok(routed)
    }
}
