use bytes::Bytes;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::entities::{Partition, Record, Topic};
use crate::domain::errors::{BrokerError, Result};
use crate::domain::retention::RetentionPolicy;
use crate::domain::value_objects::{Offset, PartitionId, TopicName};
use crate::infrastructure::async_writer::AsyncWriter;
use crate::infrastructure::metrics::Metrics;
use crate::infrastructure::registry::TopicRegistry;
use crate::infrastructure::retention_cleaner::RetentionCleaner;

use super::dto::{PartitionMetadata, TopicMetadata};

/// Entry point for ingress and egress over an in-process set of topics
///
/// Owns the topic registry and the two background tasks. The tasks are
/// constructed here but only started explicitly; dropping the broker
/// stops and joins both before the topics go away.
pub struct Broker {
    id: String,
    registry: Arc<TopicRegistry>,
    writer: AsyncWriter,
    cleaner: RetentionCleaner,
    default_retention: RetentionPolicy,
}

impl Broker {
    pub fn new(id: impl Into<String>) -> Self {
        let registry = Arc::new(TopicRegistry::new());
        Self {
            id: id.into(),
            writer: AsyncWriter::new(Arc::clone(&registry)),
            cleaner: RetentionCleaner::new(),
            registry,
            default_retention: RetentionPolicy::default(),
        }
    }

    /// Create a broker with a random id
    pub fn with_random_id() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Create a topic with a fixed number of partitions
    ///
    /// Every new partition is registered with the retention cleaner
    /// under the broker's default policy.
    pub fn create_topic(&self, name: impl Into<TopicName>, num_partitions: u32) -> Result<()> {
        let name = name.into();
        let topic = self.registry.create(name.clone(), num_partitions)?;
        for partition in topic.partitions() {
            self.cleaner
                .add_partition(Arc::clone(partition), self.default_retention);
        }
        info!("created topic {name} with {num_partitions} partitions");
        Ok(())
    }

    pub fn has_topic(&self, name: impl Into<TopicName>) -> bool {
        self.registry.contains(&name.into())
    }

    /// Snapshot of topic names, in no particular order
    pub fn list_topics(&self) -> Vec<TopicName> {
        self.registry.names()
    }

    /// Non-blocking ingest: stamp a record now and hand it to the writer
    pub fn send(
        &self,
        topic: impl Into<TopicName>,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<()> {
        self.append(topic, Record::new(key, value))
    }

    /// Non-blocking ingest of a caller-constructed record
    pub fn append(&self, topic: impl Into<TopicName>, record: Record) -> Result<()> {
        let topic = topic.into();
        if !self.registry.contains(&topic) {
            return Err(BrokerError::UnknownTopic(topic));
        }
        Metrics::global().increment_sent();
        self.writer.enqueue(&topic, record);
        Ok(())
    }

    /// Synchronous append under the broker lock; the writer thread's path
    pub fn append_sync(
        &self,
        topic: impl Into<TopicName>,
        record: Record,
    ) -> Result<(PartitionId, Offset)> {
        self.registry.append_sync(&topic.into(), record)
    }

    /// Records with offsets in `[from, to)` from one partition
    pub fn get_messages(
        &self,
        topic: impl Into<TopicName>,
        partition_id: PartitionId,
        from: Offset,
        to: Offset,
    ) -> Result<Vec<Record>> {
        let topic = self.registry.get(&topic.into())?;
        topic.partition(partition_id)?.get_range(from, to)
    }

    pub fn start_async_writer(&self) {
        self.writer.start();
    }

    /// Stop and join the writer; queued records may be dropped
    pub fn stop_async_writer(&self) {
        self.writer.stop();
        self.writer.join();
    }

    pub fn start_retention_cleaner(&self) {
        self.cleaner.start();
    }

    pub fn stop_retention_cleaner(&self) {
        self.cleaner.stop();
        self.cleaner.join();
    }

    pub fn is_async_writer_running(&self) -> bool {
        self.writer.is_running()
    }

    pub fn is_retention_cleaner_running(&self) -> bool {
        self.cleaner.is_running()
    }

    /// Depth of the writer inbox for a topic
    pub fn get_async_queue_size(&self, topic: impl Into<TopicName>) -> usize {
        self.writer.queue_size(&topic.into())
    }

    pub fn get_total_processed_messages(&self) -> u64 {
        self.writer.total_processed()
    }

    pub fn get_total_cleaned_messages(&self) -> u64 {
        self.cleaner.total_cleaned_messages()
    }

    pub fn get_total_cleaned_bytes(&self) -> u64 {
        self.cleaner.total_cleaned_bytes()
    }

    /// Replace the retention policy for every partition of a topic
    pub fn set_retention_policy(
        &self,
        topic: impl Into<TopicName>,
        policy: RetentionPolicy,
    ) -> Result<()> {
        let topic = self.registry.get(&topic.into())?;
        for partition in topic.partitions() {
            self.cleaner.update_policy(partition, policy);
        }
        Ok(())
    }

    pub fn set_cleanup_interval(&self, interval: Duration) {
        self.cleaner.set_cleanup_interval(interval);
    }

    /// Metadata for every registered topic
    pub fn get_topics_metadata(&self) -> Vec<TopicMetadata> {
        self.registry
            .all()
            .iter()
            .map(|topic| Self::topic_metadata(topic))
            .collect()
    }

    /// Per-partition counts for one topic
    pub fn get_partition_metadata(
        &self,
        topic: impl Into<TopicName>,
    ) -> Result<Vec<PartitionMetadata>> {
        let topic = self.registry.get(&topic.into())?;
        Ok(topic
            .partitions()
            .iter()
            .map(|partition| Self::partition_metadata(partition))
            .collect())
    }

    fn topic_metadata(topic: &Topic) -> TopicMetadata {
        let partitions: Vec<PartitionMetadata> = topic
            .partitions()
            .iter()
            .map(|partition| Self::partition_metadata(partition))
            .collect();
        let total_messages = partitions.iter().map(|p| p.message_count).sum();
        TopicMetadata {
            name: topic.name().to_string(),
            num_partitions: topic.num_partitions(),
            partitions,
            total_messages,
        }
    }

    fn partition_metadata(partition: &Partition) -> PartitionMetadata {
        let message_count = partition.size();
        PartitionMetadata {
            id: partition.id().value(),
            message_count,
            first_offset: 0,
            // 0 doubles as the empty sentinel
            last_offset: message_count.saturating_sub(1),
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.stop_async_writer();
        self.stop_retention_cleaner();
    }
}
