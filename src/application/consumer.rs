use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use crate::domain::entities::Record;
use crate::domain::errors::{BrokerError, Result};
use crate::domain::value_objects::{Offset, PartitionId, TopicName};
use crate::infrastructure::metrics::Metrics;

use super::broker::Broker;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Read cursor over one topic with manual commit
///
/// Tracks a next-to-read offset per partition. Reads may lag the
/// producer: a record handed to the writer is only visible once the
/// background append completes.
pub struct Consumer<'a> {
    broker: &'a Broker,
    topic: TopicName,
    offsets: Mutex<HashMap<PartitionId, Offset>>,
}

impl<'a> Consumer<'a> {
    pub fn new(broker: &'a Broker, topic: impl Into<TopicName>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            offsets: Mutex::new(HashMap::new()),
        }
    }

    /// Return the record at the current cursor and advance by one
    pub fn poll(&self, partition_id: PartitionId) -> Result<Record> {
        let mut offsets = self.offsets.lock();
        let current = offsets.get(&partition_id).copied().unwrap_or_default();

        let records =
            self.broker
                .get_messages(self.topic.clone(), partition_id, current, current.next())?;

        match records.into_iter().next() {
            Some(record) => {
                offsets.insert(partition_id, current.next());
                Metrics::global().increment_received();
                Ok(record)
            }
            None => Err(BrokerError::NoMessage),
        }
    }

    /// Block until a record is visible at the current cursor
    ///
    /// Polls the broker every 100 ms rather than subscribing.
    pub fn wait_for_message(&self, partition_id: PartitionId) -> Result<()> {
        loop {
            let current = self.position(partition_id);
            let records = self.broker.get_messages(
                self.topic.clone(),
                partition_id,
                current,
                current.next(),
            )?;
            if !records.is_empty() {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Overwrite the cursor for a partition
    pub fn commit(&self, partition_id: PartitionId, offset: Offset) {
        self.offsets.lock().insert(partition_id, offset);
    }

    /// Current cursor for a partition, 0 when never read
    pub fn position(&self, partition_id: PartitionId) -> Offset {
        self.offsets
            .lock()
            .get(&partition_id)
            .copied()
            .unwrap_or_default()
    }

    /// Move the cursor back to the beginning
    pub fn reset(&self, partition_id: PartitionId) {
        self.offsets.lock().insert(partition_id, Offset::new(0));
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }
}
