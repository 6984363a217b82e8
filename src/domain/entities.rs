use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::errors::{BrokerError, Result};
use super::value_objects::*;

/// Fixed per-record accounting overhead on top of the payload bytes.
const RECORD_OVERHEAD_BYTES: u64 = 64;

/// The immutable unit of data that flows through the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
    pub timestamp: DateTime<Utc>,
    pub offset: Option<Offset>,
}

impl Record {
    /// Create a new record stamped with the current wall-clock time
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self::with_timestamp(key, value, Utc::now())
    }

    /// Create a record with an explicit creation time
    pub fn with_timestamp(
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp,
            offset: None,
        }
    }

    /// Estimated in-memory size of the record in bytes
    pub fn estimated_size(&self) -> u64 {
        (self.key.len() + self.value.len()) as u64 + RECORD_OVERHEAD_BYTES
    }
}

/// An append-only, ordered sequence of records within a topic
///
/// Offsets are dense: the record stored at index `i` always carries
/// offset `i`, and a length that disagrees with the offset counter is
/// treated as corruption.
#[derive(Debug)]
pub struct Partition {
    id: PartitionId,
    records: Mutex<Vec<Record>>,
    next_offset: AtomicU64,
    appended: Condvar,
}

impl Partition {
    /// Create a new empty partition
    pub fn new(id: PartitionId) -> Self {
        Self {
            id,
            records: Mutex::new(Vec::new()),
            next_offset: AtomicU64::new(0),
            appended: Condvar::new(),
        }
    }

    /// Append a record, assigning it the next offset
    ///
    /// The offset is allocated while the records lock is held, so the
    /// index of a record in the log always equals its offset even under
    /// contention. The record's creation timestamp is preserved.
    pub fn append(&self, record: Record) -> Offset {
        let mut records = self.records.lock();
        let offset = Offset::new(self.next_offset.fetch_add(1, Ordering::SeqCst));
        records.push(Record {
            offset: Some(offset),
            ..record
        });
        self.appended.notify_all();
        offset
    }

    /// Block until a record exists at `offset`
    pub fn wait_for(&self, offset: Offset) {
        let mut records = self.records.lock();
        while self.next_offset.load(Ordering::SeqCst) <= offset.value() {
            self.appended.wait(&mut records);
        }
    }

    /// Get the record at a specific offset
    pub fn get(&self, offset: Offset) -> Result<Record> {
        let records = self.records.lock();
        self.check_consistency(&records)?;

        records
            .get(offset.value() as usize)
            .cloned()
            .ok_or(BrokerError::OffsetOutOfRange(offset))
    }

    /// Get the records with offsets in `[from, min(to, size()))`
    ///
    /// Returns an empty vector when `from` is past the end or past `to`.
    pub fn get_range(&self, from: Offset, to: Offset) -> Result<Vec<Record>> {
        let records = self.records.lock();
        self.check_consistency(&records)?;

        let start = from.value() as usize;
        let end = (to.value() as usize).min(records.len());
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(records[start..end].to_vec())
    }

    /// Get a snapshot of every record in the partition
    pub fn all_records(&self) -> Result<Vec<Record>> {
        let records = self.records.lock();
        self.check_consistency(&records)?;

        Ok(records.clone())
    }

    /// Number of records appended so far
    pub fn size(&self) -> u64 {
        self.next_offset.load(Ordering::SeqCst)
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    fn check_consistency(&self, records: &[Record]) -> Result<()> {
        let next_offset = self.next_offset.load(Ordering::SeqCst);
        if records.len() as u64 != next_offset {
            return Err(BrokerError::Corruption {
                partition: self.id,
                len: records.len() as u64,
                next_offset,
            });
        }
        Ok(())
    }
}

/// A named collection of partitions routed by key hash
#[derive(Debug)]
pub struct Topic {
    name: TopicName,
    partitions: Vec<Arc<Partition>>,
}

impl Topic {
    /// Create a topic with `num_partitions` partitions with ids `0..n`
    pub fn new(name: impl Into<TopicName>, num_partitions: u32) -> Self {
        assert!(num_partitions >= 1, "a topic needs at least one partition");
        Self {
            name: name.into(),
            partitions: (0..num_partitions)
                .map(|id| Arc::new(Partition::new(PartitionId::new(id))))
                .collect(),
        }
    }

    /// Route a record to a partition by key hash and append it
    ///
    /// The hash is stable within a process run, so records with equal
    /// keys land in the same partition in send order. Empty keys are
    /// hashed like any other key.
    pub fn append(&self, record: Record) -> (PartitionId, Offset) {
        let index = crc32fast::hash(&record.key) as usize % self.partitions.len();
        let offset = self.partitions[index].append(record);
        (PartitionId::new(index as u32), offset)
    }

    /// Get a partition by id
    pub fn partition(&self, id: PartitionId) -> Result<&Arc<Partition>> {
        self.partitions
            .get(id.value() as usize)
            .ok_or(BrokerError::PartitionOutOfRange(id))
    }

    pub fn partitions(&self) -> &[Arc<Partition>] {
        &self.partitions
    }

    /// Concatenation of every partition's records in partition-id order
    ///
    /// Only per-partition order is meaningful in the result.
    pub fn all_records(&self) -> Result<Vec<Record>> {
        let mut all = Vec::with_capacity(self.size() as usize);
        for partition in &self.partitions {
            all.extend(partition.all_records()?);
        }
        Ok(all)
    }

    /// Total number of records across all partitions
    pub fn size(&self) -> u64 {
        self.partitions.iter().map(|partition| partition.size()).sum()
    }

    pub fn name(&self) -> &TopicName {
        &self.name
    }

    pub fn num_partitions(&self) -> u32 {
        self.partitions.len() as u32
    }
}
