use serde::{Deserialize, Serialize};

/// Per-partition counts reported to monitoring callers
///
/// `first_offset` and `last_offset` are both 0 for an empty partition;
/// they are sentinels there, not genuine offsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionMetadata {
    pub id: u32,
    pub message_count: u64,
    pub first_offset: u64,
    pub last_offset: u64,
}

/// Topic-level metadata with one entry per partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMetadata {
    pub name: String,
    pub num_partitions: u32,
    pub partitions: Vec<PartitionMetadata>,
    pub total_messages: u64,
}
