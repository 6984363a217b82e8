use thiserror::Error;

use super::value_objects::*;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Topic '{0}' does not exist")]
    UnknownTopic(TopicName),

    #[error("Topic '{0}' already exists")]
    TopicAlreadyExists(TopicName),

    #[error("Partition {0} does not exist")]
    PartitionOutOfRange(PartitionId),

    #[error("Offset {0} does not exist")]
    OffsetOutOfRange(Offset),

    #[error("No message available")]
    NoMessage,

    #[error("Inbox is shut down and empty")]
    Closed,

    #[error("Partition {partition} corrupted: {len} records but next offset is {next_offset}")]
    Corruption {
        partition: PartitionId,
        len: u64,
        next_offset: u64,
    },
}
