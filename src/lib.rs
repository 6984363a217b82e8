//! # Logbroker
//!
//! An in-process, multi-topic, partitioned append-only log in the style of
//! commit-log message brokers.
//!
//! Records are routed to a partition by key hash, receive dense per-partition
//! offsets, and are delivered at-least-once and in order within a partition.
//! Ingestion is asynchronous: `send` stages a record in a per-topic inbox that
//! a background writer drains into the log. A retention cleaner periodically
//! evaluates tracked partitions against time- and size-based policies. The
//! log lives in memory for the broker's lifetime; there is no durability,
//! replication, or wire protocol.
//!
//! ## Architecture
//!
//! The codebase keeps a clear separation between:
//! - **Domain Layer**: records, partitions, topics, retention policies
//! - **Application Layer**: the broker facade, producers and consumers
//! - **Infrastructure Layer**: inboxes, the background writer and cleaner,
//!   metrics
//!
//! ## Usage
//!
//! ```rust
//! use logbroker::Broker;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = Broker::new("demo-broker");
//!     broker.create_topic("events", 3)?;
//!     broker.start_async_writer();
//!
//!     // Non-blocking: the record is staged for the background writer.
//!     broker.send("events", "user-1", "logged in")?;
//!
//!     while broker.get_async_queue_size("events") > 0 {
//!         std::thread::sleep(std::time::Duration::from_millis(10));
//!     }
//!     broker.stop_async_writer();
//!
//!     println!("processed: {}", broker.get_total_processed_messages());
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use application::broker::Broker;
pub use application::consumer::Consumer;
pub use application::dto::{PartitionMetadata, TopicMetadata};
pub use application::producer::Producer;
pub use domain::entities::{Partition, Record, Topic};
pub use domain::errors::{BrokerError, Result};
pub use domain::retention::RetentionPolicy;
pub use domain::value_objects::{Offset, PartitionId, TopicName};
pub use infrastructure::async_writer::AsyncWriter;
pub use infrastructure::inbox::Inbox;
pub use infrastructure::metrics::{Metrics, MetricsSnapshot, TopicMetricsSnapshot};
pub use infrastructure::retention_cleaner::RetentionCleaner;
