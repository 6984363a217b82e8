use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use crate::domain::value_objects::TopicName;

static GLOBAL: OnceLock<Metrics> = OnceLock::new();

/// Process-wide counters and per-topic gauges and timings
///
/// Log emission itself (level filtering, timestamps) is carried by the
/// `log` facade; this type only accounts.
#[derive(Debug, Default)]
pub struct Metrics {
    sent: AtomicU64,
    received: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    queue_sizes: DashMap<TopicName, u64>,
    processing_times: DashMap<TopicName, ProcessingStats>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ProcessingStats {
    total_micros: u64,
    samples: u64,
}

impl Metrics {
    /// The lazily-initialized process-wide instance
    pub fn global() -> &'static Metrics {
        GLOBAL.get_or_init(Metrics::default)
    }

    pub fn increment_sent(&self) {
        let total = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("record sent (total: {total})");
    }

    pub fn increment_received(&self) {
        let total = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("record received (total: {total})");
    }

    pub fn increment_processed(&self) {
        let total = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("record processed (total: {total})");
    }

    pub fn increment_dropped(&self) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("record dropped (total: {total})");
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record the current inbox depth for a topic
    pub fn update_queue_size(&self, topic: &TopicName, size: usize) {
        self.queue_sizes.insert(topic.clone(), size as u64);
    }

    pub fn queue_size(&self, topic: &TopicName) -> u64 {
        self.queue_sizes.get(topic).map(|entry| *entry).unwrap_or(0)
    }

    /// Add one synchronous-append latency sample for a topic
    pub fn record_processing_time(&self, topic: &TopicName, elapsed: Duration) {
        let mut stats = self.processing_times.entry(topic.clone()).or_default();
        stats.total_micros += elapsed.as_micros() as u64;
        stats.samples += 1;
    }

    /// Average append latency in milliseconds, 0 when nothing was recorded
    pub fn average_processing_time(&self, topic: &TopicName) -> f64 {
        match self.processing_times.get(topic) {
            Some(stats) if stats.samples > 0 => {
                stats.total_micros as f64 / 1000.0 / stats.samples as f64
            }
            _ => 0.0,
        }
    }

    /// Clear every counter, gauge and timing (for tests)
    pub fn reset(&self) {
        self.sent.store(0, Ordering::Relaxed);
        self.received.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.queue_sizes.clear();
        self.processing_times.clear();
    }

    /// Point-in-time copy of every metric, sorted by topic name
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut topics: Vec<TopicMetricsSnapshot> = self
            .processing_times
            .iter()
            .map(|entry| {
                let stats = entry.value();
                let average = if stats.samples > 0 {
                    stats.total_micros as f64 / 1000.0 / stats.samples as f64
                } else {
                    0.0
                };
                TopicMetricsSnapshot {
                    topic: entry.key().to_string(),
                    queue_size: self.queue_size(entry.key()),
                    average_processing_time_ms: average,
                }
            })
            .collect();
        for entry in self.queue_sizes.iter() {
            if !topics.iter().any(|t| t.topic == entry.key().as_str()) {
                topics.push(TopicMetricsSnapshot {
                    topic: entry.key().to_string(),
                    queue_size: *entry.value(),
                    average_processing_time_ms: 0.0,
                });
            }
        }
        topics.sort_by(|a, b| a.topic.cmp(&b.topic));

        MetricsSnapshot {
            sent: self.sent(),
            received: self.received(),
            processed: self.processed(),
            dropped: self.dropped(),
            topics,
        }
    }
}

/// Serializable view of the metrics for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub sent: u64,
    pub received: u64,
    pub processed: u64,
    pub dropped: u64,
    pub topics: Vec<TopicMetricsSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicMetricsSnapshot {
    pub topic: String,
    pub queue_size: u64,
    pub average_processing_time_ms: f64,
}
