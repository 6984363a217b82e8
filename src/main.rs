use chrono::Duration as ChronoDuration;
use clap::{Parser, Subcommand};
use log::info;
use std::thread;
use std::time::{Duration, Instant};

use logbroker::{Broker, Consumer, Metrics, PartitionId, Producer, Record, RetentionPolicy};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    demo: Demo,
}

#[derive(Subcommand)]
enum Demo {
    /// Produce, drain and consume through a single topic
    Basic,
    /// Non-blocking ingestion through the background writer
    AsyncWriter,
    /// Retention policies and the periodic cleanup sweep
    Retention,
    /// Counters, gauges and processing times
    Metrics,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    match Args::parse().demo {
        Demo::Basic => run_basic(),
        Demo::AsyncWriter => run_async_writer(),
        Demo::Retention => run_retention(),
        Demo::Metrics => run_metrics(),
    }
}

/// Wait until every staged record has moved into the log.
fn drain(broker: &Broker, topic: &str) {
    while broker.get_async_queue_size(topic) > 0 {
        thread::sleep(Duration::from_millis(10));
    }
}

fn run_basic() -> anyhow::Result<()> {
    let broker = Broker::new("basic-broker");
    broker.create_topic("orders", 3)?;
    broker.start_async_writer();

    let producer = Producer::new(&broker);
    producer.send("orders", "user-123", "created")?;
    producer.send("orders", "user-456", "created")?;
    producer.send("orders", "user-123", "paid")?;
    drain(&broker, "orders");
    broker.stop_async_writer();

    let consumer = Consumer::new(&broker, "orders");
    for metadata in broker.get_partition_metadata("orders")? {
        let partition_id = PartitionId::new(metadata.id);
        while let Ok(record) = consumer.poll(partition_id) {
            println!(
                "partition {} offset {}: {} => {}",
                metadata.id,
                record.offset.unwrap_or_default(),
                String::from_utf8_lossy(&record.key),
                String::from_utf8_lossy(&record.value),
            );
        }
    }
    Ok(())
}

fn run_async_writer() -> anyhow::Result<()> {
    let broker = Broker::new("async-broker");
    broker.create_topic("async-topic", 3)?;
    broker.start_async_writer();

    let producer = Producer::new(&broker);
    let started = Instant::now();
    for i in 0..100 {
        producer.send("async-topic", format!("key{i}"), format!("message{i}"))?;
    }
    println!("sent 100 records in {:?}", started.elapsed());
    println!(
        "queue size after sending: {}",
        broker.get_async_queue_size("async-topic")
    );

    drain(&broker, "async-topic");
    broker.stop_async_writer();

    println!("processed: {}", broker.get_total_processed_messages());
    for metadata in broker.get_topics_metadata() {
        println!(
            "topic {}: {} records over {} partitions",
            metadata.name, metadata.total_messages, metadata.num_partitions
        );
    }
    Ok(())
}

fn run_retention() -> anyhow::Result<()> {
    let broker = Broker::new("retention-broker");
    broker.create_topic("retention-topic", 2)?;
    broker.set_cleanup_interval(Duration::from_millis(500));
    broker.start_retention_cleaner();

    // Half the records are already older than the one-hour age limit.
    broker.set_retention_policy(
        "retention-topic",
        RetentionPolicy::new(ChronoDuration::hours(1), 0),
    )?;
    for i in 0..20 {
        let timestamp = if i % 2 == 0 {
            chrono::Utc::now() - ChronoDuration::hours(2)
        } else {
            chrono::Utc::now()
        };
        let record = Record::with_timestamp(format!("key{i}"), format!("message{i}"), timestamp);
        broker.append_sync("retention-topic", record)?;
    }

    info!("waiting for the cleanup sweep");
    thread::sleep(Duration::from_secs(2));
    broker.stop_retention_cleaner();

    println!(
        "cleaned: {} records, {} bytes",
        broker.get_total_cleaned_messages(),
        broker.get_total_cleaned_bytes()
    );
    println!(
        "log untouched: {} records still stored",
        broker.get_topics_metadata()[0].total_messages
    );
    Ok(())
}

fn run_metrics() -> anyhow::Result<()> {
    let broker = Broker::new("metrics-broker");
    broker.create_topic("metrics-topic", 2)?;
    broker.start_async_writer();

    let producer = Producer::new(&broker);
    for i in 0..50 {
        producer.send("metrics-topic", format!("key{i}"), format!("message{i}"))?;
    }
    drain(&broker, "metrics-topic");
    broker.stop_async_writer();

    let snapshot = Metrics::global().snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
