use bytes::Bytes;

use crate::domain::errors::Result;
use crate::domain::value_objects::TopicName;

use super::broker::Broker;

/// Sending half of the client surface
///
/// A thin facade over the broker's non-blocking ingest.
pub struct Producer<'a> {
    broker: &'a Broker,
}

impl<'a> Producer<'a> {
    pub fn new(broker: &'a Broker) -> Self {
        Self { broker }
    }

    pub fn send(
        &self,
        topic: impl Into<TopicName>,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<()> {
        self.broker.send(topic, key, value)
    }
}
