//! Thin rdkafka wrappers shared by the services: producer/consumer
//! construction with the pipeline's delivery discipline baked in, and a
//! publish helper carrying the correlation-id header.
//!
//! Consumers run with auto-commit disabled; each service commits offsets
//! synchronously only after its side effects are durable.

use rdkafka::ClientConfig;
use rdkafka::consumer::stream_consumer::StreamConsumer;
use rdkafka::consumer::Consumer;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

use crate::error::TempoError;

/// Producer flush / delivery wait used at publish and shutdown time.
pub const PRODUCER_FLUSH_SECS: u64 = 5;

pub fn producer(bootstrap_servers: &str, client_id: &str) -> Result<FutureProducer, TempoError> {
    ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .set("client.id", client_id)
        .create()
        .map_err(|e| TempoError::Kafka(format!("producer init: {e}")))
}

pub fn consumer(
    bootstrap_servers: &str,
    group_id: &str,
    topics: &[&str],
) -> Result<StreamConsumer, TempoError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .set("group.id", group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()
        .map_err(|e| TempoError::Kafka(format!("consumer init: {e}")))?;
    consumer
        .subscribe(topics)
        .map_err(|e| TempoError::Kafka(format!("subscribe {topics:?}: {e}")))?;
    Ok(consumer)
}

/// Publish one record, waiting for broker acknowledgement. The
/// `correlation_id` header is attached when provided so downstream stages can
/// trace a note end-to-end.
pub async fn publish(
    producer: &FutureProducer,
    topic: &str,
    key: &str,
    payload: &[u8],
    correlation_id: Option<&str>,
) -> Result<(), TempoError> {
    let mut record = FutureRecord::to(topic).key(key).payload(payload);
    if let Some(correlation_id) = correlation_id {
        record = record.headers(OwnedHeaders::new().insert(Header {
            key: "correlation_id",
            value: Some(correlation_id.as_bytes()),
        }));
    }

    producer
        .send(record, Timeout::After(Duration::from_secs(PRODUCER_FLUSH_SECS)))
        .await
        .map(|_| ())
        .map_err(|(e, _)| TempoError::Kafka(format!("publish to {topic}: {e}")))
}
