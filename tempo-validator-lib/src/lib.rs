//! Validator service loop: consume raw notes, publish valid notes or
//! dead-letter records, commit offsets synchronously per message.
//!
//! Validation failures never block the pipeline. A malformed payload is
//! quarantined to the DLQ with its hex body and the source offset committed,
//! so one poisoned message cannot wedge the partition.

pub mod validate;

use prost::Message;
use rdkafka::Message as KafkaMessage;
use rdkafka::consumer::{CommitMode, Consumer};
use rdkafka::producer::FutureProducer;
use serde_json::json;
use uuid::Uuid;

use tempo_runtime::TempoError;
use tempo_runtime::kafka;
use tempo_runtime::proto::DexTxRaw;
use tempo_runtime::settings::{Settings, env_str};

pub use validate::{VALIDATION_VERSION, ValidationError, derive_tx_id, validate_note};

pub struct Validator {
    settings: Settings,
    group_id: String,
    producer: FutureProducer,
}

impl Validator {
    pub fn new(settings: Settings) -> Result<Self, TempoError> {
        let producer = kafka::producer(
            &settings.kafka_bootstrap_servers,
            "tempo-validator-producer",
        )?;
        Ok(Validator {
            group_id: env_str("VALIDATOR_GROUP_ID", "mcryptoex-validator-v1"),
            settings,
            producer,
        })
    }

    pub async fn run(&self) -> Result<(), TempoError> {
        let consumer = kafka::consumer(
            &self.settings.kafka_bootstrap_servers,
            &self.group_id,
            &[&self.settings.dex_tx_raw_topic],
        )?;
        tracing::info!(topic = %self.settings.dex_tx_raw_topic, group = %self.group_id, "validator subscribed");

        loop {
            let message = match consumer.recv().await {
                Ok(message) => message,
                Err(err) => {
                    tracing::error!(error = %err, "consumer error");
                    continue;
                }
            };

            let payload = message.payload().unwrap_or_default().to_vec();
            match self.process(&payload).await {
                Ok(outcome) => {
                    if let Err(err) = consumer.commit_message(&message, CommitMode::Sync) {
                        tracing::error!(error = %err, "offset commit failed");
                    } else {
                        tracing::info!(
                            note_id = %outcome.note_id,
                            valid = outcome.valid,
                            "note processed"
                        );
                    }
                }
                Err(err) => {
                    // Infrastructure failure (publish, broker): do not commit,
                    // the message is redelivered.
                    tracing::error!(error = %err, "processing failed, offset held");
                }
            }
        }
    }

    async fn process(&self, payload: &[u8]) -> Result<Outcome, TempoError> {
        let validated = DexTxRaw::decode(payload)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                validate_note(&raw)
                    .map_err(|e| e.to_string())
                    .map(|valid| (raw, valid))
            });

        match validated {
            Ok((_, valid)) => {
                kafka::publish(
                    &self.producer,
                    &self.settings.dex_tx_valid_topic,
                    &valid.note_id,
                    &valid.encode_to_vec(),
                    Some(&valid.correlation_id),
                )
                .await?;
                Ok(Outcome {
                    note_id: valid.note_id,
                    valid: true,
                })
            }
            Err(error) => {
                let record = json!({
                    "error": error,
                    "payload_hex": hex::encode(payload),
                });
                let key = Uuid::new_v4().to_string();
                kafka::publish(
                    &self.producer,
                    &self.settings.dex_dlq_topic,
                    &key,
                    record.to_string().as_bytes(),
                    None,
                )
                .await?;
                tracing::warn!(error = %error, "note dead-lettered");
                Ok(Outcome {
                    note_id: key,
                    valid: false,
                })
            }
        }
    }
}

struct Outcome {
    note_id: String,
    valid: bool,
}
