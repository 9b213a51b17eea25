//! Ledger writer loop: consume valid notes, materialize each as a balanced
//! double-entry batch inside one Postgres transaction, then mirror and
//! publish downstream.
//!
//! Post-commit steps (ledger-entries topic, outbox topic, ClickHouse mirror)
//! are best-effort relative to the database transaction: if any of them
//! fails the offset is not committed and the message is reprocessed, where
//! the `note_id` conflict guard turns the retry into a no-op.

use chrono::Utc;
use prost::Message;
use rdkafka::Message as KafkaMessage;
use rdkafka::consumer::{CommitMode, Consumer};
use rdkafka::producer::FutureProducer;
use uuid::Uuid;

use tempo_runtime::TempoError;
use tempo_runtime::kafka;
use tempo_runtime::ledger::{LedgerRow, build_ledger_rows};
use tempo_runtime::proto::{
    DexLedgerEntry, DexLedgerEntryBatch, DexTxValid, now_ts, ts_from_datetime, ts_to_datetime,
};
use tempo_runtime::settings::{Settings, env_str};
use tempo_runtime::store::{OlapStore, PgStore};
use tempo_runtime::types::{OUTBOX_EVENT_NOTE_INGESTED, OutboxEvent};

pub struct LedgerWriter {
    settings: Settings,
    group_id: String,
    producer: FutureProducer,
    pg: PgStore,
    olap: OlapStore,
}

impl LedgerWriter {
    /// Postgres must be reachable here; there is no degraded mode for the
    /// writer and the supervisor is expected to restart it.
    pub async fn connect(settings: Settings) -> Result<Self, TempoError> {
        let pg = PgStore::connect(&settings.postgres_dsn).await?;
        let olap = OlapStore::new(&settings);
        let producer = kafka::producer(
            &settings.kafka_bootstrap_servers,
            "tempo-ledger-writer-producer",
        )?;
        Ok(LedgerWriter {
            group_id: env_str("LEDGER_WRITER_GROUP_ID", "mcryptoex-ledger-writer-v1"),
            settings,
            producer,
            pg,
            olap,
        })
    }

    pub async fn run(&self) -> Result<(), TempoError> {
        let consumer = kafka::consumer(
            &self.settings.kafka_bootstrap_servers,
            &self.group_id,
            &[&self.settings.dex_tx_valid_topic],
        )?;
        tracing::info!(
            topic = %self.settings.dex_tx_valid_topic,
            group = %self.group_id,
            "ledger writer subscribed"
        );

        loop {
            let message = match consumer.recv().await {
                Ok(message) => message,
                Err(err) => {
                    tracing::error!(error = %err, "consumer error");
                    continue;
                }
            };

            let payload = message.payload().unwrap_or_default();
            match self.process(payload).await {
                Ok((note_id, inserted)) => {
                    if let Err(err) = consumer.commit_message(&message, CommitMode::Sync) {
                        tracing::error!(error = %err, "offset commit failed");
                    } else {
                        tracing::info!(note_id = %note_id, inserted, "ledger write complete");
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to process valid note, offset held");
                }
            }
        }
    }

    /// Persist one valid note and, on first sighting, fan out the
    /// post-commit publishes. Returns the note id and whether it was new.
    pub async fn process(&self, payload: &[u8]) -> Result<(String, bool), TempoError> {
        let valid = DexTxValid::decode(payload)?;
        let occurred_at = ts_to_datetime(valid.occurred_at.as_ref()).unwrap_or_else(Utc::now);

        let ledger_rows = build_ledger_rows(&valid, occurred_at);
        let outbox = OutboxEvent {
            event_type: OUTBOX_EVENT_NOTE_INGESTED.to_string(),
            tx_id: valid.tx_id.clone(),
            note_id: valid.note_id.clone(),
            chain_id: valid.chain_id,
            tx_hash: valid.tx_hash.clone(),
            action: valid.action.clone(),
            occurred_at,
        };

        let inserted = self
            .pg
            .persist_note(&valid, occurred_at, &ledger_rows, &outbox)
            .await?;

        if inserted {
            self.publish_ledger_batch(&valid, &ledger_rows).await?;
            self.publish_outbox(&outbox).await?;
            self.olap.insert_raw_transaction(&valid, occurred_at).await?;
        }

        Ok((valid.note_id, inserted))
    }

    async fn publish_ledger_batch(
        &self,
        valid: &DexTxValid,
        ledger_rows: &[LedgerRow],
    ) -> Result<(), TempoError> {
        let batch = DexLedgerEntryBatch {
            batch_id: Uuid::new_v4().to_string(),
            tx_id: valid.tx_id.clone(),
            note_id: valid.note_id.clone(),
            correlation_id: valid.correlation_id.clone(),
            chain_id: valid.chain_id,
            tx_hash: valid.tx_hash.clone(),
            created_at: Some(now_ts()),
            entries: ledger_rows.iter().map(entry_from_row).collect(),
        };

        kafka::publish(
            &self.producer,
            &self.settings.dex_ledger_entries_topic,
            &valid.note_id,
            &batch.encode_to_vec(),
            Some(&valid.correlation_id),
        )
        .await
    }

    async fn publish_outbox(&self, outbox: &OutboxEvent) -> Result<(), TempoError> {
        kafka::publish(
            &self.producer,
            &self.settings.dex_outbox_topic,
            &outbox.note_id,
            serde_json::to_vec(outbox)?.as_slice(),
            None,
        )
        .await
    }
}

fn entry_from_row(row: &LedgerRow) -> DexLedgerEntry {
    DexLedgerEntry {
        tx_id: row.tx_id.clone(),
        note_id: row.note_id.clone(),
        chain_id: row.chain_id,
        tx_hash: row.tx_hash.clone(),
        account_id: row.account_id.clone(),
        side: row.side.as_str().to_string(),
        asset: row.asset.clone(),
        amount: row.amount.normalize().to_string(),
        entry_type: row.entry_type.clone(),
        fee_usd: row.fee_usd.normalize().to_string(),
        gas_cost_usd: row.gas_cost_usd.normalize().to_string(),
        protocol_revenue_usd: row.protocol_revenue_usd.normalize().to_string(),
        pool_address: row.pool_address.clone(),
        occurred_at: Some(ts_from_datetime(row.occurred_at)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_runtime::ledger::EntrySide;

    #[test]
    fn test_entry_from_row_formats_decimal_strings() {
        let row = LedgerRow {
            tx_id: "11111111-2222-3333-4444-555555555555".into(),
            note_id: "note-1".into(),
            chain_id: 31337,
            tx_hash: "0xabc".into(),
            account_id: "protocol:treasury".into(),
            side: EntrySide::Credit,
            asset: "USD".into(),
            amount: "0.3000".parse().unwrap(),
            entry_type: "trade_fee_usd".into(),
            fee_usd: "0.30".parse().unwrap(),
            gas_cost_usd: "0".parse().unwrap(),
            protocol_revenue_usd: "0.12".parse().unwrap(),
            pool_address: "0x1111111111111111111111111111111111111111".into(),
            occurred_at: Utc::now(),
        };
        let entry = entry_from_row(&row);
        assert_eq!(entry.side, "credit");
        assert_eq!(entry.amount, "0.3");
        assert_eq!(entry.fee_usd, "0.3");
        assert_eq!(entry.protocol_revenue_usd, "0.12");
        assert!(entry.occurred_at.is_some());
    }
}
