//! Transactional store: the `dex_transactions` record, its double-entry
//! rows, and the transactional outbox, written atomically per note.
//!
//! The unique `note_id` constraint plus `ON CONFLICT DO NOTHING RETURNING`
//! is the pipeline's at-least-once → effectively-once boundary: a duplicate
//! note reports no inserted row and all downstream side effects are skipped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::error::TempoError;
use crate::ledger::LedgerRow;
use crate::proto::DexTxValid;
use crate::decimal::dec_or_zero;
use crate::types::OutboxEvent;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// A `dex_ledger_entries` row as served by `/ledger/recent`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LedgerEntryRecord {
    pub entry_id: i64,
    pub tx_id: String,
    pub note_id: String,
    pub chain_id: i64,
    pub tx_hash: String,
    pub account_id: String,
    pub side: String,
    pub asset: String,
    pub amount: String,
    pub entry_type: String,
    pub fee_usd: String,
    pub gas_cost_usd: String,
    pub protocol_revenue_usd: String,
    pub pool_address: String,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated swap activity per pool, merged into `/pairs`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PairSwapStats {
    pub chain_id: i64,
    pub pool_address: String,
    pub token_in: String,
    pub token_out: String,
    pub swaps: i64,
    pub total_amount_in: String,
    pub total_amount_out: String,
    pub total_fee_usd: String,
    pub last_swap_at: DateTime<Utc>,
}

impl PgStore {
    /// Open a bounded pool and verify connectivity with one round-trip.
    pub async fn connect(dsn: &str) -> Result<Self, TempoError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .connect(dsn)
            .await?;
        Ok(PgStore { pool })
    }

    /// Build a pool without touching the network; connections open on first
    /// use. The API server uses this so readiness probing stays meaningful.
    pub fn connect_lazy(dsn: &str) -> Result<Self, TempoError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .connect_lazy(dsn)?;
        Ok(PgStore { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), TempoError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Persist one valid note in a single transaction. Returns `true` when
    /// the note was seen for the first time (ledger rows and outbox row were
    /// written), `false` for duplicates.
    pub async fn persist_note(
        &self,
        valid: &DexTxValid,
        occurred_at: DateTime<Utc>,
        ledger_rows: &[LedgerRow],
        outbox: &OutboxEvent,
    ) -> Result<bool, TempoError> {
        let tx_id = Uuid::parse_str(&valid.tx_id)
            .map_err(|e| TempoError::Database(format!("invalid tx_id {}: {e}", valid.tx_id)))?;
        let ingested_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        let inserted_row = sqlx::query(
            r#"
            INSERT INTO dex_transactions (
              tx_id, note_id, correlation_id, chain_id, tx_hash, action,
              user_address, pool_address, token_in, token_out,
              amount_in, amount_out, fee_usd, gas_used, gas_cost_usd,
              protocol_revenue_usd, min_out, block_number, occurred_at, ingested_at
            )
            VALUES (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
              $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            ON CONFLICT (note_id) DO NOTHING
            RETURNING tx_id
            "#,
        )
        .bind(tx_id)
        .bind(&valid.note_id)
        .bind(&valid.correlation_id)
        .bind(valid.chain_id)
        .bind(&valid.tx_hash)
        .bind(&valid.action)
        .bind(&valid.user_address)
        .bind(&valid.pool_address)
        .bind(&valid.token_in)
        .bind(&valid.token_out)
        .bind(dec_or_zero(&valid.amount_in))
        .bind(dec_or_zero(&valid.amount_out))
        .bind(dec_or_zero(&valid.fee_usd))
        .bind(dec_or_zero(&valid.gas_used))
        .bind(dec_or_zero(&valid.gas_cost_usd))
        .bind(dec_or_zero(&valid.protocol_revenue_usd))
        .bind(dec_or_zero(&valid.min_out))
        .bind(valid.block_number)
        .bind(occurred_at)
        .bind(ingested_at)
        .fetch_optional(&mut *tx)
        .await?;

        let inserted = inserted_row.is_some();

        if inserted && !ledger_rows.is_empty() {
            let mut builder = QueryBuilder::new(
                "INSERT INTO dex_ledger_entries (
                  tx_id, note_id, chain_id, tx_hash, account_id, side, asset,
                  amount, entry_type, fee_usd, gas_cost_usd,
                  protocol_revenue_usd, pool_address, occurred_at
                ) ",
            );
            builder.push_values(ledger_rows, |mut b, row| {
                b.push_bind(tx_id)
                    .push_bind(&row.note_id)
                    .push_bind(row.chain_id)
                    .push_bind(&row.tx_hash)
                    .push_bind(&row.account_id)
                    .push_bind(row.side.as_str())
                    .push_bind(&row.asset)
                    .push_bind(row.amount)
                    .push_bind(&row.entry_type)
                    .push_bind(row.fee_usd)
                    .push_bind(row.gas_cost_usd)
                    .push_bind(row.protocol_revenue_usd)
                    .push_bind(&row.pool_address)
                    .push_bind(row.occurred_at);
            });
            builder.build().execute(&mut *tx).await?;
        }

        if inserted {
            sqlx::query(
                r#"
                INSERT INTO dex_outbox (tx_id, event_type, payload, published, created_at)
                VALUES ($1, $2, $3, FALSE, NOW())
                "#,
            )
            .bind(tx_id)
            .bind(&outbox.event_type)
            .bind(serde_json::to_value(outbox)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn recent_ledger_entries(
        &self,
        limit: i64,
        chain_id: Option<i64>,
        entry_type: Option<&str>,
    ) -> Result<Vec<LedgerEntryRecord>, TempoError> {
        let mut builder = QueryBuilder::new(
            "SELECT
              entry_id,
              tx_id::text AS tx_id,
              note_id,
              chain_id,
              tx_hash,
              account_id,
              side,
              asset,
              amount::text AS amount,
              entry_type,
              fee_usd::text AS fee_usd,
              gas_cost_usd::text AS gas_cost_usd,
              protocol_revenue_usd::text AS protocol_revenue_usd,
              pool_address,
              occurred_at,
              created_at
            FROM dex_ledger_entries
            WHERE TRUE",
        );
        if let Some(chain_id) = chain_id {
            builder.push(" AND chain_id = ").push_bind(chain_id);
        }
        if let Some(entry_type) = entry_type {
            builder.push(" AND entry_type = ").push_bind(entry_type);
        }
        builder.push(" ORDER BY entry_id DESC LIMIT ").push_bind(limit);

        let rows = builder
            .build_query_as::<LedgerEntryRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn pair_swap_stats(
        &self,
        chain_id: Option<i64>,
    ) -> Result<Vec<PairSwapStats>, TempoError> {
        let mut builder = QueryBuilder::new(
            "SELECT
              chain_id,
              pool_address,
              token_in,
              token_out,
              COUNT(*) AS swaps,
              COALESCE(SUM(amount_in), 0)::text AS total_amount_in,
              COALESCE(SUM(amount_out), 0)::text AS total_amount_out,
              COALESCE(SUM(fee_usd), 0)::text AS total_fee_usd,
              MAX(occurred_at) AS last_swap_at
            FROM dex_transactions
            WHERE action = 'SWAP'",
        );
        if let Some(chain_id) = chain_id {
            builder.push(" AND chain_id = ").push_bind(chain_id);
        }
        builder.push(
            " GROUP BY chain_id, pool_address, token_in, token_out
            ORDER BY MAX(occurred_at) DESC",
        );

        let rows = builder
            .build_query_as::<PairSwapStats>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
