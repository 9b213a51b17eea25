//! Analytical store client over the ClickHouse HTTP interface.
//!
//! Raw transactions are mirrored with `JSONEachRow` inserts (decimal fields
//! quoted, so nothing round-trips through floats); analytics reads query the
//! 1-minute materialized views with `FORMAT JSON`. Failures here are always
//! treated as degraded availability, never fatal.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::time::Duration;

use crate::decimal::dec_or_zero;
use crate::error::TempoError;
use crate::proto::DexTxValid;
use crate::settings::Settings;

const OLAP_TIMEOUT_SECS: u64 = 8;

#[derive(Debug, Clone)]
pub struct OlapStore {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    database: String,
}

/// Payload for `/analytics`: three rollups over the requested window.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalyticsPayload {
    pub minutes: u32,
    pub volume_by_chain_token: Vec<Value>,
    pub fee_revenue: Vec<Value>,
    pub gas_cost_averages: Vec<Value>,
}

impl OlapStore {
    pub fn new(settings: &Settings) -> Self {
        OlapStore {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(OLAP_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            base_url: format!("http://{}:{}", settings.clickhouse_host, settings.clickhouse_port),
            username: settings.clickhouse_username.clone(),
            password: settings.clickhouse_password.clone(),
            database: settings.clickhouse_database.clone(),
        }
    }

    async fn execute(&self, query: &str, body: Option<String>) -> Result<String, TempoError> {
        let request = self
            .http
            .post(&self.base_url)
            .header("X-ClickHouse-User", &self.username)
            .header("X-ClickHouse-Key", &self.password)
            .query(&[
                ("database", self.database.as_str()),
                ("query", query),
                ("input_format_json_read_numbers_as_strings", "1"),
            ])
            .body(body.unwrap_or_default());

        let response = request
            .send()
            .await
            .map_err(|e| TempoError::Olap(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TempoError::Olap(e.to_string()))?;
        if !status.is_success() {
            return Err(TempoError::Olap(format!("clickhouse {status}: {}", text.trim())));
        }
        Ok(text)
    }

    pub async fn ping(&self) -> Result<(), TempoError> {
        self.execute("SELECT 1", None).await.map(|_| ())
    }

    /// Mirror one valid note into `dex_transactions_raw`.
    pub async fn insert_raw_transaction(
        &self,
        valid: &DexTxValid,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), TempoError> {
        let row = json!({
            "tx_id": valid.tx_id,
            "note_id": valid.note_id,
            "chain_id": valid.chain_id,
            "tx_hash": valid.tx_hash,
            "action": valid.action,
            "user_address": valid.user_address,
            "pool_address": valid.pool_address,
            "token_in": valid.token_in,
            "token_out": valid.token_out,
            "amount_in": dec_or_zero(&valid.amount_in).to_string(),
            "amount_out": dec_or_zero(&valid.amount_out).to_string(),
            "fee_usd": dec_or_zero(&valid.fee_usd).to_string(),
            "gas_used": dec_or_zero(&valid.gas_used).trunc().to_string(),
            "gas_cost_usd": dec_or_zero(&valid.gas_cost_usd).to_string(),
            "protocol_revenue_usd": dec_or_zero(&valid.protocol_revenue_usd).to_string(),
            "min_out": dec_or_zero(&valid.min_out).to_string(),
            "occurred_at": format_ch_datetime(occurred_at),
            "ingested_at": format_ch_datetime(Utc::now()),
        });

        let query = format!(
            "INSERT INTO {}.dex_transactions_raw FORMAT JSONEachRow",
            self.database
        );
        self.execute(&query, Some(row.to_string())).await.map(|_| ())
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Value>, TempoError> {
        let text = self.execute(&format!("{sql} FORMAT JSON"), None).await?;
        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| TempoError::Olap(format!("malformed clickhouse response: {e}")))?;
        Ok(payload
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Time-bucketed aggregates for the analytics endpoint.
    pub async fn analytics(&self, minutes: u32) -> Result<AnalyticsPayload, TempoError> {
        let volume = self
            .query_rows(&format!(
                "SELECT bucket, chain_id, asset, sum(volume) AS volume
                 FROM {db}.dex_volume_by_chain_token_1m
                 WHERE bucket >= now() - toIntervalMinute({minutes})
                 GROUP BY bucket, chain_id, asset
                 ORDER BY bucket ASC",
                db = self.database
            ))
            .await?;

        let fees = self
            .query_rows(&format!(
                "SELECT bucket, chain_id, sum(revenue_usd) AS revenue_usd
                 FROM {db}.dex_fee_revenue_1m
                 WHERE bucket >= now() - toIntervalMinute({minutes})
                 GROUP BY bucket, chain_id
                 ORDER BY bucket ASC",
                db = self.database
            ))
            .await?;

        let gas = self
            .query_rows(&format!(
                "SELECT bucket, chain_id,
                        sum(gas_cost_sum) / nullIf(sum(gas_cost_count), 0) AS avg_gas_cost_usd
                 FROM {db}.dex_gas_cost_rollup_1m
                 WHERE bucket >= now() - toIntervalMinute({minutes})
                 GROUP BY bucket, chain_id
                 ORDER BY bucket ASC",
                db = self.database
            ))
            .await?;

        Ok(AnalyticsPayload {
            minutes,
            volume_by_chain_token: volume,
            fee_revenue: fees,
            gas_cost_averages: gas,
        })
    }
}

fn format_ch_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(uri: &str) -> OlapStore {
        let url = uri.trim_start_matches("http://");
        let (host, port) = url.split_once(':').unwrap();
        let mut settings = Settings::from_env();
        settings.clickhouse_host = host.to_string();
        settings.clickhouse_port = port.parse().unwrap();
        settings.clickhouse_database = "mcryptoex".to_string();
        OlapStore::new(&settings)
    }

    #[tokio::test]
    async fn test_analytics_parses_json_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"bucket": "2026-02-18 00:00:00", "chain_id": 31337, "asset": "mUSD", "volume": "125"}]
            })))
            .mount(&server)
            .await;

        let store = store_for(&server.uri());
        let payload = store.analytics(60).await.unwrap();
        assert_eq!(payload.minutes, 60);
        assert_eq!(payload.volume_by_chain_token.len(), 1);
        assert_eq!(payload.volume_by_chain_token[0]["chain_id"], 31337);
    }

    #[tokio::test]
    async fn test_insert_sends_json_each_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"note_id\":\"note-1\""))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server.uri());
        let valid = DexTxValid {
            note_id: "note-1".into(),
            tx_id: "11111111-2222-3333-4444-555555555555".into(),
            amount_in: "125.0".into(),
            gas_used: "117104".into(),
            ..DexTxValid::default()
        };
        store.insert_raw_transaction(&valid, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_surfaces_as_olap_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("DB::Exception: no table"))
            .mount(&server)
            .await;

        let store = store_for(&server.uri());
        let err = store.ping().await.unwrap_err();
        assert!(matches!(err, TempoError::Olap(_)));
    }
}
