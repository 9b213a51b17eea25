//! Minimal EVM JSON-RPC client plus the ABI word decoding used by pair
//! discovery and the indexer.
//!
//! The transport is deliberately plain: HTTP POST with a 12 second timeout,
//! and one `curl` subprocess attempt when the primary transport fails at the
//! network layer (some sandboxed deploy hosts only allow outbound traffic
//! through the system curl). A JSON-RPC response with a non-null `error`
//! field is fatal for that call.

use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use crate::error::TempoError;

const RPC_TIMEOUT_SECS: u64 = 12;

/// First-4-bytes selectors of the read-only calls used against factories,
/// pairs, and tokens (keccak-256 of the canonical signatures).
pub mod selectors {
    pub const ALL_PAIRS_LENGTH: &str = "0x574f2ba3";
    pub const ALL_PAIRS: &str = "0x1e3dd18b";
    pub const TOKEN0: &str = "0x0dfe1681";
    pub const TOKEN1: &str = "0xd21220a7";
    pub const GET_RESERVES: &str = "0x0902f1ac";
    pub const DECIMALS: &str = "0x313ce567";
    pub const SYMBOL: &str = "0x95d89b41";
}

#[derive(Debug, Clone)]
pub struct EvmRpcClient {
    url: String,
    client: reqwest::Client,
}

/// One entry from `eth_getLogs`, with quantities already parsed.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u64,
}

/// Gas fields of a transaction receipt.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptGas {
    pub gas_used: u128,
    pub effective_gas_price: u128,
}

#[derive(Deserialize)]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
    #[serde(rename = "logIndex")]
    log_index: String,
}

impl EvmRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(RPC_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, TempoError> {
        let payload = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});

        let response = match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) => resp
                .json::<Value>()
                .await
                .map_err(|e| TempoError::Rpc(format!("{method}: invalid json response: {e}")))?,
            Err(primary) => self.call_with_curl(&payload, &primary).await?,
        };

        if let Some(err) = response.get("error").filter(|e| !e.is_null()) {
            return Err(TempoError::Rpc(format!("{method}: {err}")));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn call_with_curl(
        &self,
        payload: &Value,
        primary: &reqwest::Error,
    ) -> Result<Value, TempoError> {
        let body = serde_json::to_string(payload)?;
        let output = tokio::process::Command::new("curl")
            .args([
                "-sS",
                "--max-time",
                "12",
                "-H",
                "Content-Type: application/json",
                "-d",
                &body,
                &self.url,
            ])
            .output()
            .await
            .map_err(|e| {
                TempoError::Rpc(format!("rpc call failed via http and curl: {primary}; curl={e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TempoError::Rpc(format!(
                "rpc call failed via http and curl: {primary}; curl={stderr}"
            )));
        }

        let decoded: Value = serde_json::from_slice(&output.stdout).map_err(|_| {
            let snippet: String = String::from_utf8_lossy(&output.stdout)
                .trim()
                .chars()
                .take(200)
                .collect();
            TempoError::Rpc(format!(
                "rpc call returned invalid json via curl after http failure: {snippet}"
            ))
        })?;
        if !decoded.is_object() {
            return Err(TempoError::Rpc(
                "rpc call returned non-object payload via curl".into(),
            ));
        }
        Ok(decoded)
    }

    pub async fn block_number(&self) -> Result<u64, TempoError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(result.as_str().unwrap_or_default())
    }

    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String, TempoError> {
        let result = self
            .call("eth_call", json!([{"to": to, "data": data}, "latest"]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TempoError::Rpc("eth_call returned non-hex result".into()))
    }

    pub async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        addresses: &[String],
        topic0_candidates: &[String],
    ) -> Result<Vec<LogEntry>, TempoError> {
        let filter = json!([{
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": format!("0x{to_block:x}"),
            "address": addresses,
            "topics": [topic0_candidates],
        }]);
        let result = self.call("eth_getLogs", filter).await?;
        let raw: Vec<RawLog> = serde_json::from_value(result)
            .map_err(|e| TempoError::Rpc(format!("eth_getLogs: malformed logs: {e}")))?;

        let mut logs = Vec::with_capacity(raw.len());
        for entry in raw {
            logs.push(LogEntry {
                block_number: parse_quantity(&entry.block_number)?,
                log_index: parse_quantity(&entry.log_index)?,
                address: entry.address.to_lowercase(),
                topics: entry.topics,
                data: entry.data,
                transaction_hash: entry.transaction_hash,
            });
        }
        Ok(logs)
    }

    pub async fn block_timestamp(&self, block_number: u64) -> Result<u64, TempoError> {
        let result = self
            .call(
                "eth_getBlockByNumber",
                json!([format!("0x{block_number:x}"), false]),
            )
            .await?;
        let ts = result
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| TempoError::Rpc("eth_getBlockByNumber: missing timestamp".into()))?;
        parse_quantity(ts)
    }

    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptGas>, TempoError> {
        let result = self
            .call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let gas_used = result.get("gasUsed").and_then(Value::as_str);
        let price = result.get("effectiveGasPrice").and_then(Value::as_str);
        match (gas_used, price) {
            (Some(gas_used), Some(price)) => Ok(Some(ReceiptGas {
                gas_used: parse_quantity_u128(gas_used)?,
                effective_gas_price: parse_quantity_u128(price)?,
            })),
            _ => Ok(None),
        }
    }
}

/// Parse a 0x-prefixed hex quantity into u64.
pub fn parse_quantity(raw: &str) -> Result<u64, TempoError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| TempoError::Rpc(format!("invalid hex quantity: {trimmed}")))?;
    u64::from_str_radix(body, 16).map_err(|e| TempoError::Rpc(format!("invalid hex quantity: {e}")))
}

pub fn parse_quantity_u128(raw: &str) -> Result<u128, TempoError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| TempoError::Rpc(format!("invalid hex quantity: {trimmed}")))?;
    u128::from_str_radix(body, 16).map_err(|e| TempoError::Rpc(format!("invalid hex quantity: {e}")))
}

/// ABI word decoding for `eth_call` results. Everything is big-endian,
/// 32-byte aligned; addresses are the low 20 bytes of a right-aligned word.
pub mod abi {
    use alloy::primitives::U256;

    use crate::error::TempoError;

    pub fn decode_uint(hex_value: &str) -> Result<U256, TempoError> {
        let value = hex_value.trim();
        let body = value
            .strip_prefix("0x")
            .ok_or_else(|| TempoError::Rpc(format!("invalid hex uint: {value}")))?;
        if body.is_empty() {
            return Ok(U256::ZERO);
        }
        U256::from_str_radix(body, 16)
            .map_err(|e| TempoError::Rpc(format!("invalid hex uint: {e}")))
    }

    pub fn decode_address(hex_value: &str) -> Result<String, TempoError> {
        let value = hex_value.trim().to_lowercase();
        let body = value
            .strip_prefix("0x")
            .ok_or_else(|| TempoError::Rpc(format!("invalid hex address: {value}")))?;
        let padded = format!("{body:0>64}");
        Ok(format!("0x{}", &padded[padded.len() - 40..]))
    }

    /// Decode a `symbol()` result. Accepts both the dynamic string encoding
    /// (offset, length, UTF-8 payload) and the legacy fixed 32-byte encoding
    /// (null-terminated ASCII in a single word).
    pub fn decode_symbol(hex_value: &str) -> String {
        let value = hex_value.trim();
        let Some(body) = value.strip_prefix("0x") else {
            return "UNKNOWN".to_string();
        };
        let Ok(raw) = hex::decode(body) else {
            return "UNKNOWN".to_string();
        };

        if raw.len() == 32 {
            let trimmed: Vec<u8> = raw.iter().copied().take_while(|b| *b != 0).collect();
            let decoded = String::from_utf8_lossy(&trimmed).trim().to_string();
            return if decoded.is_empty() { "UNKNOWN".into() } else { decoded };
        }

        if raw.len() >= 96 {
            let offset = word_as_usize(&raw[..32]);
            if let Some(offset) = offset {
                if offset + 64 <= raw.len() {
                    if let Some(length) = word_as_usize(&raw[offset..offset + 32]) {
                        let start = offset + 32;
                        let end = start + length;
                        if end <= raw.len() {
                            let decoded = String::from_utf8_lossy(&raw[start..end])
                                .trim_matches('\0')
                                .trim()
                                .to_string();
                            if !decoded.is_empty() {
                                return decoded;
                            }
                        }
                    }
                }
            }
        }

        "UNKNOWN".to_string()
    }

    fn word_as_usize(word: &[u8]) -> Option<usize> {
        // reject anything that does not fit in a usize
        if word.len() != 32 || word[..24].iter().any(|b| *b != 0) {
            return None;
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&word[24..]);
        usize::try_from(u64::from_be_bytes(buf)).ok()
    }

    /// ABI-encode an index argument as a 32-byte big-endian word (no 0x).
    pub fn encode_uint256(value: u64) -> String {
        format!("{value:064x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{U256, keccak256};

    #[test]
    fn test_selectors_match_signatures() {
        let cases = [
            (selectors::ALL_PAIRS_LENGTH, "allPairsLength()"),
            (selectors::ALL_PAIRS, "allPairs(uint256)"),
            (selectors::TOKEN0, "token0()"),
            (selectors::TOKEN1, "token1()"),
            (selectors::GET_RESERVES, "getReserves()"),
            (selectors::DECIMALS, "decimals()"),
            (selectors::SYMBOL, "symbol()"),
        ];
        for (selector, signature) in cases {
            let hash = keccak256(signature.as_bytes());
            assert_eq!(selector, format!("0x{}", hex::encode(&hash[..4])), "{signature}");
        }
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x2a").unwrap(), 42);
        assert!(parse_quantity("2a").is_err());
    }

    #[test]
    fn test_decode_address_right_aligned() {
        let word = "0x000000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266";
        assert_eq!(
            abi::decode_address(word).unwrap(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        // short results are left-padded before the low 20 bytes are taken
        assert_eq!(
            abi::decode_address("0x1234").unwrap(),
            "0x0000000000000000000000000000000000001234"
        );
    }

    #[test]
    fn test_decode_uint() {
        assert_eq!(abi::decode_uint("0x0").unwrap(), U256::ZERO);
        assert_eq!(
            abi::decode_uint(&format!("0x{}", abi::encode_uint256(7))).unwrap(),
            U256::from(7u64)
        );
    }

    #[test]
    fn test_decode_symbol_dynamic() {
        // offset 0x20, length 4, "WETH" padded to a word
        let mut hex_body = String::new();
        hex_body.push_str(&abi::encode_uint256(0x20));
        hex_body.push_str(&abi::encode_uint256(4));
        hex_body.push_str(&hex::encode(b"WETH"));
        hex_body.push_str(&"0".repeat(56));
        assert_eq!(abi::decode_symbol(&format!("0x{hex_body}")), "WETH");
    }

    #[test]
    fn test_decode_symbol_legacy_fixed_word() {
        let mut raw = [0u8; 32];
        raw[..4].copy_from_slice(b"MODX");
        assert_eq!(abi::decode_symbol(&format!("0x{}", hex::encode(raw))), "MODX");
    }

    #[test]
    fn test_decode_symbol_garbage_is_unknown() {
        assert_eq!(abi::decode_symbol("zzz"), "UNKNOWN");
        assert_eq!(abi::decode_symbol("0x"), "UNKNOWN");
    }

    #[tokio::test]
    async fn test_rpc_error_field_is_fatal() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32000, "message": "execution reverted"}
            })))
            .mount(&server)
            .await;

        let client = EvmRpcClient::new(server.uri());
        let err = client.block_number().await.unwrap_err();
        assert!(err.to_string().contains("execution reverted"));
    }

    #[tokio::test]
    async fn test_block_number_parses_result() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": "0x64"
            })))
            .mount(&server)
            .await;

        let client = EvmRpcClient::new(server.uri());
        assert_eq!(client.block_number().await.unwrap(), 100);
    }
}
