//! Raw RPC response shapes.
//!
//! Quantities arrive as `0x`-prefixed hex strings; the parse helpers below
//! convert them leniently (a malformed quantity becomes 0 rather than
//! failing the whole chunk).

use serde::{Deserialize, Serialize};

/// A raw block header as returned by `eth_getBlockByNumber`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
    pub number: String,
    pub hash: String,
    #[serde(rename = "parentHash")]
    pub parent_hash: String,
    pub timestamp: String,
    #[serde(rename = "gasUsed")]
    pub gas_used: String,
    #[serde(rename = "gasLimit")]
    pub gas_limit: String,
    #[serde(default)]
    pub miner: String,
    #[serde(rename = "baseFeePerGas")]
    pub base_fee_per_gas: Option<String>,
}

impl RawBlock {
    pub fn number_u64(&self) -> u64 {
        parse_hex_u64(&self.number)
    }
}

/// A raw transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub hash: String,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    pub from: String,
    pub to: Option<String>,
    pub value: String,
    #[serde(rename = "gasPrice")]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub input: String,
}

impl RawTransaction {
    /// Calldata bytes, empty for plain transfers.
    pub fn input_bytes(&self) -> Vec<u8> {
        let s = self.input.strip_prefix("0x").unwrap_or(&self.input);
        (0..s.len().saturating_sub(1))
            .step_by(2)
            .filter_map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
            .collect()
    }

    /// Transferred value in wei as a decimal string.
    pub fn value_decimal(&self) -> String {
        parse_hex_u128(&self.value).to_string()
    }
}

/// A raw receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReceipt {
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionIndex")]
    pub tx_index: String,
    #[serde(rename = "gasUsed")]
    pub gas_used: String,
    #[serde(rename = "effectiveGasPrice")]
    pub effective_gas_price: Option<String>,
    /// `0x1` success, `0x0` failure; absent on pre-Byzantium receipts.
    pub status: Option<String>,
}

impl RawReceipt {
    /// `Some(true)` on success, `Some(false)` on failure, `None` if the
    /// node did not report a status.
    pub fn succeeded(&self) -> Option<bool> {
        self.status.as_deref().map(|s| parse_hex_u64(s) == 1)
    }
}

/// A raw log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn block_number_u64(&self) -> u64 {
        parse_hex_u64(&self.block_number)
    }

    pub fn log_index_u32(&self) -> u32 {
        parse_hex_u64(&self.log_index) as u32
    }

    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// Parse a hex quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> u64 {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).unwrap_or(0)
}

/// Parse a hex quantity to u128 (wei values exceed u64).
pub fn parse_hex_u128(s: &str) -> u128 {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(s, 16).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex_u64("0x1"), 1);
        assert_eq!(parse_hex_u64("0xff"), 255);
        assert_eq!(parse_hex_u64("ff"), 255);
        assert_eq!(parse_hex_u64("0xzz"), 0);
        // 1 ETH in wei
        assert_eq!(parse_hex_u128("0xde0b6b3a7640000"), 1_000_000_000_000_000_000);
    }

    #[test]
    fn tx_input_bytes() {
        let tx = RawTransaction {
            hash: "0x1".into(),
            block_number: Some("0x10".into()),
            from: "0xabc".into(),
            to: None,
            value: "0x0".into(),
            gas_price: None,
            input: "0xa9059cbb0001".into(),
        };
        assert_eq!(tx.input_bytes(), vec![0xa9, 0x05, 0x9c, 0xbb, 0x00, 0x01]);

        let empty = RawTransaction { input: "0x".into(), ..tx };
        assert!(empty.input_bytes().is_empty());
    }

    #[test]
    fn receipt_status() {
        let mut r = RawReceipt {
            tx_hash: "0x1".into(),
            block_number: "0x64".into(),
            tx_index: "0x2".into(),
            gas_used: "0x5208".into(),
            effective_gas_price: Some("0x3b9aca00".into()),
            status: Some("0x1".into()),
        };
        assert_eq!(r.succeeded(), Some(true));
        r.status = Some("0x0".into());
        assert_eq!(r.succeeded(), Some(false));
        r.status = None;
        assert_eq!(r.succeeded(), None);
    }

    #[test]
    fn log_deserializes_from_rpc_shape() {
        let json = serde_json::json!({
            "address": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x",
            "blockNumber": "0x12a05f2",
            "transactionHash": "0xbeef",
            "logIndex": "0x5",
            "removed": false
        });
        let log: RawLog = serde_json::from_value(json).unwrap();
        assert_eq!(log.block_number_u64(), 19_531_250);
        assert_eq!(log.log_index_u32(), 5);
        assert!(!log.is_removed());
    }
}
