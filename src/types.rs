//! Ethereum JSON-RPC types
//!
//! Type definitions for blocks and transactions returned from
//! `eth_getBlockByNumber` with full transaction objects.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer};

/// Ethereum block with full transaction details.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    /// Block number (hex string in JSON, parsed to u64)
    #[serde(rename = "number", deserialize_with = "deserialize_hex_u64")]
    pub number: u64,

    /// Block hash (hex string in JSON)
    #[serde(rename = "hash", deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    /// List of transactions in the block
    #[serde(rename = "transactions", default)]
    pub transactions: Vec<Transaction>,
}

/// Ethereum transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    /// Transaction hash (hex string in JSON)
    #[serde(rename = "hash", deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    /// Sender address recovered by the node (hex string in JSON)
    #[serde(rename = "from", deserialize_with = "deserialize_hex_address")]
    pub from: Address,

    /// Recipient address (None for contract creation, hex string in JSON)
    #[serde(rename = "to", default, deserialize_with = "deserialize_hex_address_opt")]
    pub to: Option<Address>,

    /// Value transferred in wei (hex string in JSON)
    #[serde(rename = "value", deserialize_with = "deserialize_hex_u256")]
    pub value: U256,

    /// Chain id bound into the signature (absent for pre-EIP-155 legacy transactions)
    #[serde(rename = "chainId", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub chain_id: Option<u64>,

    /// Transaction nonce (hex string in JSON)
    #[serde(rename = "nonce", default, deserialize_with = "deserialize_hex_u64")]
    pub nonce: u64,
}

impl Transaction {
    /// Check if the signature commits to a chain id.
    ///
    /// Transactions without one cannot be attributed to this chain and are
    /// ignored by the relay.
    pub fn has_chain_id(&self) -> bool {
        matches!(self.chain_id, Some(id) if id != 0)
    }
}

// Hex deserialization helpers

/// Pad an odd-length hex string with a leading zero.
/// This handles cases where RPC returns hex strings without leading zeros.
pub(crate) fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse a quantity like `0x1b4` into a u64.
pub(crate) fn parse_hex_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 16)
}

/// Deserialize a hex string to u64.
fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

/// Deserialize an optional hex string to u64.
fn deserialize_hex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| parse_hex_u64(&s).map_err(serde::de::Error::custom))
        .transpose()
}

/// Deserialize a hex string to U256.
fn deserialize_hex_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    if s.is_empty() {
        return Ok(U256::ZERO);
    }
    let bytes = hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)?;
    if bytes.len() > 32 {
        return Err(serde::de::Error::custom(format!(
            "Quantity too large for U256: {} bytes",
            bytes.len()
        )));
    }
    Ok(U256::from_be_slice(&bytes))
}

/// Deserialize a hex string to B256.
fn deserialize_hex_b256<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    let bytes = hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)?;
    if bytes.len() != 32 {
        return Err(serde::de::Error::custom(format!(
            "Expected 32 bytes for hash, got {}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

fn decode_address(s: &str) -> Result<Address, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(pad_hex_string(s)).map_err(|e| e.to_string())?;
    if bytes.len() != 20 {
        return Err(format!("Expected 20 bytes for address, got {}", bytes.len()));
    }
    Ok(Address::from_slice(&bytes))
}

/// Deserialize a hex string to Address.
fn deserialize_hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    decode_address(&s).map_err(serde::de::Error::custom)
}

/// Deserialize an optional hex string to Address.
fn deserialize_hex_address_opt<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    match s {
        Some(s) if s.strip_prefix("0x").unwrap_or(&s).is_empty() => Ok(None),
        Some(s) => decode_address(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use serde_json::json;

    fn sample_block() -> serde_json::Value {
        json!({
            "number": "0x3e8",
            "hash": "0x88e96d4537bea4d9c05d12549907b32561d3bf31f45aae734cdc119f13406cb6",
            "transactions": [
                {
                    "hash": "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060",
                    "from": "0xa1e4380a3b1f749673e270229993ee55f35663b4",
                    "to": "0x5df9b87991262f6ba471f09758cde1c0fc1de734",
                    "value": "0x7a69",
                    "chainId": "0x1",
                    "nonce": "0x0"
                },
                {
                    "hash": "0x6c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060",
                    "from": "0xa1e4380a3b1f749673e270229993ee55f35663b4",
                    "to": null,
                    "value": "0x0",
                    "nonce": "0x1"
                }
            ]
        })
    }

    #[test]
    fn test_deserialize_block() {
        let block: Block = serde_json::from_value(sample_block()).unwrap();
        assert_eq!(block.number, 1000);
        assert_eq!(block.transactions.len(), 2);

        let transfer = &block.transactions[0];
        assert_eq!(transfer.from, address!("a1e4380a3b1f749673e270229993ee55f35663b4"));
        assert_eq!(transfer.to, Some(address!("5df9b87991262f6ba471f09758cde1c0fc1de734")));
        assert_eq!(transfer.value, U256::from(31337u64));
        assert!(transfer.has_chain_id());

        let creation = &block.transactions[1];
        assert!(creation.to.is_none());
        assert!(!creation.has_chain_id());
        assert_eq!(creation.nonce, 1);
    }

    #[test]
    fn test_zero_chain_id_is_unsigned() {
        let mut value = sample_block();
        value["transactions"][0]["chainId"] = json!("0x0");
        let block: Block = serde_json::from_value(value).unwrap();
        assert!(!block.transactions[0].has_chain_id());
    }

    #[test]
    fn test_reject_short_address() {
        let mut value = sample_block();
        value["transactions"][0]["from"] = json!("0x1234");
        assert!(serde_json::from_value::<Block>(value).is_err());
    }

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x10").unwrap(), 16);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert_eq!(parse_hex_u64("0x").unwrap(), 0);
        assert!(parse_hex_u64("0xzz").is_err());
    }
}
