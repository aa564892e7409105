//! Outbound message records
//!
//! One record per (transaction, watched side). Serialized as JSON for the
//! broker with camelCase field names.

use crate::types::Transaction;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Message published for a transaction touching a watched address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMessage {
    /// User owning the matched address
    pub user_id: String,
    /// Sender, EIP-55 checksummed
    pub from: String,
    /// Recipient, EIP-55 checksummed; empty for contract creation
    pub to: String,
    /// Value in wei as a decimal string
    pub amount: String,
    /// Transaction hash, 0x-prefixed lowercase hex
    pub hash: String,
    pub block_number: u64,
}

impl TxMessage {
    /// Build the message for `tx` attributed to `user_id`.
    pub fn new(user_id: &str, tx: &Transaction, block_number: u64) -> Self {
        Self {
            user_id: user_id.to_string(),
            from: checksummed(&tx.from),
            to: tx.to.as_ref().map(checksummed).unwrap_or_default(),
            amount: tx.value.to_string(),
            hash: format!("0x{:x}", tx.hash),
            block_number,
        }
    }
}

fn checksummed(addr: &Address) -> String {
    addr.to_checksum(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256, U256};

    fn transfer(to: Option<Address>) -> Transaction {
        Transaction {
            hash: b256!("5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060"),
            from: address!("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"),
            to,
            value: U256::from(10u128.pow(24)),
            chain_id: Some(1),
            nonce: 0,
        }
    }

    #[test]
    fn test_message_fields() {
        let tx = transfer(Some(address!("fb6916095ca1df60bb79ce92ce3ea74c37c5d359")));
        let msg = TxMessage::new("user-7", &tx, 42);

        assert_eq!(msg.user_id, "user-7");
        assert_eq!(msg.from, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert_eq!(msg.to, "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359");
        // 1e24 does not fit in a u64; the decimal string keeps every digit.
        assert_eq!(msg.amount, "1000000000000000000000000");
        assert_eq!(
            msg.hash,
            "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060"
        );
        assert_eq!(msg.block_number, 42);
    }

    #[test]
    fn test_contract_creation_has_empty_recipient() {
        let msg = TxMessage::new("user-7", &transfer(None), 1);
        assert_eq!(msg.to, "");
    }

    #[test]
    fn test_json_shape() {
        let msg = TxMessage::new("u", &transfer(None), 9);
        let value = serde_json::to_value(&msg).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["amount", "blockNumber", "from", "hash", "to", "userId"]);
        assert_eq!(value["blockNumber"], 9);
    }
}
