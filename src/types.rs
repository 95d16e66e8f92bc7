use serde::{Deserialize, Serialize};

/// A confirmed transaction as handed over by the ledger client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transaction {
    /// Transaction signature (base58).
    pub signature: String,
    pub slot: u64,
    /// Unix seconds, when the node reports it.
    pub block_time: Option<i64>,
    /// Fee in lamports.
    pub fee: u64,
    /// Flat account key list: static keys, then loaded writable, then loaded readonly.
    pub account_keys: Vec<String>,
    /// Top-level instructions in execution order.
    pub instructions: Vec<CompiledInstruction>,
    /// CPI instructions grouped by the top-level index that produced them.
    pub inner_instructions: Vec<InnerInstructionGroup>,
    /// Lamport balances aligned with `account_keys`.
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
    pub log_messages: Vec<String>,
    /// Execution error, if the transaction failed.
    pub err: Option<serde_json::Value>,
}

impl Transaction {
    pub fn is_failed(&self) -> bool {
        self.err.is_some()
    }

    /// Inner instructions run under top-level instruction `index`, empty when there are none.
    pub fn inner_group(&self, index: usize) -> &[CompiledInstruction] {
        self.inner_instructions
            .iter()
            .find(|g| g.index == index)
            .map(|g| g.instructions.as_slice())
            .unwrap_or(&[])
    }

    pub fn account_index(&self, pubkey: &str) -> Option<usize> {
        self.account_keys.iter().position(|k| k == pubkey)
    }

    /// Absolute lamport change of the account at `index`.
    pub fn lamport_delta(&self, index: usize) -> Option<u64> {
        let pre = *self.pre_balances.get(index)?;
        let post = *self.post_balances.get(index)?;
        Some(pre.abs_diff(post))
    }

    /// Mint and decimals of a token account, from either side of the balance snapshot.
    pub fn token_account_mint(&self, pubkey: &str) -> Option<(&str, u8)> {
        let index = self.account_index(pubkey)?;
        self.pre_token_balances
            .iter()
            .chain(&self.post_token_balances)
            .find(|b| b.account_index == index)
            .map(|b| (b.mint.as_str(), b.decimals))
    }

    /// Decimals of `mint` as reported by any token balance in the transaction.
    pub fn mint_decimals(&self, mint: &str) -> Option<u8> {
        self.pre_token_balances
            .iter()
            .chain(&self.post_token_balances)
            .find(|b| b.mint == mint)
            .map(|b| b.decimals)
    }
}

/// An instruction with its account indices already resolved to pubkeys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledInstruction {
    pub program_id: String,
    pub accounts: Vec<String>,
    /// Instruction data, base58 on the wire.
    #[serde(with = "base58_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InnerInstructionGroup {
    /// Index of the top-level instruction.
    pub index: usize,
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    /// Index into `Transaction::account_keys`.
    pub account_index: usize,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub decimals: u8,
    /// Raw amount as a decimal string.
    pub amount: String,
}

/// Raw account state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    pub owner: String,
    pub lamports: u64,
    /// Account data, base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// One delivery from a logs subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogNotification {
    pub signature: String,
    #[serde(default)]
    pub err: Option<serde_json::Value>,
    #[serde(default)]
    pub logs: Vec<String>,
}

/// One delivery from an account subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountChange {
    pub address: String,
    pub slot: u64,
    pub account: AccountData,
}

mod base58_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&bs58::encode(bytes).into_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        bs58::decode(&encoded)
            .into_vec()
            .map_err(serde::de::Error::custom)
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;

    #[test]
    fn transaction_json_decodes_encoded_payloads() {
        let json = r#"{
            "signature": "sig",
            "slot": 7,
            "accountKeys": ["A", "B"],
            "instructions": [{"programId": "P", "accounts": ["A"], "data": "2VfUX"}],
            "innerInstructions": [{"index": 0, "instructions": []}],
            "preBalances": [10, 500],
            "postBalances": [10, 200],
            "preTokenBalances": [{"accountIndex": 1, "mint": "M", "decimals": 6, "amount": "5"}]
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        let data = bs58::decode("2VfUX").into_vec().unwrap();
        assert_eq!(tx.instructions[0].data, data);
        assert!(tx.inner_group(0).is_empty());
        assert!(tx.inner_group(3).is_empty());
        assert_eq!(tx.lamport_delta(1), Some(300));
        assert_eq!(tx.lamport_delta(2), None);
        assert_eq!(tx.token_account_mint("B"), Some(("M", 6)));
        assert_eq!(tx.mint_decimals("M"), Some(6));
        assert!(!tx.is_failed());
    }

    #[test]
    fn account_data_is_base64() {
        let account: AccountData =
            serde_json::from_str(r#"{"owner": "O", "lamports": 1, "data": "AQID"}"#).unwrap();
        assert_eq!(account.data, vec![1, 2, 3]);
        let back = serde_json::to_value(&account).unwrap();
        assert_eq!(back["data"], "AQID");
    }
}
