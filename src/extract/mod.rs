//! Decoded records → normalized semantic events.
//!
//! Each supported protocol provides one [`EventExtractor`]. Extractors read fixed account
//! positions that are part of the program's published interface; every position an
//! extractor relies on is a named constant in its protocol module.

use std::fmt;

use serde::Serialize;
use serde::ser::SerializeStruct;

use crate::decode::{DecodedRecord, PayloadOrigin};
use crate::error::Error;
use crate::protocols::Protocol;
use crate::protocols::pumpfun::PumpFunExtractor;
use crate::protocols::raydium::RaydiumExtractor;
use crate::protocols::spl_token::SplTokenExtractor;
use crate::protocols::system::SystemExtractor;
use crate::schema::LayoutKind;
use crate::types::Transaction;

pub const SOL_DECIMALS: u8 = 9;

/// An integer token amount with the decimals needed to display it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Amount {
    pub raw: u64,
    pub decimals: u8,
}

impl Amount {
    pub fn new(raw: u64, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn lamports(raw: u64) -> Self {
        Self::new(raw, SOL_DECIMALS)
    }
}

/// Exact decimal rendering, trailing zeros trimmed: `Amount::new(1_500_000, 6)` is `1.5`.
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.raw.to_string();
        let decimals = usize::from(self.decimals);
        if decimals == 0 {
            return f.write_str(&digits);
        }
        let padded = format!("{digits:0>width$}", width = decimals + 1);
        let (whole, frac) = padded.split_at(padded.len() - decimals);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            f.write_str(whole)
        } else {
            write!(f, "{whole}.{frac}")
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Amount", 3)?;
        s.serialize_field("raw", &self.raw.to_string())?;
        s.serialize_field("decimals", &self.decimals)?;
        s.serialize_field("ui", &self.to_string())?;
        s.end()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Trade,
    Swap,
    Transfer,
    Create,
    PoolCreate,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventPayload {
    Trade {
        direction: TradeDirection,
        token_amount: Amount,
        sol_amount: Amount,
        bonding_curve: String,
    },
    Swap {
        amm: String,
        amount_in: Amount,
        amount_out: Amount,
        mint_in: Option<String>,
        mint_out: Option<String>,
        vault_in: String,
        vault_out: String,
    },
    Transfer {
        source: String,
        destination: String,
        amount: Amount,
        mint: Option<String>,
        authority: Option<String>,
    },
    Create {
        name: String,
        symbol: String,
        uri: Option<String>,
        bonding_curve: String,
    },
    PoolCreate {
        amm: String,
        lp_mint: String,
        coin_mint: String,
        pc_mint: String,
        coin_vault: String,
        pc_vault: String,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Trade { .. } => EventKind::Trade,
            Self::Swap { .. } => EventKind::Swap,
            Self::Transfer { .. } => EventKind::Transfer,
            Self::Create { .. } => EventKind::Create,
            Self::PoolCreate { .. } => EventKind::PoolCreate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticEvent {
    pub kind: EventKind,
    pub protocol: Protocol,
    pub program_id: String,
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// Top-level instruction index the event came from.
    pub position: usize,
    pub mint: Option<String>,
    pub trader: Option<String>,
    pub pools: Vec<String>,
    pub payload: EventPayload,
}

/// Everything an extractor sees for one top-level position.
pub struct ExtractionContext<'a> {
    pub transaction: &'a Transaction,
    pub position: usize,
    /// Decoded records of the position's active program and the extractor's auxiliary
    /// programs: instructions in execution order, then log events.
    pub records: &'a [DecodedRecord],
}

impl<'a> ExtractionContext<'a> {
    /// Starts an event stamped with this transaction and position.
    pub fn event(
        &self,
        protocol: Protocol,
        mint: Option<String>,
        trader: Option<String>,
        pools: Vec<String>,
        payload: EventPayload,
    ) -> SemanticEvent {
        SemanticEvent {
            kind: payload.kind(),
            protocol,
            program_id: protocol.program_id().to_string(),
            signature: self.transaction.signature.clone(),
            slot: self.transaction.slot,
            block_time: self.transaction.block_time,
            position: self.position,
            mint,
            trader,
            pools,
            payload,
        }
    }

    pub fn instructions_of(&self, program_id: &'a str) -> impl Iterator<Item = &'a DecodedRecord> {
        self.records
            .iter()
            .filter(move |r| r.kind == LayoutKind::Instruction && r.program_id == program_id)
    }

    pub fn events_of(&self, program_id: &'a str) -> impl Iterator<Item = &'a DecodedRecord> {
        self.records
            .iter()
            .filter(move |r| r.kind == LayoutKind::Event && r.program_id == program_id)
    }

    /// Lamport change of `pubkey` across the transaction.
    pub fn lamport_delta_of(&self, pubkey: &str) -> Result<u64, Error> {
        let index = self
            .transaction
            .account_index(pubkey)
            .ok_or_else(|| Error::Protocol {
                reason: format!("account {pubkey} is not in the transaction's account keys"),
            })?;
        self.transaction
            .lamport_delta(index)
            .ok_or_else(|| Error::Protocol {
                reason: format!("no balance snapshot for account index {index}"),
            })
    }
}

/// Account at a fixed instruction position, or a protocol error naming it.
pub fn required_account<'r>(
    record: &'r DecodedRecord,
    index: usize,
    role: &str,
) -> Result<&'r str, Error> {
    record.account_at(index).ok_or_else(|| Error::Protocol {
        reason: format!(
            "{} has {} accounts, {role} expected at index {index}",
            record.layout,
            record.accounts.len()
        ),
    })
}

pub fn is_top_level(record: &DecodedRecord) -> bool {
    matches!(record.origin, PayloadOrigin::TopLevel { .. })
}

pub trait EventExtractor: Sync {
    fn protocol(&self) -> Protocol;

    /// Other programs whose instructions in the same position this extractor reads.
    fn auxiliary_programs(&self) -> &'static [&'static str] {
        &[]
    }

    fn extract(&self, ctx: &ExtractionContext<'_>) -> Vec<Result<SemanticEvent, Error>>;
}

pub fn extractor_for(protocol: Protocol) -> &'static dyn EventExtractor {
    match protocol {
        Protocol::PumpFun => &PumpFunExtractor,
        Protocol::RaydiumAmmV4 => &RaydiumExtractor,
        Protocol::SplToken => &SplTokenExtractor,
        Protocol::System => &SystemExtractor,
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;

    #[test]
    fn amount_renders_exact_decimals() {
        assert_eq!(Amount::lamports(5_000_000_000).to_string(), "5");
        assert_eq!(Amount::new(100_000, 6).to_string(), "0.1");
        assert_eq!(Amount::new(1, 9).to_string(), "0.000000001");
        assert_eq!(Amount::new(123_456_789, 3).to_string(), "123456.789");
        assert_eq!(Amount::new(0, 6).to_string(), "0");
        assert_eq!(Amount::new(42, 0).to_string(), "42");
        assert_eq!(
            Amount::new(u64::MAX, 9).to_string(),
            "18446744073.709551615"
        );
    }

    #[test]
    fn amount_serializes_raw_as_string() {
        let json = serde_json::to_value(Amount::new(1_500_000, 6)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"raw": "1500000", "decimals": 6, "ui": "1.5"})
        );
    }

    #[test]
    fn payload_kind_and_tag_agree() {
        let payload = EventPayload::PoolCreate {
            amm: "a".into(),
            lp_mint: "l".into(),
            coin_mint: "c".into(),
            pc_mint: "p".into(),
            coin_vault: "cv".into(),
            pc_vault: "pv".into(),
        };
        assert_eq!(payload.kind(), EventKind::PoolCreate);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], payload.kind().as_ref());
        assert_eq!(json["lpMint"], "l");
    }

    #[test]
    fn every_protocol_has_an_extractor() {
        use strum::IntoEnumIterator;
        for protocol in Protocol::iter() {
            assert_eq!(extractor_for(protocol).protocol(), protocol);
        }
    }
}
