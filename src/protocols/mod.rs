pub mod pumpfun;
pub mod raydium;
pub mod spl_token;
pub mod system;

use serde::Serialize;

use crate::error::Error;
use crate::schema::ProgramSchema;

pub const PUMPFUN_PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
pub const RAYDIUM_AMM_V4_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const SPL_TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const JUPITER_V6_PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";
pub const ORCA_WHIRLPOOL_PROGRAM_ID: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";
pub const METEORA_DLMM_PROGRAM_ID: &str = "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo";

/// Programs with a built-in schema and extractor.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::AsRefStr,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Protocol {
    PumpFun,
    RaydiumAmmV4,
    SplToken,
    System,
}

impl Protocol {
    pub fn from_program_id(program_id: &str) -> Option<Self> {
        match program_id {
            PUMPFUN_PROGRAM_ID => Some(Self::PumpFun),
            RAYDIUM_AMM_V4_PROGRAM_ID => Some(Self::RaydiumAmmV4),
            SPL_TOKEN_PROGRAM_ID => Some(Self::SplToken),
            SYSTEM_PROGRAM_ID => Some(Self::System),
            _ => None,
        }
    }

    pub fn program_id(self) -> &'static str {
        match self {
            Self::PumpFun => PUMPFUN_PROGRAM_ID,
            Self::RaydiumAmmV4 => RAYDIUM_AMM_V4_PROGRAM_ID,
            Self::SplToken => SPL_TOKEN_PROGRAM_ID,
            Self::System => SYSTEM_PROGRAM_ID,
        }
    }

    /// Token and lamport plumbing that other programs call into. Never the point of a
    /// position that reaches it only through CPI.
    pub fn is_utility(self) -> bool {
        matches!(self, Self::SplToken | Self::System)
    }

    pub fn schema(self) -> Result<ProgramSchema, Error> {
        match self {
            Self::PumpFun => pumpfun::schema(),
            Self::RaydiumAmmV4 => raydium::schema(),
            Self::SplToken => spl_token::schema(),
            Self::System => system::schema(),
        }
    }

    pub fn all_program_ids() -> &'static [&'static str] {
        &[
            PUMPFUN_PROGRAM_ID,
            RAYDIUM_AMM_V4_PROGRAM_ID,
            SPL_TOKEN_PROGRAM_ID,
            SYSTEM_PROGRAM_ID,
        ]
    }
}

pub fn builtin_schemas() -> Result<Vec<ProgramSchema>, Error> {
    use strum::IntoEnumIterator;
    Protocol::iter().map(Protocol::schema).collect()
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;

    #[test]
    fn builtin_schemas_build_and_match_their_protocol() {
        let schemas = builtin_schemas().unwrap();
        assert_eq!(schemas.len(), Protocol::all_program_ids().len());
        for schema in &schemas {
            let protocol = Protocol::from_program_id(&schema.program_id).unwrap();
            assert_eq!(protocol.program_id(), schema.program_id);
        }
    }

    #[test]
    fn protocol_names() {
        assert_eq!(Protocol::PumpFun.as_ref(), "pump_fun");
        assert_eq!(Protocol::RaydiumAmmV4.as_ref(), "raydium_amm_v4");
        assert_eq!(
            serde_json::to_value(Protocol::SplToken).unwrap(),
            serde_json::json!("spl_token")
        );
        assert_eq!(Protocol::from_program_id(JUPITER_V6_PROGRAM_ID), None);
    }

    #[test]
    fn only_token_and_system_are_utilities() {
        assert!(Protocol::SplToken.is_utility());
        assert!(Protocol::System.is_utility());
        assert!(!Protocol::PumpFun.is_utility());
        assert!(!Protocol::RaydiumAmmV4.is_utility());
    }
}
