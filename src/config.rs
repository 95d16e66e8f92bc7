use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::protocols::{
    JUPITER_V6_PROGRAM_ID, METEORA_DLMM_PROGRAM_ID, ORCA_WHIRLPOOL_PROGRAM_ID, PUMPFUN_PROGRAM_ID,
    RAYDIUM_AMM_V4_PROGRAM_ID, SPL_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID,
};
use crate::schema::DEFAULT_DISCRIMINATOR_LEN;

const MAX_DISCRIMINATOR_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Discriminator width assumed for IDL-derived schemas.
    pub discriminator_len: usize,
    pub schema_fetch_timeout_ms: u64,
    /// Bound on each `fetch_transaction` / `fetch_account` call.
    pub ledger_timeout_ms: u64,
    /// Programs the registry may ask the schema source about. Others resolve as absent.
    pub known_programs: Vec<String>,
    /// Decode `Program data:` log payloads as events.
    pub decode_logs: bool,
    /// Notifications processed at once by a watcher.
    pub max_in_flight: usize,
    /// Recent signatures remembered per watcher to drop redelivered notifications.
    pub dedup_window: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            discriminator_len: DEFAULT_DISCRIMINATOR_LEN,
            schema_fetch_timeout_ms: 10_000,
            ledger_timeout_ms: 15_000,
            known_programs: [
                PUMPFUN_PROGRAM_ID,
                RAYDIUM_AMM_V4_PROGRAM_ID,
                JUPITER_V6_PROGRAM_ID,
                ORCA_WHIRLPOOL_PROGRAM_ID,
                METEORA_DLMM_PROGRAM_ID,
                SPL_TOKEN_PROGRAM_ID,
                SYSTEM_PROGRAM_ID,
            ]
            .iter()
            .map(|id| (*id).to_string())
            .collect(),
            decode_logs: true,
            max_in_flight: 16,
            dedup_window: 4096,
        }
    }
}

impl DecoderConfig {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=MAX_DISCRIMINATOR_LEN).contains(&self.discriminator_len) {
            return Err(Error::Config {
                reason: format!(
                    "discriminator_len must be between 1 and {MAX_DISCRIMINATOR_LEN}, got {}",
                    self.discriminator_len
                ),
            });
        }
        if self.max_in_flight == 0 {
            return Err(Error::Config {
                reason: "max_in_flight must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn schema_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.schema_fetch_timeout_ms)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }
}
