pub mod correlator;
pub mod ledger;
pub mod watch;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::DecoderConfig;
use crate::decode::{DecodedRecord, PayloadOrigin, RawPayload, decode_account, decode_payload};
use crate::error::Error;
use crate::protocols::builtin_schemas;
use crate::schema::idl::schema_from_idl_with_len;
use crate::schema::registry::{AllowlistSource, SchemaRegistry, SchemaSource};
use crate::types::{AccountChange, AccountData};
use correlator::{TransactionCorrelator, TransactionReport};
use ledger::LedgerClient;

/// Fetch, correlate, decode and extract, with a shared schema cache.
pub struct DecoderPipeline {
    config: DecoderConfig,
    ledger: Arc<dyn LedgerClient>,
    registry: Arc<SchemaRegistry>,
}

impl DecoderPipeline {
    /// Built-in schemas are preloaded; anything else is asked of `source`, but only for
    /// programs listed in `config.known_programs`.
    pub fn new(
        config: DecoderConfig,
        ledger: Arc<dyn LedgerClient>,
        source: Arc<dyn SchemaSource>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let allowlist = AllowlistSource::new(config.known_programs.iter().cloned(), source);
        let registry = SchemaRegistry::new(Arc::new(allowlist), config.schema_fetch_timeout());
        let builtins = builtin_schemas()?;
        info!(count = builtins.len(), "preloading built-in schemas");
        registry.preload_all(builtins);
        Ok(Self {
            config,
            ledger,
            registry: Arc::new(registry),
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Parses an Anchor IDL with the configured discriminator width and caches it.
    pub fn register_idl(&self, program_id: &str, idl_json: &str) -> Result<(), Error> {
        let idl: serde_json::Value = serde_json::from_str(idl_json)?;
        let schema = schema_from_idl_with_len(program_id, &idl, self.config.discriminator_len)?;
        self.registry.preload(schema);
        Ok(())
    }

    pub async fn process_transaction(&self, signature: &str) -> Result<TransactionReport, Error> {
        let tx = self
            .bounded(
                "fetch_transaction",
                self.ledger.fetch_transaction(signature),
            )
            .await?
            .ok_or_else(|| Error::TransactionNotFound {
                signature: signature.to_string(),
            })?;

        let report = TransactionCorrelator::new(&self.registry, self.config.decode_logs)
            .correlate(&tx)
            .await;
        debug!(
            %signature,
            positions = report.positions.len(),
            events = report.events.len(),
            "transaction processed"
        );
        Ok(report)
    }

    /// Decodes a buffer with no known origin: instruction layouts are tried first, then
    /// events, then accounts.
    pub async fn decode_raw_payload(
        &self,
        program_id: &str,
        bytes: &[u8],
    ) -> Result<Option<DecodedRecord>, Error> {
        let schema = self
            .registry
            .resolve(program_id)
            .await?
            .ok_or_else(|| Error::SchemaNotFound {
                program_id: program_id.to_string(),
            })?;

        for origin in [
            PayloadOrigin::TopLevel { index: 0 },
            PayloadOrigin::Log {
                top_level: None,
                index: 0,
            },
            PayloadOrigin::Account,
        ] {
            let payload = RawPayload {
                program_id,
                data: bytes,
                accounts: &[],
                origin,
                signature: None,
            };
            if let Some(record) = decode_payload(&schema, &payload)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Fetches an account and decodes it with its owner's schema.
    pub async fn decode_account_at(&self, address: &str) -> Result<Option<DecodedRecord>, Error> {
        let Some(account) = self
            .bounded("fetch_account", self.ledger.fetch_account(address))
            .await?
        else {
            return Ok(None);
        };
        self.decode_account_data(&account).await
    }

    pub async fn decode_account_change(
        &self,
        change: &AccountChange,
    ) -> Result<Option<DecodedRecord>, Error> {
        self.decode_account_data(&change.account).await
    }

    async fn decode_account_data(
        &self,
        account: &AccountData,
    ) -> Result<Option<DecodedRecord>, Error> {
        let Some(schema) = self.registry.resolve(&account.owner).await? else {
            return Ok(None);
        };
        decode_account(&schema, &account.data)
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        let limit = self.config.ledger_timeout();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| timed_out(operation, limit))?
    }
}

fn timed_out(operation: &str, limit: Duration) -> Error {
    Error::Ledger {
        reason: format!("{operation} timed out after {}ms", limit.as_millis()),
    }
}
