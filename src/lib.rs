#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::dbg_macro,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::panic,
    )
)]

pub mod config;
pub mod decode;
pub mod error;
pub mod extract;
pub mod logs;
#[cfg(feature = "native")]
pub mod pipeline;
pub mod protocols;
pub mod schema;
pub mod types;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use config::DecoderConfig;
pub use decode::{
    DecodedField, DecodedRecord, FieldValue, NamedAccount, PayloadOrigin, RawPayload,
    decode_account, decode_event, decode_instruction, decode_payload,
};
pub use error::Error;
pub use extract::{
    Amount, EventExtractor, EventKind, EventPayload, ExtractionContext, SemanticEvent,
    TradeDirection, extractor_for,
};
#[cfg(feature = "native")]
pub use pipeline::DecoderPipeline;
#[cfg(feature = "native")]
pub use pipeline::correlator::{
    InstructionOutcome, PositionReport, TransactionCorrelator, TransactionReport,
};
#[cfg(feature = "native")]
pub use pipeline::ledger::{LedgerClient, LedgerSubscriber};
#[cfg(feature = "native")]
pub use pipeline::watch::{LogWatchOptions, watch_accounts, watch_logs};
pub use protocols::{Protocol, builtin_schemas};
#[cfg(feature = "native")]
pub use schema::registry::{AllowlistSource, SchemaRegistry, SchemaSource, StaticSchemaSource};
pub use schema::{
    FieldKind, FieldSpec, Layout, LayoutKind, LayoutShape, ProgramSchema, anchor_discriminator,
};
pub use types::{
    AccountChange, AccountData, CompiledInstruction, InnerInstructionGroup, LogNotification,
    TokenBalance, Transaction,
};
