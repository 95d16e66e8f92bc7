#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("schema fetch failed for {program_id}: {reason}")]
    SchemaFetch { program_id: String, reason: String },

    #[error("no schema published for program {program_id}")]
    SchemaNotFound { program_id: String },

    #[error(
        "truncated data reading field '{field}' at offset {offset}: need {needed} bytes, {remaining} remaining"
    )]
    TruncatedData {
        field: String,
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("fixed layout '{layout}' expects exactly {expected} bytes, got {actual}")]
    LengthMismatch {
        layout: String,
        expected: usize,
        actual: usize,
    },

    #[error("decode error in field '{field}': {reason}")]
    Decode { field: String, reason: String },

    #[error("duplicate discriminator {discriminator:?} in {program_id}: '{first}' and '{second}'")]
    DuplicateDiscriminator {
        program_id: String,
        discriminator: Vec<u8>,
        first: String,
        second: String,
    },

    #[error("invalid schema for {program_id}: {reason}")]
    Schema { program_id: String, reason: String },

    #[error("idl error: {reason}")]
    Idl { reason: String },

    #[error("ledger error: {reason}")]
    Ledger { reason: String },

    #[error("transaction not found: {signature}")]
    TransactionNotFound { signature: String },

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error("config error: {reason}")]
    Config { reason: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Transient failures a caller may retry; everything else is a property of the data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SchemaFetch { .. } | Self::Ledger { .. })
    }
}
