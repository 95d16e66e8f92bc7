use crate::decode::{DecodedRecord, FieldValue};
use crate::error::Error;
use crate::extract::{
    Amount, EventExtractor, EventPayload, ExtractionContext, SemanticEvent, is_top_level,
    required_account,
};
use crate::protocols::{Protocol, SPL_TOKEN_PROGRAM_ID};
use crate::schema::{FieldKind, FieldSpec, Layout, ProgramSchema};

pub const TRANSFER: &str = "transfer";
pub const TRANSFER_CHECKED: &str = "transferChecked";

const TRANSFER_DISCRIMINATOR: u8 = 3;
const TRANSFER_CHECKED_DISCRIMINATOR: u8 = 12;

/// `transfer`: source, destination, authority.
pub const TRANSFER_SOURCE_INDEX: usize = 0;
pub const TRANSFER_DESTINATION_INDEX: usize = 1;
pub const TRANSFER_AUTHORITY_INDEX: usize = 2;

/// `transferChecked`: source, mint, destination, authority.
pub const CHECKED_SOURCE_INDEX: usize = 0;
pub const CHECKED_MINT_INDEX: usize = 1;
pub const CHECKED_DESTINATION_INDEX: usize = 2;
pub const CHECKED_AUTHORITY_INDEX: usize = 3;

pub fn schema() -> Result<ProgramSchema, Error> {
    ProgramSchema::builder(SPL_TOKEN_PROGRAM_ID)
        .name("spl_token")
        .discriminator_len(1)
        .instruction(
            Layout::new(
                TRANSFER,
                &[TRANSFER_DISCRIMINATOR],
                vec![FieldSpec::new("amount", FieldKind::U64)],
            )
            .with_accounts(&["source", "destination", "authority"]),
        )
        .instruction(
            Layout::new(
                TRANSFER_CHECKED,
                &[TRANSFER_CHECKED_DISCRIMINATOR],
                vec![
                    FieldSpec::new("amount", FieldKind::U64),
                    FieldSpec::new("decimals", FieldKind::U8),
                ],
            )
            .with_accounts(&["source", "mint", "destination", "authority"]),
        )
        .build()
}

/// A token movement read off a decoded `transfer` or `transferChecked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransfer<'a> {
    pub source: &'a str,
    pub destination: &'a str,
    pub authority: Option<&'a str>,
    /// Only `transferChecked` names the mint and decimals.
    pub mint: Option<&'a str>,
    pub decimals: Option<u8>,
    pub amount: u64,
}

/// `Ok(None)` for token instructions that are not transfers.
pub fn transfer_of(record: &DecodedRecord) -> Result<Option<TokenTransfer<'_>>, Error> {
    let transfer = match record.layout.as_str() {
        TRANSFER => TokenTransfer {
            source: required_account(record, TRANSFER_SOURCE_INDEX, "source")?,
            destination: required_account(record, TRANSFER_DESTINATION_INDEX, "destination")?,
            authority: record.account_at(TRANSFER_AUTHORITY_INDEX),
            mint: None,
            decimals: None,
            amount: record.u64_field("amount")?,
        },
        TRANSFER_CHECKED => TokenTransfer {
            source: required_account(record, CHECKED_SOURCE_INDEX, "source")?,
            destination: required_account(record, CHECKED_DESTINATION_INDEX, "destination")?,
            authority: record.account_at(CHECKED_AUTHORITY_INDEX),
            mint: record.account_at(CHECKED_MINT_INDEX),
            decimals: record
                .get("decimals")
                .and_then(FieldValue::as_u64)
                .and_then(|d| u8::try_from(d).ok()),
            amount: record.u64_field("amount")?,
        },
        _ => return Ok(None),
    };
    Ok(Some(transfer))
}

pub struct SplTokenExtractor;

impl SplTokenExtractor {
    /// Mint and decimals come from the instruction when checked, otherwise from the
    /// transaction's token balances. Unknown decimals fall back to 0.
    fn transfer(
        ctx: &ExtractionContext<'_>,
        transfer: &TokenTransfer<'_>,
    ) -> Result<SemanticEvent, Error> {
        let from_balances = ctx.transaction.token_account_mint(transfer.source);
        let mint = transfer.mint.or(from_balances.map(|(m, _)| m));
        let decimals = transfer
            .decimals
            .or_else(|| mint.and_then(|m| ctx.transaction.mint_decimals(m)))
            .unwrap_or_default();

        Ok(ctx.event(
            Protocol::SplToken,
            mint.map(str::to_string),
            transfer.authority.map(str::to_string),
            Vec::new(),
            EventPayload::Transfer {
                source: transfer.source.to_string(),
                destination: transfer.destination.to_string(),
                amount: Amount::new(transfer.amount, decimals),
                mint: mint.map(str::to_string),
                authority: transfer.authority.map(str::to_string),
            },
        ))
    }
}

impl EventExtractor for SplTokenExtractor {
    fn protocol(&self) -> Protocol {
        Protocol::SplToken
    }

    fn extract(&self, ctx: &ExtractionContext<'_>) -> Vec<Result<SemanticEvent, Error>> {
        ctx.instructions_of(SPL_TOKEN_PROGRAM_ID)
            .filter(|record| is_top_level(record))
            .filter_map(|record| match transfer_of(record) {
                Ok(Some(transfer)) => Some(Self::transfer(ctx, &transfer)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            })
            .collect()
    }
}
