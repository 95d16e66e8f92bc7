use crate::decode::{DecodedRecord, FieldValue};
use crate::error::Error;
use crate::extract::{
    Amount, EventExtractor, EventPayload, ExtractionContext, SemanticEvent, TradeDirection,
    required_account,
};
use crate::protocols::{PUMPFUN_PROGRAM_ID, Protocol};
use crate::schema::{FieldKind, FieldSpec, Layout, ProgramSchema, anchor_discriminator};

pub const BUY: &str = "buy";
pub const SELL: &str = "sell";
pub const CREATE: &str = "create";
pub const TRADE_EVENT: &str = "TradeEvent";
pub const CREATE_EVENT: &str = "CreateEvent";
pub const BONDING_CURVE: &str = "BondingCurve";

/// Instruction account positions shared by `buy` and `sell`.
pub const MINT_ACCOUNT_INDEX: usize = 2;
pub const BONDING_CURVE_ACCOUNT_INDEX: usize = 3;
pub const TRADER_ACCOUNT_INDEX: usize = 6;

/// Every pump.fun mint is created with 6 decimals.
pub const TOKEN_DECIMALS: u8 = 6;

/// Early `CreateEvent`s: three keys, then 16- and 9-byte NUL padded name and symbol.
pub const LEGACY_CREATE_EVENT_LEN: usize = 129;

const BUY_ACCOUNTS: &[&str] = &[
    "global",
    "feeRecipient",
    "mint",
    "bondingCurve",
    "associatedBondingCurve",
    "associatedUser",
    "user",
    "systemProgram",
    "tokenProgram",
    "rent",
    "eventAuthority",
    "program",
];

const SELL_ACCOUNTS: &[&str] = &[
    "global",
    "feeRecipient",
    "mint",
    "bondingCurve",
    "associatedBondingCurve",
    "associatedUser",
    "user",
    "systemProgram",
    "associatedTokenProgram",
    "tokenProgram",
    "eventAuthority",
    "program",
];

const CREATE_ACCOUNTS: &[&str] = &[
    "mint",
    "mintAuthority",
    "bondingCurve",
    "associatedBondingCurve",
    "global",
    "mplTokenMetadata",
    "metadata",
    "user",
    "systemProgram",
    "tokenProgram",
    "associatedTokenProgram",
    "rent",
    "eventAuthority",
    "program",
];

fn u64_field(name: &str) -> FieldSpec {
    FieldSpec::new(name, FieldKind::U64)
}

fn pubkey(name: &str) -> FieldSpec {
    FieldSpec::new(name, FieldKind::PublicKey)
}

fn string(name: &str) -> FieldSpec {
    FieldSpec::new(name, FieldKind::String)
}

pub fn schema() -> Result<ProgramSchema, Error> {
    ProgramSchema::builder(PUMPFUN_PROGRAM_ID)
        .name("pump")
        .instruction(
            Layout::new(
                BUY,
                &anchor_discriminator("global", BUY),
                vec![u64_field("amount"), u64_field("maxSolCost")],
            )
            .with_accounts(BUY_ACCOUNTS),
        )
        .instruction(
            Layout::new(
                SELL,
                &anchor_discriminator("global", SELL),
                vec![u64_field("amount"), u64_field("minSolOutput")],
            )
            .with_accounts(SELL_ACCOUNTS),
        )
        .instruction(
            Layout::new(
                CREATE,
                &anchor_discriminator("global", CREATE),
                vec![string("name"), string("symbol"), string("uri")],
            )
            .with_accounts(CREATE_ACCOUNTS),
        )
        .event(Layout::new(
            TRADE_EVENT,
            &anchor_discriminator("event", TRADE_EVENT),
            vec![
                pubkey("mint"),
                u64_field("solAmount"),
                u64_field("tokenAmount"),
                FieldSpec::new("isBuy", FieldKind::Bool),
                pubkey("user"),
                FieldSpec::new("timestamp", FieldKind::I64),
                u64_field("virtualSolReserves"),
                u64_field("virtualTokenReserves"),
            ],
        ))
        .event(Layout::new(
            CREATE_EVENT,
            &anchor_discriminator("event", CREATE_EVENT),
            vec![
                string("name"),
                string("symbol"),
                string("uri"),
                pubkey("mint"),
                pubkey("bondingCurve"),
                pubkey("user"),
            ],
        ))
        .event(
            Layout::new(
                CREATE_EVENT,
                &anchor_discriminator("event", CREATE_EVENT),
                vec![
                    pubkey("mint"),
                    pubkey("bondingCurve"),
                    pubkey("user"),
                    FieldSpec::new("name", FieldKind::FixedText(16)),
                    FieldSpec::new("symbol", FieldKind::FixedText(9)),
                ],
            )
            .fixed(LEGACY_CREATE_EVENT_LEN),
        )
        .account(Layout::new(
            BONDING_CURVE,
            &anchor_discriminator("account", BONDING_CURVE),
            vec![
                u64_field("virtualTokenReserves"),
                u64_field("virtualSolReserves"),
                u64_field("realTokenReserves"),
                u64_field("realSolReserves"),
                u64_field("tokenTotalSupply"),
                FieldSpec::new("complete", FieldKind::Bool),
            ],
        ))
        .build()
}

pub struct PumpFunExtractor;

impl PumpFunExtractor {
    /// SOL moved is the bonding curve's lamport change; the instruction only carries a bound.
    fn trade(
        ctx: &ExtractionContext<'_>,
        record: &DecodedRecord,
        direction: TradeDirection,
    ) -> Result<SemanticEvent, Error> {
        let mint = required_account(record, MINT_ACCOUNT_INDEX, "mint")?;
        let bonding_curve =
            required_account(record, BONDING_CURVE_ACCOUNT_INDEX, "bonding curve")?;
        let trader = required_account(record, TRADER_ACCOUNT_INDEX, "user")?;
        let token_amount = record.u64_field("amount")?;
        let sol_amount = ctx.lamport_delta_of(bonding_curve)?;

        Ok(ctx.event(
            Protocol::PumpFun,
            Some(mint.to_string()),
            Some(trader.to_string()),
            vec![bonding_curve.to_string()],
            EventPayload::Trade {
                direction,
                token_amount: Amount::new(token_amount, TOKEN_DECIMALS),
                sol_amount: Amount::lamports(sol_amount),
                bonding_curve: bonding_curve.to_string(),
            },
        ))
    }

    fn create(ctx: &ExtractionContext<'_>, record: &DecodedRecord) -> Result<SemanticEvent, Error> {
        let mint = record.str_field("mint")?;
        let bonding_curve = record.str_field("bondingCurve")?;
        let user = record.str_field("user")?;
        let uri = record
            .get("uri")
            .and_then(FieldValue::as_str)
            .map(str::to_string);

        Ok(ctx.event(
            Protocol::PumpFun,
            Some(mint.to_string()),
            Some(user.to_string()),
            vec![bonding_curve.to_string()],
            EventPayload::Create {
                name: record.str_field("name")?.to_string(),
                symbol: record.str_field("symbol")?.to_string(),
                uri,
                bonding_curve: bonding_curve.to_string(),
            },
        ))
    }
}

impl EventExtractor for PumpFunExtractor {
    fn protocol(&self) -> Protocol {
        Protocol::PumpFun
    }

    fn extract(&self, ctx: &ExtractionContext<'_>) -> Vec<Result<SemanticEvent, Error>> {
        let trades = ctx
            .instructions_of(PUMPFUN_PROGRAM_ID)
            .filter_map(|record| match record.layout.as_str() {
                BUY => Some(Self::trade(ctx, record, TradeDirection::Buy)),
                SELL => Some(Self::trade(ctx, record, TradeDirection::Sell)),
                _ => None,
            });
        let creates = ctx
            .events_of(PUMPFUN_PROGRAM_ID)
            .filter(|record| record.layout == CREATE_EVENT)
            .map(|record| Self::create(ctx, record));
        trades.chain(creates).collect()
    }
}
