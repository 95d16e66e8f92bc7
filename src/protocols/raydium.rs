//! Raydium AMM v4. Swaps carry only bounds, so the amounts come from the two SPL Token
//! transfers the program makes while executing the swap.

use crate::decode::DecodedRecord;
use crate::error::Error;
use crate::extract::{
    Amount, EventExtractor, EventPayload, ExtractionContext, SemanticEvent, required_account,
};
use crate::protocols::spl_token::{self, TokenTransfer};
use crate::protocols::{Protocol, RAYDIUM_AMM_V4_PROGRAM_ID, SPL_TOKEN_PROGRAM_ID};
use crate::schema::{FieldKind, FieldSpec, Layout, LayoutKind, ProgramSchema};

pub const INITIALIZE2: &str = "initialize2";
pub const AMM_INFO: &str = "AmmInfo";
pub const SWAP_BASE_IN: &str = "swapBaseIn";
pub const SWAP_BASE_OUT: &str = "swapBaseOut";

const INITIALIZE2_DISCRIMINATOR: u8 = 1;
const SWAP_BASE_IN_DISCRIMINATOR: u8 = 9;
const SWAP_BASE_OUT_DISCRIMINATOR: u8 = 11;

/// Swap instruction position of the pool state account.
pub const SWAP_AMM_ACCOUNT_INDEX: usize = 1;

/// `initialize2` account positions.
pub const INIT_AMM_ACCOUNT_INDEX: usize = 4;
pub const INIT_LP_MINT_ACCOUNT_INDEX: usize = 7;
pub const INIT_COIN_MINT_ACCOUNT_INDEX: usize = 8;
pub const INIT_PC_MINT_ACCOUNT_INDEX: usize = 9;
pub const INIT_COIN_VAULT_ACCOUNT_INDEX: usize = 10;
pub const INIT_PC_VAULT_ACCOUNT_INDEX: usize = 11;
pub const INIT_USER_WALLET_ACCOUNT_INDEX: usize = 17;

/// Pool state accounts have no discriminator; they are recognised by size.
pub const AMM_INFO_LEN: usize = 752;

/// Transfers per swap, in execution order: user → pool, then pool → user.
const SWAP_LEGS: usize = 2;

const SWAP_ACCOUNTS: &[&str] = &[
    "tokenProgram",
    "amm",
    "ammAuthority",
    "ammOpenOrders",
    "ammTargetOrders",
    "poolCoinTokenAccount",
    "poolPcTokenAccount",
    "serumProgram",
    "serumMarket",
    "serumBids",
    "serumAsks",
    "serumEventQueue",
    "serumCoinVaultAccount",
    "serumPcVaultAccount",
    "serumVaultSigner",
    "userSourceTokenAccount",
    "userDestinationTokenAccount",
    "userSourceOwner",
];

const AMM_INFO_U64_FIELDS: &[&str] = &[
    "status",
    "nonce",
    "maxOrder",
    "depth",
    "baseDecimal",
    "quoteDecimal",
    "state",
    "resetFlag",
    "minSize",
    "volMaxCutRatio",
    "amountWaveRatio",
    "baseLotSize",
    "quoteLotSize",
    "minPriceMultiplier",
    "maxPriceMultiplier",
    "systemDecimalValue",
    "minSeparateNumerator",
    "minSeparateDenominator",
    "tradeFeeNumerator",
    "tradeFeeDenominator",
    "pnlNumerator",
    "pnlDenominator",
    "swapFeeNumerator",
    "swapFeeDenominator",
    "baseNeedTakePnl",
    "quoteNeedTakePnl",
    "quoteTotalPnl",
    "baseTotalPnl",
    "poolOpenTime",
    "punishPcAmount",
    "punishCoinAmount",
    "orderbookToInitTime",
];

const AMM_INFO_KEY_FIELDS: &[&str] = &[
    "baseVault",
    "quoteVault",
    "baseMint",
    "quoteMint",
    "lpMint",
    "openOrders",
    "marketId",
    "marketProgramId",
    "targetOrders",
    "withdrawQueue",
    "lpVault",
    "owner",
];

const INITIALIZE2_ACCOUNTS: &[&str] = &[
    "tokenProgram",
    "splAssociatedTokenAccount",
    "systemProgram",
    "rent",
    "amm",
    "ammAuthority",
    "ammOpenOrders",
    "lpMint",
    "coinMint",
    "pcMint",
    "poolCoinTokenAccount",
    "poolPcTokenAccount",
    "poolWithdrawQueue",
    "ammTargetOrders",
    "poolTempLp",
    "serumProgram",
    "serumMarket",
    "userWallet",
    "userTokenCoin",
    "userTokenPc",
    "userLpTokenAccount",
];

pub fn schema() -> Result<ProgramSchema, Error> {
    let u64_field = |name: &str| FieldSpec::new(name, FieldKind::U64);
    ProgramSchema::builder(RAYDIUM_AMM_V4_PROGRAM_ID)
        .name("raydium_amm")
        .discriminator_len(1)
        .instruction(
            Layout::new(
                INITIALIZE2,
                &[INITIALIZE2_DISCRIMINATOR],
                vec![
                    FieldSpec::new("nonce", FieldKind::U8),
                    u64_field("openTime"),
                    u64_field("initPcAmount"),
                    u64_field("initCoinAmount"),
                ],
            )
            .with_accounts(INITIALIZE2_ACCOUNTS),
        )
        .instruction(
            Layout::new(
                SWAP_BASE_IN,
                &[SWAP_BASE_IN_DISCRIMINATOR],
                vec![u64_field("amountIn"), u64_field("minimumAmountOut")],
            )
            .with_accounts(SWAP_ACCOUNTS),
        )
        .instruction(
            Layout::new(
                SWAP_BASE_OUT,
                &[SWAP_BASE_OUT_DISCRIMINATOR],
                vec![u64_field("maxAmountIn"), u64_field("amountOut")],
            )
            .with_accounts(SWAP_ACCOUNTS),
        )
        .account(amm_info_layout())
        .build()
}

/// Pool state as laid out by the on-chain program: 32 u64 parameters, swap totals, the
/// pool's keys, then reserve and padding.
fn amm_info_layout() -> Layout {
    let u64_field = |name: &str| FieldSpec::new(name, FieldKind::U64);
    let u128_field = |name: &str| FieldSpec::new(name, FieldKind::U128);
    let mut fields: Vec<FieldSpec> = AMM_INFO_U64_FIELDS.iter().map(|n| u64_field(n)).collect();
    fields.extend([
        u128_field("swapBaseInAmount"),
        u128_field("swapQuoteOutAmount"),
        u64_field("swapBase2QuoteFee"),
        u128_field("swapQuoteInAmount"),
        u128_field("swapBaseOutAmount"),
        u64_field("swapQuote2BaseFee"),
    ]);
    fields.extend(
        AMM_INFO_KEY_FIELDS
            .iter()
            .map(|n| FieldSpec::new(*n, FieldKind::PublicKey)),
    );
    fields.push(u64_field("lpReserve"));
    fields.push(FieldSpec::new(
        "padding",
        FieldKind::Array(Box::new(FieldKind::U64), 3),
    ));
    Layout::new(AMM_INFO, &[], fields).fixed(AMM_INFO_LEN)
}

pub struct RaydiumExtractor;

impl RaydiumExtractor {
    fn swap(
        ctx: &ExtractionContext<'_>,
        record: &DecodedRecord,
        legs: &[TokenTransfer<'_>],
    ) -> Result<SemanticEvent, Error> {
        let amm = required_account(record, SWAP_AMM_ACCOUNT_INDEX, "amm")?;
        let [inbound, outbound] = legs else {
            return Err(Error::Protocol {
                reason: format!(
                    "{} in position {} needs {SWAP_LEGS} token transfers, found {}",
                    record.layout,
                    ctx.position,
                    legs.len()
                ),
            });
        };

        let tx = ctx.transaction;
        let vault_in = inbound.destination;
        let vault_out = outbound.source;
        let mint_in = tx.token_account_mint(vault_in);
        let mint_out = tx.token_account_mint(vault_out);
        let decimals = |m: Option<(&str, u8)>, fallback: Option<u8>| {
            m.map(|(_, d)| d).or(fallback).unwrap_or_default()
        };

        Ok(ctx.event(
            Protocol::RaydiumAmmV4,
            mint_out.map(|(m, _)| m.to_string()),
            inbound.authority.map(str::to_string),
            vec![amm.to_string()],
            EventPayload::Swap {
                amm: amm.to_string(),
                amount_in: Amount::new(inbound.amount, decimals(mint_in, inbound.decimals)),
                amount_out: Amount::new(outbound.amount, decimals(mint_out, outbound.decimals)),
                mint_in: mint_in.map(|(m, _)| m.to_string()),
                mint_out: mint_out.map(|(m, _)| m.to_string()),
                vault_in: vault_in.to_string(),
                vault_out: vault_out.to_string(),
            },
        ))
    }

    fn pool_create(
        ctx: &ExtractionContext<'_>,
        record: &DecodedRecord,
    ) -> Result<SemanticEvent, Error> {
        let account = |index, role| required_account(record, index, role).map(str::to_string);
        let amm = account(INIT_AMM_ACCOUNT_INDEX, "amm")?;
        let coin_mint = account(INIT_COIN_MINT_ACCOUNT_INDEX, "coin mint")?;
        let payload = EventPayload::PoolCreate {
            amm: amm.clone(),
            lp_mint: account(INIT_LP_MINT_ACCOUNT_INDEX, "lp mint")?,
            coin_mint: coin_mint.clone(),
            pc_mint: account(INIT_PC_MINT_ACCOUNT_INDEX, "pc mint")?,
            coin_vault: account(INIT_COIN_VAULT_ACCOUNT_INDEX, "coin vault")?,
            pc_vault: account(INIT_PC_VAULT_ACCOUNT_INDEX, "pc vault")?,
        };
        let creator = record
            .account_at(INIT_USER_WALLET_ACCOUNT_INDEX)
            .map(str::to_string);
        Ok(ctx.event(
            Protocol::RaydiumAmmV4,
            Some(coin_mint),
            creator,
            vec![amm],
            payload,
        ))
    }
}

impl EventExtractor for RaydiumExtractor {
    fn protocol(&self) -> Protocol {
        Protocol::RaydiumAmmV4
    }

    fn auxiliary_programs(&self) -> &'static [&'static str] {
        &[SPL_TOKEN_PROGRAM_ID]
    }

    /// Walks the position in execution order. Each swap takes the first [`SWAP_LEGS`] token
    /// transfers that follow it; transfers before a swap or past its legs belong to someone else.
    fn extract(&self, ctx: &ExtractionContext<'_>) -> Vec<Result<SemanticEvent, Error>> {
        let mut results = Vec::new();
        let mut pending: Option<(&DecodedRecord, Vec<TokenTransfer<'_>>)> = None;

        let instructions = ctx
            .records
            .iter()
            .filter(|r| r.kind == LayoutKind::Instruction);
        for record in instructions {
            match record.program_id.as_str() {
                RAYDIUM_AMM_V4_PROGRAM_ID => {
                    if let Some((swap, legs)) = pending.take() {
                        results.push(Self::swap(ctx, swap, &legs));
                    }
                    match record.layout.as_str() {
                        SWAP_BASE_IN | SWAP_BASE_OUT => {
                            pending = Some((record, Vec::with_capacity(SWAP_LEGS)));
                        }
                        INITIALIZE2 => results.push(Self::pool_create(ctx, record)),
                        _ => {}
                    }
                }
                SPL_TOKEN_PROGRAM_ID => match spl_token::transfer_of(record) {
                    Ok(Some(transfer)) => {
                        if let Some((_, legs)) = pending.as_mut()
                            && legs.len() < SWAP_LEGS
                        {
                            legs.push(transfer);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => results.push(Err(e)),
                },
                _ => {}
            }
        }

        if let Some((swap, legs)) = pending {
            results.push(Self::swap(ctx, swap, &legs));
        }
        results
    }
}
