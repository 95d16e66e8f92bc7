use crate::decode::DecodedRecord;
use crate::error::Error;
use crate::extract::{
    Amount, EventExtractor, EventPayload, ExtractionContext, SemanticEvent, is_top_level,
    required_account,
};
use crate::protocols::{Protocol, SYSTEM_PROGRAM_ID};
use crate::schema::{FieldKind, FieldSpec, Layout, ProgramSchema};

pub const TRANSFER: &str = "transfer";

/// The system program tags instructions with a little-endian u32.
const TRANSFER_DISCRIMINATOR: [u8; 4] = 2_u32.to_le_bytes();

pub const FROM_ACCOUNT_INDEX: usize = 0;
pub const TO_ACCOUNT_INDEX: usize = 1;

pub fn schema() -> Result<ProgramSchema, Error> {
    ProgramSchema::builder(SYSTEM_PROGRAM_ID)
        .name("system")
        .discriminator_len(TRANSFER_DISCRIMINATOR.len())
        .instruction(
            Layout::new(
                TRANSFER,
                &TRANSFER_DISCRIMINATOR,
                vec![FieldSpec::new("lamports", FieldKind::U64)],
            )
            .with_accounts(&["from", "to"]),
        )
        .build()
}

pub struct SystemExtractor;

impl SystemExtractor {
    fn transfer(
        ctx: &ExtractionContext<'_>,
        record: &DecodedRecord,
    ) -> Result<SemanticEvent, Error> {
        let from = required_account(record, FROM_ACCOUNT_INDEX, "from")?;
        let to = required_account(record, TO_ACCOUNT_INDEX, "to")?;
        Ok(ctx.event(
            Protocol::System,
            None,
            Some(from.to_string()),
            Vec::new(),
            EventPayload::Transfer {
                source: from.to_string(),
                destination: to.to_string(),
                amount: Amount::lamports(record.u64_field("lamports")?),
                mint: None,
                authority: Some(from.to_string()),
            },
        ))
    }
}

impl EventExtractor for SystemExtractor {
    fn protocol(&self) -> Protocol {
        Protocol::System
    }

    fn extract(&self, ctx: &ExtractionContext<'_>) -> Vec<Result<SemanticEvent, Error>> {
        ctx.instructions_of(SYSTEM_PROGRAM_ID)
            .filter(|record| is_top_level(record) && record.layout == TRANSFER)
            .map(|record| Self::transfer(ctx, record))
            .collect()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;
    use crate::decode::{PayloadOrigin, RawPayload, decode_payload};
    use crate::types::Transaction;

    #[test]
    fn top_level_transfer_becomes_sol_transfer() {
        let schema = schema().unwrap();
        let mut data = vec![2, 0, 0, 0];
        data.extend_from_slice(&1_500_000_000_u64.to_le_bytes());
        let accounts = vec!["alice".to_string(), "bob".to_string()];
        let payload = |origin| RawPayload {
            program_id: SYSTEM_PROGRAM_ID,
            data: &data,
            accounts: &accounts,
            origin,
            signature: None,
        };
        let records = [
            decode_payload(&schema, &payload(PayloadOrigin::TopLevel { index: 0 }))
                .unwrap()
                .unwrap(),
            decode_payload(
                &schema,
                &payload(PayloadOrigin::Inner {
                    top_level: 0,
                    index: 0,
                }),
            )
            .unwrap()
            .unwrap(),
        ];
        let tx = Transaction::default();
        let ctx = ExtractionContext {
            transaction: &tx,
            position: 0,
            records: &records,
        };

        let events: Vec<_> = SystemExtractor.extract(&ctx);
        assert_eq!(events.len(), 1);
        let event = events.into_iter().next().unwrap().unwrap();
        assert_eq!(event.trader.as_deref(), Some("alice"));
        let EventPayload::Transfer {
            amount,
            destination,
            ..
        } = event.payload
        else {
            unreachable!("system extractor only emits transfers");
        };
        assert_eq!(amount.to_string(), "1.5");
        assert_eq!(destination, "bob");
    }

    #[test]
    fn create_account_is_not_a_transfer() {
        let schema = schema().unwrap();
        let data = [0u8, 0, 0, 0, 1, 2, 3];
        let record = crate::decode::decode_instruction(&schema, &data, &[]).unwrap();
        assert!(record.is_none());
    }
}
