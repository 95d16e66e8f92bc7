//! Schema-driven decoding of raw payloads into named fields.
//!
//! [`decode_payload`] is pure: it picks the layout family from the payload origin, dispatches
//! on the discriminator and decodes the fields in wire order. `Ok(None)` means no layout
//! claimed the buffer.

pub mod cursor;
pub mod dispatch;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::Error;
use crate::schema::{LayoutKind, LayoutShape, ProgramSchema};
use cursor::{ByteCursor, decode_fields};

/// Where a payload sits inside a transaction, or that it came from account data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum PayloadOrigin {
    TopLevel {
        index: usize,
    },
    Inner {
        top_level: usize,
        index: usize,
    },
    /// `index` counts `Program data:` lines in the transaction's logs.
    Log {
        top_level: Option<usize>,
        index: usize,
    },
    Account,
}

impl PayloadOrigin {
    pub fn top_level(&self) -> Option<usize> {
        match self {
            Self::TopLevel { index } => Some(*index),
            Self::Inner { top_level, .. } => Some(*top_level),
            Self::Log { top_level, .. } => *top_level,
            Self::Account => None,
        }
    }

    pub fn layout_kind(&self) -> LayoutKind {
        match self {
            Self::TopLevel { .. } | Self::Inner { .. } => LayoutKind::Instruction,
            Self::Log { .. } => LayoutKind::Event,
            Self::Account => LayoutKind::Account,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RawPayload<'a> {
    pub program_id: &'a str,
    pub data: &'a [u8],
    /// Instruction account keys in instruction order; empty for events and accounts.
    pub accounts: &'a [String],
    pub origin: PayloadOrigin,
    pub signature: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    /// Integers up to 32 bits.
    Number(i64),
    /// 64 and 128 bit integers as decimal strings.
    BigInt(String),
    Text(String),
    PublicKey(String),
    Bytes(Vec<u8>),
    List(Vec<FieldValue>),
    Struct(Vec<DecodedField>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::PublicKey(s) | Self::BigInt(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => u64::try_from(*n).ok(),
            Self::BigInt(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => serializer.serialize_i64(*n),
            Self::BigInt(s) | Self::Text(s) | Self::PublicKey(s) => serializer.serialize_str(s),
            Self::Bytes(bytes) => bytes.serialize(serializer),
            Self::List(items) => items.serialize(serializer),
            Self::Struct(fields) => serialize_fields(fields, serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedField {
    pub name: String,
    pub value: FieldValue,
}

/// Decoded fields serialize as a JSON object in wire order.
fn serialize_fields<S: Serializer>(
    fields: &[DecodedField],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len()))?;
    for field in fields {
        map.serialize_entry(&field.name, &field.value)?;
    }
    map.end()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedAccount {
    /// Role from the layout; `None` for accounts past the declared list.
    pub role: Option<String>,
    pub pubkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedRecord {
    pub program_id: String,
    pub layout: String,
    pub kind: LayoutKind,
    #[serde(serialize_with = "serialize_fields")]
    pub fields: Vec<DecodedField>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<NamedAccount>,
    pub origin: PayloadOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl DecodedRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    pub fn account(&self, role: &str) -> Option<&str> {
        self.accounts
            .iter()
            .find(|a| a.role.as_deref() == Some(role))
            .map(|a| a.pubkey.as_str())
    }

    pub fn account_at(&self, index: usize) -> Option<&str> {
        self.accounts.get(index).map(|a| a.pubkey.as_str())
    }

    pub fn u64_field(&self, name: &str) -> Result<u64, Error> {
        self.get(name)
            .and_then(FieldValue::as_u64)
            .ok_or_else(|| self.missing(name))
    }

    pub fn str_field(&self, name: &str) -> Result<&str, Error> {
        self.get(name)
            .and_then(FieldValue::as_str)
            .ok_or_else(|| self.missing(name))
    }

    fn missing(&self, name: &str) -> Error {
        Error::Protocol {
            reason: format!(
                "{} '{}' has no usable field '{name}'",
                self.kind, self.layout
            ),
        }
    }
}

pub fn decode_payload(
    schema: &ProgramSchema,
    payload: &RawPayload<'_>,
) -> Result<Option<DecodedRecord>, Error> {
    let kind = payload.origin.layout_kind();
    let Some(layout) = dispatch::match_discriminator(schema, kind, payload.data) else {
        return Ok(None);
    };

    if let LayoutShape::Fixed(expected) = layout.shape
        && payload.data.len() != expected
    {
        return Err(Error::LengthMismatch {
            layout: layout.name.clone(),
            expected,
            actual: payload.data.len(),
        });
    }

    let mut cursor = ByteCursor::at(payload.data, layout.discriminator.len());
    let fields = decode_fields(&mut cursor, &layout.fields)?;

    let accounts = payload
        .accounts
        .iter()
        .enumerate()
        .map(|(i, pubkey)| NamedAccount {
            role: layout.accounts.get(i).cloned(),
            pubkey: pubkey.clone(),
        })
        .collect();

    Ok(Some(DecodedRecord {
        program_id: payload.program_id.to_string(),
        layout: layout.name.clone(),
        kind,
        fields,
        accounts,
        origin: payload.origin,
        signature: payload.signature.map(str::to_string),
    }))
}

pub fn decode_instruction(
    schema: &ProgramSchema,
    data: &[u8],
    accounts: &[String],
) -> Result<Option<DecodedRecord>, Error> {
    decode_payload(
        schema,
        &RawPayload {
            program_id: &schema.program_id,
            data,
            accounts,
            origin: PayloadOrigin::TopLevel { index: 0 },
            signature: None,
        },
    )
}

pub fn decode_event(schema: &ProgramSchema, data: &[u8]) -> Result<Option<DecodedRecord>, Error> {
    decode_payload(
        schema,
        &RawPayload {
            program_id: &schema.program_id,
            data,
            accounts: &[],
            origin: PayloadOrigin::Log {
                top_level: None,
                index: 0,
            },
            signature: None,
        },
    )
}

pub fn decode_account(schema: &ProgramSchema, data: &[u8]) -> Result<Option<DecodedRecord>, Error> {
    decode_payload(
        schema,
        &RawPayload {
            program_id: &schema.program_id,
            data,
            accounts: &[],
            origin: PayloadOrigin::Account,
            signature: None,
        },
    )
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::panic, reason = "test assertions")]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec, Layout};

    const CREATE: [u8; 8] = [27, 114, 169, 77, 222, 235, 99, 118];
    const SYSTEM_ID: &str = "11111111111111111111111111111111";

    fn create_schema() -> ProgramSchema {
        let legacy = vec![
            FieldSpec::new("mint", FieldKind::PublicKey),
            FieldSpec::new("bondingCurve", FieldKind::PublicKey),
            FieldSpec::new("user", FieldKind::PublicKey),
            FieldSpec::new("name", FieldKind::FixedText(16)),
            FieldSpec::new("symbol", FieldKind::FixedText(9)),
        ];
        let current = vec![
            FieldSpec::new("name", FieldKind::String),
            FieldSpec::new("symbol", FieldKind::String),
        ];
        ProgramSchema::builder("prog")
            .event(Layout::new("CreateEvent", &CREATE, legacy).fixed(129))
            .event(Layout::new("CreateEvent", &CREATE, current))
            .build()
            .unwrap()
    }

    fn text(value: &FieldValue) -> &str {
        value.as_str().unwrap()
    }

    fn legacy_create_buffer() -> Vec<u8> {
        let mut data = CREATE.to_vec();
        data.extend_from_slice(&[0u8; 96]);
        let mut name = b"TEST".to_vec();
        name.resize(16, 0);
        data.extend_from_slice(&name);
        let mut symbol = b"TST".to_vec();
        symbol.resize(9, 0);
        data.extend_from_slice(&symbol);
        data
    }

    #[test]
    fn legacy_fixed_create_event_decodes() {
        let data = legacy_create_buffer();
        assert_eq!(data.len(), 129);
        let record = decode_event(&create_schema(), &data).unwrap().unwrap();
        assert_eq!(record.fields.len(), 5);
        assert_eq!(text(record.get("mint").unwrap()), SYSTEM_ID);
        assert_eq!(text(record.get("bondingCurve").unwrap()), SYSTEM_ID);
        assert_eq!(text(record.get("user").unwrap()), SYSTEM_ID);
        assert_eq!(text(record.get("name").unwrap()), "TEST");
        assert_eq!(text(record.get("symbol").unwrap()), "TST");
    }

    #[test]
    fn length_prefixed_create_event_decodes() {
        let mut data = CREATE.to_vec();
        data.extend_from_slice(&4_u32.to_le_bytes());
        data.extend_from_slice(b"ABCD");
        data.extend_from_slice(&3_u32.to_le_bytes());
        data.extend_from_slice(b"XYZ");

        let schema = create_schema();
        let record = decode_event(&schema, &data).unwrap().unwrap();
        assert_eq!(record.fields.len(), 2);
        assert_eq!(text(record.get("name").unwrap()), "ABCD");
        assert_eq!(text(record.get("symbol").unwrap()), "XYZ");

        let err = decode_event(&schema, &data[..data.len() - 1]).unwrap_err();
        let Error::TruncatedData { field, .. } = err else {
            panic!("expected TruncatedData, got {err:?}");
        };
        assert_eq!(field, "symbol");
    }

    #[test]
    fn fixed_only_layout_reports_length_mismatch() {
        let schema = ProgramSchema::builder("prog")
            .event(
                Layout::new("Legacy", &CREATE, vec![FieldSpec::new("x", FieldKind::U64)]).fixed(16),
            )
            .build()
            .unwrap();
        let mut data = CREATE.to_vec();
        data.extend_from_slice(&[0u8; 9]);
        let err = decode_event(&schema, &data).unwrap_err();
        let Error::LengthMismatch {
            layout,
            expected,
            actual,
        } = err
        else {
            panic!("expected LengthMismatch, got {err:?}");
        };
        assert_eq!((layout.as_str(), expected, actual), ("Legacy", 16, 17));
    }

    #[test]
    fn variable_layout_tolerates_trailing_bytes() {
        let schema = ProgramSchema::builder("prog")
            .instruction(Layout::new(
                "ix",
                &[1; 8],
                vec![FieldSpec::new("amount", FieldKind::U64)],
            ))
            .build()
            .unwrap();
        let mut data = vec![1; 8];
        data.extend_from_slice(&42_u64.to_le_bytes());
        data.extend_from_slice(&[0xAA, 0xBB]);
        let record = decode_instruction(&schema, &data, &[]).unwrap().unwrap();
        assert_eq!(record.u64_field("amount").unwrap(), 42);
    }

    #[test]
    fn single_bit_flip_in_discriminator_is_no_match() {
        let schema = create_schema();
        let data = legacy_create_buffer();
        for bit in 0..64 {
            let mut flipped = data.clone();
            flipped[bit / 8] ^= 1 << (bit % 8);
            let decoded = decode_event(&schema, &flipped).unwrap();
            assert!(decoded.is_none(), "bit {bit}");
        }
    }

    #[test]
    fn origin_selects_layout_family() {
        let schema = create_schema();
        let data = legacy_create_buffer();
        assert!(decode_instruction(&schema, &data, &[]).unwrap().is_none());
        assert!(decode_account(&schema, &data).unwrap().is_none());
        assert!(decode_event(&schema, &data).unwrap().is_some());
    }

    #[test]
    fn decoding_is_idempotent() {
        let schema = create_schema();
        let data = legacy_create_buffer();
        let a = decode_event(&schema, &data).unwrap();
        let b = decode_event(&schema, &data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn accounts_take_roles_in_order() {
        let schema = ProgramSchema::builder("prog")
            .discriminator_len(1)
            .instruction(Layout::new("swap", &[9], vec![]).with_accounts(&["tokenProgram", "amm"]))
            .build()
            .unwrap();
        let accounts = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let record = decode_instruction(&schema, &[9], &accounts)
            .unwrap()
            .unwrap();
        assert_eq!(record.account("amm"), Some("B"));
        assert_eq!(record.accounts[2].role, None);
        assert_eq!(record.account_at(2), Some("C"));
    }

    #[test]
    fn record_serializes_fields_as_object() {
        let record = decode_event(&create_schema(), &legacy_create_buffer())
            .unwrap()
            .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["layout"], "CreateEvent");
        assert_eq!(json["kind"], "event");
        assert_eq!(json["fields"]["name"], "TEST");
        assert_eq!(json["origin"]["origin"], "log");
        assert!(json.get("accounts").is_none());
    }

    fn lcg_next(state: &mut u64) -> u64 {
        *state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        *state
    }

    #[test]
    fn synthetic_buffers_decode_to_their_encoded_values() {
        let schema = ProgramSchema::builder("prog")
            .instruction(Layout::new(
                "synthetic",
                &[4; 8],
                vec![
                    FieldSpec::new("owner", FieldKind::PublicKey),
                    FieldSpec::new("amount", FieldKind::U64),
                    FieldSpec::new("bump", FieldKind::U8),
                    FieldSpec::new("label", FieldKind::String),
                ],
            ))
            .build()
            .unwrap();

        let mut state = 0x5EED_u64;
        for _ in 0..200 {
            let mut owner = [0u8; 32];
            for chunk in owner.chunks_mut(8) {
                chunk.copy_from_slice(&lcg_next(&mut state).to_le_bytes());
            }
            let amount = lcg_next(&mut state);
            let bump = (lcg_next(&mut state) >> 56) as u8;
            let label = format!("t{}", lcg_next(&mut state) % 100_000);

            let mut data = vec![4; 8];
            data.extend_from_slice(&owner);
            data.extend_from_slice(&amount.to_le_bytes());
            data.push(bump);
            data.extend_from_slice(&(label.len() as u32).to_le_bytes());
            data.extend_from_slice(label.as_bytes());

            let record = decode_instruction(&schema, &data, &[]).unwrap().unwrap();
            assert_eq!(record.fields.len(), 4);
            assert_eq!(
                record.str_field("owner").unwrap(),
                bs58::encode(owner).into_string()
            );
            assert_eq!(
                record.get("amount"),
                Some(&FieldValue::BigInt(amount.to_string()))
            );
            assert_eq!(
                record.get("bump"),
                Some(&FieldValue::Number(i64::from(bump)))
            );
            assert_eq!(record.str_field("label").unwrap(), label);
        }
    }
}
