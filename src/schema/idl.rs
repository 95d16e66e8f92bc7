//! Anchor IDL JSON → [`ProgramSchema`].
//!
//! Both IDL generations are accepted: the legacy format (camelCase names, `publicKey`,
//! inline event fields, no discriminators) and the 0.30+ format (snake_case names, `pubkey`,
//! explicit discriminators, event and account bodies under `types`). Layouts whose types
//! cannot be expressed as a [`FieldKind`] (enums, floats) are skipped with a warning so the
//! rest of the program stays decodable.

use heck::ToSnakeCase;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;
use crate::schema::{
    DEFAULT_DISCRIMINATOR_LEN, FieldKind, FieldSpec, Layout, ProgramSchema, anchor_discriminator,
};

const MAX_TYPE_DEPTH: usize = 16;

#[derive(Deserialize)]
struct IdlDocument {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    metadata: Option<IdlMetadata>,
    #[serde(default)]
    instructions: Vec<IdlInstruction>,
    #[serde(default)]
    accounts: Vec<IdlTypeDef>,
    #[serde(default)]
    events: Vec<IdlEvent>,
    #[serde(default)]
    types: Vec<IdlTypeDef>,
}

#[derive(Deserialize)]
struct IdlMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Deserialize)]
struct IdlInstruction {
    name: String,
    #[serde(default)]
    discriminator: Option<Vec<u8>>,
    #[serde(default)]
    accounts: Vec<IdlAccountItem>,
    #[serde(default)]
    args: Vec<IdlField>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdlAccountItem {
    Group { accounts: Vec<IdlAccountItem> },
    Single { name: String },
}

#[derive(Deserialize)]
struct IdlField {
    name: String,
    #[serde(rename = "type")]
    ty: Value,
}

#[derive(Deserialize)]
struct IdlTypeDef {
    name: String,
    #[serde(default)]
    discriminator: Option<Vec<u8>>,
    #[serde(rename = "type", default)]
    ty: Option<Value>,
}

#[derive(Deserialize)]
struct IdlEvent {
    name: String,
    #[serde(default)]
    discriminator: Option<Vec<u8>>,
    #[serde(default)]
    fields: Vec<IdlField>,
}

pub fn schema_from_idl_json(program_id: &str, json: &str) -> Result<ProgramSchema, Error> {
    let value: Value = serde_json::from_str(json)?;
    schema_from_idl(program_id, &value)
}

pub fn schema_from_idl(program_id: &str, idl: &Value) -> Result<ProgramSchema, Error> {
    schema_from_idl_with_len(program_id, idl, DEFAULT_DISCRIMINATOR_LEN)
}

/// Like [`schema_from_idl`] for programs whose discriminators are shorter than 8 bytes.
/// Derived sighashes are truncated to `discriminator_len`.
pub fn schema_from_idl_with_len(
    program_id: &str,
    idl: &Value,
    discriminator_len: usize,
) -> Result<ProgramSchema, Error> {
    if discriminator_len == 0 || discriminator_len > 8 {
        return Err(Error::Idl {
            reason: format!("cannot derive {discriminator_len}-byte discriminators"),
        });
    }
    let doc: IdlDocument = serde_json::from_value(idl.clone()).map_err(|e| Error::Idl {
        reason: format!("unrecognised IDL document: {e}"),
    })?;

    let declared = doc
        .address
        .as_deref()
        .or_else(|| doc.metadata.as_ref().and_then(|m| m.address.as_deref()));
    if let Some(declared) = declared
        && declared != program_id
    {
        tracing::warn!(
            program_id,
            declared,
            "IDL address differs from requested program"
        );
    }

    let name = doc
        .name
        .clone()
        .or_else(|| doc.metadata.as_ref().and_then(|m| m.name.clone()));
    let mut builder = ProgramSchema::builder(program_id).discriminator_len(discriminator_len);
    if let Some(name) = name {
        builder = builder.name(name);
    }

    for ix in &doc.instructions {
        match instruction_layout(ix, &doc.types, discriminator_len) {
            Ok(layout) => builder = builder.instruction(layout),
            Err(e) => skip(program_id, "instruction", &ix.name, &e),
        }
    }
    for ev in &doc.events {
        match event_layout(ev, &doc.types, discriminator_len) {
            Ok(layout) => builder = builder.event(layout),
            Err(e) => skip(program_id, "event", &ev.name, &e),
        }
    }
    for acc in &doc.accounts {
        match account_layout(acc, &doc.types, discriminator_len) {
            Ok(layout) => builder = builder.account(layout),
            Err(e) => skip(program_id, "account", &acc.name, &e),
        }
    }

    builder.build()
}

fn skip(program_id: &str, kind: &str, name: &str, error: &Error) {
    tracing::warn!(program_id, kind, name, %error, "skipping IDL layout");
}

fn instruction_layout(
    ix: &IdlInstruction,
    types: &[IdlTypeDef],
    len: usize,
) -> Result<Layout, Error> {
    let discriminator = match &ix.discriminator {
        Some(d) => d.clone(),
        None => anchor_discriminator("global", &ix.name.to_snake_case())[..len].to_vec(),
    };
    let fields = convert_fields(&ix.args, types, 0)?;
    let mut roles = Vec::new();
    flatten_accounts(&ix.accounts, &mut roles);
    let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
    Ok(Layout::new(&ix.name, &discriminator, fields).with_accounts(&roles))
}

fn event_layout(ev: &IdlEvent, types: &[IdlTypeDef], len: usize) -> Result<Layout, Error> {
    let discriminator = match &ev.discriminator {
        Some(d) => d.clone(),
        None => anchor_discriminator("event", &ev.name)[..len].to_vec(),
    };
    let fields = if ev.fields.is_empty() {
        defined_struct(&ev.name, types, 0)?
    } else {
        convert_fields(&ev.fields, types, 0)?
    };
    Ok(Layout::new(&ev.name, &discriminator, fields))
}

fn account_layout(acc: &IdlTypeDef, types: &[IdlTypeDef], len: usize) -> Result<Layout, Error> {
    let discriminator = match &acc.discriminator {
        Some(d) => d.clone(),
        None => anchor_discriminator("account", &acc.name)[..len].to_vec(),
    };
    let fields = match &acc.ty {
        Some(ty) => struct_fields(&acc.name, ty, types, 0)?,
        None => defined_struct(&acc.name, types, 0)?,
    };
    Ok(Layout::new(&acc.name, &discriminator, fields))
}

fn flatten_accounts(items: &[IdlAccountItem], out: &mut Vec<String>) {
    for item in items {
        match item {
            IdlAccountItem::Group { accounts } => flatten_accounts(accounts, out),
            IdlAccountItem::Single { name } => out.push(name.clone()),
        }
    }
}

fn convert_fields(
    fields: &[IdlField],
    types: &[IdlTypeDef],
    depth: usize,
) -> Result<Vec<FieldSpec>, Error> {
    fields
        .iter()
        .map(|f| Ok(FieldSpec::new(&f.name, convert_type(&f.ty, types, depth)?)))
        .collect()
}

fn defined_struct(name: &str, types: &[IdlTypeDef], depth: usize) -> Result<Vec<FieldSpec>, Error> {
    let def = types
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| Error::Idl {
            reason: format!("type '{name}' is not defined"),
        })?;
    let ty = def.ty.as_ref().ok_or_else(|| Error::Idl {
        reason: format!("type '{name}' has no body"),
    })?;
    struct_fields(name, ty, types, depth)
}

fn struct_fields(
    name: &str,
    ty: &Value,
    types: &[IdlTypeDef],
    depth: usize,
) -> Result<Vec<FieldSpec>, Error> {
    if depth > MAX_TYPE_DEPTH {
        return Err(Error::Idl {
            reason: format!("type '{name}' nests deeper than {MAX_TYPE_DEPTH} levels"),
        });
    }
    let kind = ty.get("kind").and_then(Value::as_str).unwrap_or_default();
    if kind != "struct" {
        return Err(Error::Idl {
            reason: format!("type '{name}' is a {kind:?}, only structs are supported"),
        });
    }
    let Some(fields) = ty.get("fields").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            // Tuple structs list bare types.
            match (field.get("name").and_then(Value::as_str), field.get("type")) {
                (Some(field_name), Some(field_ty)) => Ok(FieldSpec::new(
                    field_name,
                    convert_type(field_ty, types, depth + 1)?,
                )),
                _ => Ok(FieldSpec::new(
                    i.to_string(),
                    convert_type(field, types, depth + 1)?,
                )),
            }
        })
        .collect()
}

fn convert_type(ty: &Value, types: &[IdlTypeDef], depth: usize) -> Result<FieldKind, Error> {
    if depth > MAX_TYPE_DEPTH {
        return Err(Error::Idl {
            reason: format!("type nests deeper than {MAX_TYPE_DEPTH} levels"),
        });
    }

    if let Some(primitive) = ty.as_str() {
        return match primitive {
            "u8" => Ok(FieldKind::U8),
            "u16" => Ok(FieldKind::U16),
            "u32" => Ok(FieldKind::U32),
            "u64" => Ok(FieldKind::U64),
            "u128" => Ok(FieldKind::U128),
            "i8" => Ok(FieldKind::I8),
            "i16" => Ok(FieldKind::I16),
            "i32" => Ok(FieldKind::I32),
            "i64" => Ok(FieldKind::I64),
            "bool" => Ok(FieldKind::Bool),
            "string" => Ok(FieldKind::String),
            "publicKey" | "pubkey" => Ok(FieldKind::PublicKey),
            "bytes" => Ok(FieldKind::Vec(Box::new(FieldKind::U8))),
            other => Err(Error::Idl {
                reason: format!("unsupported primitive type '{other}'"),
            }),
        };
    }

    if let Some(inner) = ty.get("vec") {
        return Ok(FieldKind::Vec(Box::new(convert_type(inner, types, depth + 1)?)));
    }
    if let Some(inner) = ty.get("option") {
        return Ok(FieldKind::Option(Box::new(convert_type(
            inner,
            types,
            depth + 1,
        )?)));
    }
    if let Some(array) = ty.get("array").and_then(Value::as_array)
        && let [inner, len] = array.as_slice()
    {
        let len = len.as_u64().ok_or_else(|| Error::Idl {
            reason: format!("array length must be a literal, got {len}"),
        })?;
        return Ok(FieldKind::Array(
            Box::new(convert_type(inner, types, depth + 1)?),
            len as usize,
        ));
    }
    if let Some(defined) = ty.get("defined") {
        let name = defined
            .as_str()
            .or_else(|| defined.get("name").and_then(Value::as_str))
            .ok_or_else(|| Error::Idl {
                reason: format!("malformed defined type {defined}"),
            })?;
        return Ok(FieldKind::Struct(defined_struct(name, types, depth + 1)?));
    }

    Err(Error::Idl {
        reason: format!("unsupported type {ty}"),
    })
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::panic, reason = "test assertions")]
mod tests {
    use super::*;
    use crate::schema::LayoutKind;

    const PUMP_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
    const VAULT_ID: &str = "Prog1111111111111111111111111111111111111111";

    const LEGACY_IDL: &str = r#"{
        "version": "0.1.0",
        "name": "pump",
        "instructions": [
            {
                "name": "buy",
                "accounts": [
                    {"name": "global", "isMut": false, "isSigner": false},
                    {"name": "feeRecipient", "isMut": true, "isSigner": false},
                    {"name": "mint", "isMut": false, "isSigner": false}
                ],
                "args": [
                    {"name": "amount", "type": "u64"},
                    {"name": "maxSolCost", "type": "u64"}
                ]
            },
            {
                "name": "setParams",
                "accounts": [],
                "args": [{"name": "feeBasisPoints", "type": "f64"}]
            }
        ],
        "accounts": [
            {
                "name": "BondingCurve",
                "type": {
                    "kind": "struct",
                    "fields": [
                        {"name": "virtualTokenReserves", "type": "u64"},
                        {"name": "complete", "type": "bool"}
                    ]
                }
            }
        ],
        "events": [
            {
                "name": "TradeEvent",
                "fields": [
                    {"name": "mint", "type": "publicKey", "index": false},
                    {"name": "solAmount", "type": "u64", "index": false}
                ]
            }
        ],
        "metadata": {"address": "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P"}
    }"#;

    const MODERN_IDL: &str = r#"{
        "address": "Prog1111111111111111111111111111111111111111",
        "metadata": {"name": "vault", "version": "0.1.0", "spec": "0.1.0"},
        "instructions": [
            {
                "name": "deposit",
                "discriminator": [242, 35, 198, 137, 82, 225, 242, 182],
                "accounts": [
                    {"name": "user", "writable": true, "signer": true},
                    {"name": "shared", "accounts": [
                        {"name": "vault"},
                        {"name": "token_program"}
                    ]}
                ],
                "args": [
                    {"name": "amounts", "type": {"vec": "u64"}},
                    {"name": "memo", "type": {"option": "string"}},
                    {"name": "seed", "type": {"array": ["u8", 4]}},
                    {"name": "params", "type": {"defined": {"name": "Params"}}}
                ]
            }
        ],
        "accounts": [
            {"name": "Vault", "discriminator": [211, 8, 232, 43, 2, 152, 117, 119]}
        ],
        "events": [
            {"name": "Deposited", "discriminator": [1, 2, 3, 4, 5, 6, 7, 8]}
        ],
        "types": [
            {
                "name": "Params",
                "type": {"kind": "struct", "fields": [{"name": "bump", "type": "u8"}]}
            },
            {
                "name": "Vault",
                "type": {"kind": "struct", "fields": [{"name": "owner", "type": "pubkey"}]}
            },
            {
                "name": "Deposited",
                "type": {"kind": "struct", "fields": [{"name": "amount", "type": "u64"}]}
            }
        ]
    }"#;

    #[test]
    fn legacy_idl_derives_discriminators_and_skips_unsupported() {
        let schema = schema_from_idl_json(PUMP_ID, LEGACY_IDL).unwrap();
        assert_eq!(schema.name.as_deref(), Some("pump"));

        let buy = schema.layout(LayoutKind::Instruction, "buy").unwrap();
        assert_eq!(buy.discriminator, anchor_discriminator("global", "buy"));
        assert_eq!(buy.accounts, vec!["global", "feeRecipient", "mint"]);
        assert_eq!(buy.fields.len(), 2);
        assert!(schema.layout(LayoutKind::Instruction, "setParams").is_none());

        let trade = schema.layout(LayoutKind::Event, "TradeEvent").unwrap();
        assert_eq!(trade.discriminator, [189, 219, 127, 211, 78, 230, 97, 238]);
        assert_eq!(trade.fields[0].kind, FieldKind::PublicKey);

        let curve = schema.layout(LayoutKind::Account, "BondingCurve").unwrap();
        assert_eq!(
            curve.discriminator,
            anchor_discriminator("account", "BondingCurve")
        );
        assert_eq!(curve.fields[1].kind, FieldKind::Bool);
    }

    #[test]
    fn modern_idl_uses_explicit_discriminators_and_types() {
        let schema = schema_from_idl_json(VAULT_ID, MODERN_IDL).unwrap();
        assert_eq!(schema.name.as_deref(), Some("vault"));

        let deposit = schema.layout(LayoutKind::Instruction, "deposit").unwrap();
        assert_eq!(
            deposit.discriminator,
            [242, 35, 198, 137, 82, 225, 242, 182]
        );
        assert_eq!(deposit.accounts, vec!["user", "vault", "token_program"]);
        let kinds: Vec<FieldKind> = deposit.fields.iter().map(|f| f.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                FieldKind::Vec(Box::new(FieldKind::U64)),
                FieldKind::Option(Box::new(FieldKind::String)),
                FieldKind::Array(Box::new(FieldKind::U8), 4),
                FieldKind::Struct(vec![FieldSpec::new("bump", FieldKind::U8)]),
            ]
        );

        let event = schema.layout(LayoutKind::Event, "Deposited").unwrap();
        assert_eq!(event.fields, vec![FieldSpec::new("amount", FieldKind::U64)]);
        let vault = schema.layout(LayoutKind::Account, "Vault").unwrap();
        assert_eq!(
            vault.fields,
            vec![FieldSpec::new("owner", FieldKind::PublicKey)]
        );
    }

    #[test]
    fn malformed_document_is_an_idl_error() {
        let err = schema_from_idl_json("p", r#"{"instructions": 5}"#).unwrap_err();
        assert!(matches!(err, Error::Idl { .. }), "{err:?}");
        assert!(matches!(
            schema_from_idl_json("p", "not json").unwrap_err(),
            Error::Json(_)
        ));
    }

    #[test]
    fn short_discriminators_truncate_the_sighash() {
        let idl: Value = serde_json::from_str(LEGACY_IDL).unwrap();
        let schema = schema_from_idl_with_len("p", &idl, 1).unwrap();
        assert_eq!(schema.discriminator_len, 1);
        let buy = schema.layout(LayoutKind::Instruction, "buy").unwrap();
        assert_eq!(buy.discriminator, vec![102]);

        let err = schema_from_idl_with_len("p", &idl, 9).unwrap_err();
        assert!(matches!(err, Error::Idl { .. }), "{err:?}");
    }

    #[test]
    fn instruction_sighash_uses_snake_case_name() {
        let idl = r#"{
            "instructions": [
                {"name": "createATA", "accounts": [], "args": []},
                {"name": "swapBaseIn", "accounts": [], "args": []},
                {"name": "Initialize2", "accounts": [], "args": []}
            ]
        }"#;
        let schema = schema_from_idl_json("p", idl).unwrap();
        for (name, snake) in [
            ("createATA", "create_ata"),
            ("swapBaseIn", "swap_base_in"),
            ("Initialize2", "initialize2"),
        ] {
            let layout = schema.layout(LayoutKind::Instruction, name).unwrap();
            let expected = anchor_discriminator("global", snake);
            assert_eq!(layout.discriminator, expected, "{name}");
        }
    }

    #[test]
    fn huge_array_argument_fails_as_truncation() {
        let idl = r#"{
            "instructions": [
                {
                    "name": "stuff",
                    "accounts": [],
                    "args": [{"name": "blob", "type": {"array": ["u8", 1152921504606846976]}}]
                }
            ]
        }"#;
        let schema = schema_from_idl_json("p", idl).unwrap();
        let mut data = anchor_discriminator("global", "stuff").to_vec();
        data.extend_from_slice(&[0; 16]);
        let err = crate::decode::decode_instruction(&schema, &data, &[]).unwrap_err();
        let Error::TruncatedData { needed, .. } = err else {
            panic!("expected TruncatedData, got {err:?}");
        };
        assert_eq!(needed, 1 << 60);
    }
}
