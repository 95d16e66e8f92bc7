use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::decode::{PayloadOrigin, RawPayload, decode_payload};
use crate::extract::Amount;
use crate::protocols::Protocol;
use crate::schema::idl::schema_from_idl_json;
use crate::schema::{ProgramSchema, anchor_discriminator};

fn to_js<T: Serialize>(value: &T) -> JsValue {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap_or(JsValue::NULL)
}

fn error_result(msg: &str) -> JsValue {
    to_js(&serde_json::json!({ "error": msg }))
}

fn parse_origin(kind: &str) -> Option<PayloadOrigin> {
    match kind {
        "instruction" => Some(PayloadOrigin::TopLevel { index: 0 }),
        "event" => Some(PayloadOrigin::Log {
            top_level: None,
            index: 0,
        }),
        "account" => Some(PayloadOrigin::Account),
        _ => None,
    }
}

fn decode_to_js(schema: &ProgramSchema, data: &[u8], kind: &str) -> JsValue {
    let Some(origin) = parse_origin(kind) else {
        return error_result("kind must be instruction, event or account");
    };
    let payload = RawPayload {
        program_id: &schema.program_id,
        data,
        accounts: &[],
        origin,
        signature: None,
    };
    match decode_payload(schema, &payload) {
        Ok(Some(record)) => to_js(&record),
        Ok(None) => JsValue::NULL,
        Err(e) => error_result(&e.to_string()),
    }
}

/// Built-in protocols and their program ids.
#[wasm_bindgen]
pub fn get_builtin_protocols() -> JsValue {
    use strum::IntoEnumIterator;
    let protocols: Vec<serde_json::Value> = Protocol::iter()
        .map(|p| {
            serde_json::json!({
                "id": p.as_ref(),
                "programId": p.program_id(),
            })
        })
        .collect();
    to_js(&protocols)
}

/// Anchor sighash for `namespace:name`.
#[wasm_bindgen]
pub fn discriminator(namespace: &str, name: &str) -> Vec<u8> {
    anchor_discriminator(namespace, name).to_vec()
}

/// Decode a payload against a built-in schema. Returns null when no layout matches.
#[wasm_bindgen]
pub fn decode_builtin(program_id: &str, data: &[u8], kind: &str) -> JsValue {
    let Some(protocol) = Protocol::from_program_id(program_id) else {
        return error_result("Unknown program");
    };
    match protocol.schema() {
        Ok(schema) => decode_to_js(&schema, data, kind),
        Err(e) => error_result(&e.to_string()),
    }
}

/// Decode a payload against an Anchor IDL supplied by the caller.
#[wasm_bindgen]
pub fn decode_with_idl(idl_json: &str, program_id: &str, data: &[u8], kind: &str) -> JsValue {
    match schema_from_idl_json(program_id, idl_json) {
        Ok(schema) => decode_to_js(&schema, data, kind),
        Err(e) => error_result(&e.to_string()),
    }
}

/// Render a raw integer amount (decimal string) with `decimals`.
#[wasm_bindgen]
pub fn format_amount(raw: &str, decimals: u8) -> Option<String> {
    raw.parse()
        .ok()
        .map(|raw| Amount::new(raw, decimals).to_string())
}
