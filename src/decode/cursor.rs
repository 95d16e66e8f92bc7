use crate::decode::{DecodedField, FieldValue};
use crate::error::Error;
use crate::schema::{FieldKind, FieldSpec, PUBKEY_LEN};

/// Forward-only reader over a payload. Every read names the field it serves so a short
/// buffer surfaces as [`Error::TruncatedData`] pointing at that field.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Starts reading at `offset`, typically just past the discriminator.
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            offset: offset.min(data.len()),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn take(&mut self, field: &str, len: usize) -> Result<&'a [u8], Error> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(Error::TruncatedData {
                field: field.to_string(),
                offset: self.offset,
                needed: len,
                remaining,
            });
        }
        let start = self.offset;
        self.offset += len;
        Ok(&self.data[start..self.offset])
    }

    fn take_array<const N: usize>(&mut self, field: &str) -> Result<[u8; N], Error> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(field, N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self, field: &str) -> Result<u8, Error> {
        Ok(self.take_array::<1>(field)?[0])
    }

    pub fn read_u16(&mut self, field: &str) -> Result<u16, Error> {
        self.take_array(field).map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self, field: &str) -> Result<u32, Error> {
        self.take_array(field).map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self, field: &str) -> Result<u64, Error> {
        self.take_array(field).map(u64::from_le_bytes)
    }

    pub fn read_u128(&mut self, field: &str) -> Result<u128, Error> {
        self.take_array(field).map(u128::from_le_bytes)
    }

    pub fn read_i64(&mut self, field: &str) -> Result<i64, Error> {
        self.take_array(field).map(i64::from_le_bytes)
    }

    pub fn read_pubkey(&mut self, field: &str) -> Result<String, Error> {
        let bytes = self.take(field, PUBKEY_LEN)?;
        Ok(bs58::encode(bytes).into_string())
    }

    /// u32 length prefix, bounds-checked against what is left before reading the body.
    pub fn read_string(&mut self, field: &str) -> Result<String, Error> {
        let len = self.read_u32(field)? as usize;
        let bytes = self.take(field, len)?;
        utf8(field, bytes)
    }

    /// Fixed-width text with trailing NUL padding removed.
    pub fn read_fixed_text(&mut self, field: &str, len: usize) -> Result<String, Error> {
        let bytes = self.take(field, len)?;
        let text = utf8(field, bytes)?;
        Ok(text.trim_end_matches('\0').to_string())
    }
}

fn utf8(field: &str, bytes: &[u8]) -> Result<String, Error> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::Decode {
            field: field.to_string(),
            reason: format!("invalid utf-8: {e}"),
        })
}

pub fn decode_fields(
    cursor: &mut ByteCursor<'_>,
    specs: &[FieldSpec],
) -> Result<Vec<DecodedField>, Error> {
    specs
        .iter()
        .map(|spec| {
            Ok(DecodedField {
                name: spec.name.clone(),
                value: decode_value(cursor, &spec.name, &spec.kind)?,
            })
        })
        .collect()
}

pub fn decode_value(
    cursor: &mut ByteCursor<'_>,
    field: &str,
    kind: &FieldKind,
) -> Result<FieldValue, Error> {
    let value = match kind {
        FieldKind::U8 => FieldValue::Number(i64::from(cursor.read_u8(field)?)),
        FieldKind::U16 => FieldValue::Number(i64::from(cursor.read_u16(field)?)),
        FieldKind::U32 => FieldValue::Number(i64::from(cursor.read_u32(field)?)),
        FieldKind::I8 => FieldValue::Number(i64::from(cursor.read_u8(field)? as i8)),
        FieldKind::I16 => FieldValue::Number(i64::from(cursor.read_u16(field)? as i16)),
        FieldKind::I32 => FieldValue::Number(i64::from(cursor.read_u32(field)? as i32)),
        FieldKind::U64 => FieldValue::BigInt(cursor.read_u64(field)?.to_string()),
        FieldKind::I64 => FieldValue::BigInt(cursor.read_i64(field)?.to_string()),
        FieldKind::U128 => FieldValue::BigInt(cursor.read_u128(field)?.to_string()),
        FieldKind::Bool => match cursor.read_u8(field)? {
            0 => FieldValue::Bool(false),
            1 => FieldValue::Bool(true),
            other => {
                return Err(Error::Decode {
                    field: field.to_string(),
                    reason: format!("invalid bool byte {other}"),
                });
            }
        },
        FieldKind::PublicKey => FieldValue::PublicKey(cursor.read_pubkey(field)?),
        FieldKind::FixedBytes(len) => FieldValue::Bytes(cursor.take(field, *len)?.to_vec()),
        FieldKind::FixedText(len) => FieldValue::Text(cursor.read_fixed_text(field, *len)?),
        FieldKind::String => FieldValue::Text(cursor.read_string(field)?),
        FieldKind::Vec(inner) => {
            let start = cursor.offset();
            let count = cursor.read_u32(field)? as usize;
            decode_elements(cursor, field, start, inner, count)?
        }
        FieldKind::Array(inner, len) => {
            let start = cursor.offset();
            decode_elements(cursor, field, start, inner, *len)?
        }
        FieldKind::Option(inner) => match cursor.read_u8(field)? {
            0 => FieldValue::Null,
            1 => decode_value(cursor, field, inner)?,
            other => {
                return Err(Error::Decode {
                    field: field.to_string(),
                    reason: format!("invalid option tag {other}"),
                });
            }
        },
        FieldKind::Struct(fields) => FieldValue::Struct(decode_fields(cursor, fields)?),
    };
    Ok(value)
}

/// Checks `count` elements against the bytes left before allocating any of them.
fn decode_elements(
    cursor: &mut ByteCursor<'_>,
    field: &str,
    start: usize,
    inner: &FieldKind,
    count: usize,
) -> Result<FieldValue, Error> {
    let remaining = cursor.remaining();
    let element = inner.min_size();
    if element == 0 && count > remaining {
        return Err(Error::Decode {
            field: field.to_string(),
            reason: format!("{count} zero-sized elements exceed the {remaining} bytes left"),
        });
    }
    let needed = element.saturating_mul(count);
    if needed > remaining {
        return Err(Error::TruncatedData {
            field: field.to_string(),
            offset: start,
            needed,
            remaining,
        });
    }
    let mut items = Vec::with_capacity(count.min(remaining));
    for _ in 0..count {
        items.push(decode_value(cursor, field, inner)?);
    }
    Ok(FieldValue::List(items))
}
