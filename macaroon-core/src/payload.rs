//! Structured caveat payloads
//!
//! Applications that want to store a record inside a caveat identifier
//! describe it with an explicit schema: an ordered list of field indexes and
//! their kinds. The encoding is a sequence of tuples
//!
//! ```text
//! [field index u8][length u8][raw field bytes]
//! ```
//!
//! Integers are fixed-width little-endian, booleans a single `0`/`1` byte,
//! strings UTF-8 and byte fields raw. Absent optional fields are omitted.
//!
//! # Example
//! ```rust
//! use macaroon_core::payload::{CaveatPayload, FieldKind, FieldValue, PayloadFields};
//! use macaroon_core::{MacaroonError, decode_payload, encode_payload};
//!
//! #[derive(Debug, PartialEq)]
//! struct Account {
//!     id: u32,
//!     region: Option<String>,
//! }
//!
//! impl CaveatPayload for Account {
//!     const SCHEMA: &'static [(u8, FieldKind)] = &[(0, FieldKind::U32), (1, FieldKind::Str)];
//!
//!     fn to_fields(&self) -> Vec<(u8, FieldValue)> {
//!         let mut fields = vec![(0, FieldValue::U32(self.id))];
//!         if let Some(region) = &self.region {
//!             fields.push((1, FieldValue::Str(region.clone())));
//!         }
//!         fields
//!     }
//!
//!     fn from_fields(mut fields: PayloadFields) -> Result<Self, MacaroonError> {
//!         Ok(Account {
//!             id: fields.require_u32(0)?,
//!             region: fields.take_str(1),
//!         })
//!     }
//! }
//!
//! let account = Account { id: 3735928559, region: None };
//! let bytes = encode_payload(&account).unwrap();
//! assert_eq!(decode_payload::<Account>(&bytes).unwrap(), account);
//! ```

use std::collections::BTreeMap;

use crate::error::MacaroonError;

/// Largest encoded size of a single field.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// The declared kind of a payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    Bool,
    Str,
    Bytes,
}

/// A decoded or to-be-encoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::I8(_) => FieldKind::I8,
            FieldValue::I16(_) => FieldKind::I16,
            FieldValue::I32(_) => FieldKind::I32,
            FieldValue::I64(_) => FieldKind::I64,
            FieldValue::U8(_) => FieldKind::U8,
            FieldValue::U16(_) => FieldKind::U16,
            FieldValue::U32(_) => FieldKind::U32,
            FieldValue::U64(_) => FieldKind::U64,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Str(_) => FieldKind::Str,
            FieldValue::Bytes(_) => FieldKind::Bytes,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            FieldValue::I8(v) => v.to_le_bytes().to_vec(),
            FieldValue::I16(v) => v.to_le_bytes().to_vec(),
            FieldValue::I32(v) => v.to_le_bytes().to_vec(),
            FieldValue::I64(v) => v.to_le_bytes().to_vec(),
            FieldValue::U8(v) => vec![*v],
            FieldValue::U16(v) => v.to_le_bytes().to_vec(),
            FieldValue::U32(v) => v.to_le_bytes().to_vec(),
            FieldValue::U64(v) => v.to_le_bytes().to_vec(),
            FieldValue::Bool(v) => vec![u8::from(*v)],
            FieldValue::Str(v) => v.as_bytes().to_vec(),
            FieldValue::Bytes(v) => v.clone(),
        }
    }

    fn from_bytes(kind: FieldKind, data: &[u8]) -> Result<Self, MacaroonError> {
        fn fixed<const N: usize>(data: &[u8], kind: FieldKind) -> Result<[u8; N], MacaroonError> {
            data.try_into().map_err(|_| {
                MacaroonError::payload(format!(
                    "{kind:?} field needs {N} bytes, got {}",
                    data.len()
                ))
            })
        }

        Ok(match kind {
            FieldKind::I8 => FieldValue::I8(i8::from_le_bytes(fixed(data, kind)?)),
            FieldKind::I16 => FieldValue::I16(i16::from_le_bytes(fixed(data, kind)?)),
            FieldKind::I32 => FieldValue::I32(i32::from_le_bytes(fixed(data, kind)?)),
            FieldKind::I64 => FieldValue::I64(i64::from_le_bytes(fixed(data, kind)?)),
            FieldKind::U8 => FieldValue::U8(u8::from_le_bytes(fixed(data, kind)?)),
            FieldKind::U16 => FieldValue::U16(u16::from_le_bytes(fixed(data, kind)?)),
            FieldKind::U32 => FieldValue::U32(u32::from_le_bytes(fixed(data, kind)?)),
            FieldKind::U64 => FieldValue::U64(u64::from_le_bytes(fixed(data, kind)?)),
            FieldKind::Bool => match data {
                [0] => FieldValue::Bool(false),
                [1] => FieldValue::Bool(true),
                _ => return Err(MacaroonError::payload("can not decode bool field")),
            },
            FieldKind::Str => FieldValue::Str(
                String::from_utf8(data.to_vec())
                    .map_err(|e| MacaroonError::payload(format!("string field: {e}")))?,
            ),
            FieldKind::Bytes => FieldValue::Bytes(data.to_vec()),
        })
    }
}

/// A record that can be stored in a caveat identifier.
pub trait CaveatPayload: Sized {
    /// Every field index the record may carry, with its kind.
    const SCHEMA: &'static [(u8, FieldKind)];

    /// The present fields, in any order.
    fn to_fields(&self) -> Vec<(u8, FieldValue)>;

    /// Rebuilds the record from decoded fields.
    fn from_fields(fields: PayloadFields) -> Result<Self, MacaroonError>;
}

/// Decoded fields of a payload, keyed by field index.
#[derive(Debug, Default)]
pub struct PayloadFields {
    values: BTreeMap<u8, FieldValue>,
}

macro_rules! take_accessors {
    ($($take:ident, $require:ident, $variant:ident, $ty:ty;)*) => {
        $(
            pub fn $take(&mut self, index: u8) -> Option<$ty> {
                match self.values.remove(&index) {
                    Some(FieldValue::$variant(v)) => Some(v),
                    _ => None,
                }
            }

            pub fn $require(&mut self, index: u8) -> Result<$ty, MacaroonError> {
                self.$take(index).ok_or_else(|| {
                    MacaroonError::payload(format!("missing required field {index}"))
                })
            }
        )*
    };
}

impl PayloadFields {
    pub fn take(&mut self, index: u8) -> Option<FieldValue> {
        self.values.remove(&index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    take_accessors! {
        take_i8, require_i8, I8, i8;
        take_i16, require_i16, I16, i16;
        take_i32, require_i32, I32, i32;
        take_i64, require_i64, I64, i64;
        take_u8, require_u8, U8, u8;
        take_u16, require_u16, U16, u16;
        take_u32, require_u32, U32, u32;
        take_u64, require_u64, U64, u64;
        take_bool, require_bool, Bool, bool;
        take_str, require_str, Str, String;
        take_bytes, require_bytes, Bytes, Vec<u8>;
    }
}

fn schema_kind<T: CaveatPayload>(index: u8) -> Option<FieldKind> {
    T::SCHEMA
        .iter()
        .find(|(i, _)| *i == index)
        .map(|(_, kind)| *kind)
}

/// Encodes a record as field tuples, ordered by field index.
pub fn encode_payload<T: CaveatPayload>(value: &T) -> Result<Vec<u8>, MacaroonError> {
    let mut fields = value.to_fields();
    fields.sort_by_key(|(index, _)| *index);

    let mut out = Vec::new();
    for (index, field) in fields {
        match schema_kind::<T>(index) {
            Some(kind) if kind == field.kind() => {}
            Some(kind) => {
                return Err(MacaroonError::payload(format!(
                    "field {index} declared {kind:?} but holds {:?}",
                    field.kind()
                )));
            }
            None => {
                return Err(MacaroonError::payload(format!(
                    "field {index} is not in the schema"
                )));
            }
        }
        let data = field.to_bytes();
        if data.len() > MAX_FIELD_LEN {
            return Err(MacaroonError::too_big("caveat payload field"));
        }
        out.push(index);
        out.push(data.len() as u8);
        out.extend_from_slice(&data);
    }
    Ok(out)
}

/// Decodes field tuples against the record's schema.
pub fn decode_payload<T: CaveatPayload>(data: &[u8]) -> Result<T, MacaroonError> {
    let mut fields = PayloadFields::default();
    let mut rest = data;
    while !rest.is_empty() {
        let [index, len, tail @ ..] = rest else {
            return Err(MacaroonError::payload("truncated field header"));
        };
        let len = *len as usize;
        if tail.len() < len {
            return Err(MacaroonError::payload(format!(
                "field {index} declares {len} bytes, {} remain",
                tail.len()
            )));
        }
        let kind = schema_kind::<T>(*index)
            .ok_or_else(|| MacaroonError::payload(format!("unknown field {index}")))?;
        let value = FieldValue::from_bytes(kind, &tail[..len])?;
        fields.values.insert(*index, value);
        rest = &tail[len..];
    }
    T::from_fields(fields)
}
