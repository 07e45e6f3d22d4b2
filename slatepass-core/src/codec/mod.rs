//! Bit-packed record format.
//!
//! This module provides:
//! - A byte-aligning bit stream packer for flat field lists
//! - A schema codec that stores the field list itself as 3-bit tags
//! - The parameter record that combines both into `<schema>|<payload>`

pub mod bitstream;
pub mod record;
pub mod schema;

pub use bitstream::{calculate_size, pack, pack_bytes, unpack, unpack_bytes, BitReader, BitWriter};
pub use record::{AutofillOption, ParamRecord, RecordField, RecordKey, RecordParams};
pub use schema::{compress_schema, decompress_schema, parse_schema};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while packing or unpacking records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Schema and values length mismatch: {schema} fields, {values} values")]
    LengthMismatch { schema: usize, values: usize },

    #[error("Field {index} expects {expected}, got {found}")]
    TypeMismatch {
        index: usize,
        expected: FieldType,
        found: &'static str,
    },

    #[error("Payload truncated: need {needed} bytes, have {available}")]
    TruncatedPayload { needed: usize, available: usize },

    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Malformed packed record: {0}")]
    MalformedRecord(String),

    #[error("Unexpected record shape: {0}")]
    UnexpectedShape(String),
}

impl From<base64::DecodeError> for CodecError {
    fn from(e: base64::DecodeError) -> Self {
        CodecError::InvalidBase64(e.to_string())
    }
}

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
/// Alias used by callers outside this module
pub type CodecResult<T> = Result<T>;

/// Type of a single field in a flat schema.
///
/// `Str(n)` is a fixed-capacity UTF-8 string of exactly `n` bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bit,
    Bool,
    Byte,
    Int32,
    Int64,
    Timestamp,
    Str(usize),
}

impl FieldType {
    /// Tag used by the schema codec. 0 is reserved.
    pub fn tag(self) -> u8 {
        match self {
            FieldType::Bit => 1,
            FieldType::Bool => 2,
            FieldType::Byte => 3,
            FieldType::Int32 => 4,
            FieldType::Int64 => 5,
            FieldType::Str(_) => 6,
            FieldType::Timestamp => 7,
        }
    }

    /// Whether this field occupies a single unaligned bit
    pub fn is_bit(self) -> bool {
        matches!(self, FieldType::Bit | FieldType::Bool)
    }

    /// Bytes occupied by an aligned field, `None` for bit fields
    pub fn byte_width(self) -> Option<usize> {
        match self {
            FieldType::Bit | FieldType::Bool => None,
            FieldType::Byte => Some(1),
            FieldType::Int32 => Some(4),
            FieldType::Int64 | FieldType::Timestamp => Some(8),
            FieldType::Str(len) => Some(len),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bit => write!(f, "bit"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::Byte => write!(f, "byte"),
            FieldType::Int32 => write!(f, "int"),
            FieldType::Int64 => write!(f, "int64"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Str(len) => write!(f, "s{}", len),
        }
    }
}

impl FromStr for FieldType {
    type Err = CodecError;

    fn from_str(value: &str) -> Result<Self> {
        let name = value.trim().to_ascii_lowercase();
        match name.as_str() {
            "bit" => Ok(FieldType::Bit),
            "bool" => Ok(FieldType::Bool),
            "byte" => Ok(FieldType::Byte),
            "int" | "int32" => Ok(FieldType::Int32),
            "int64" => Ok(FieldType::Int64),
            "timestamp" => Ok(FieldType::Timestamp),
            other => match other.strip_prefix('s').map(str::parse::<usize>) {
                Some(Ok(len)) => Ok(FieldType::Str(len)),
                _ => Err(CodecError::InvalidSchema(format!(
                    "Unknown field type '{}'",
                    value.trim()
                ))),
            },
        }
    }
}

/// A single decoded or to-be-encoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bit(bool),
    Bool(bool),
    Byte(u8),
    Int32(i32),
    Int64(i64),
    Timestamp(i64),
    Str(String),
}

impl Value {
    /// Short kind name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bit(_) => "bit",
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Int32(_) => "int",
            Value::Int64(_) => "int64",
            Value::Timestamp(_) => "timestamp",
            Value::Str(_) => "string",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bit(b) | Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) | Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

pub(crate) fn encode_b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub(crate) fn decode_b64(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_names_parse_back() {
        for ty in [
            FieldType::Bit,
            FieldType::Bool,
            FieldType::Byte,
            FieldType::Int32,
            FieldType::Int64,
            FieldType::Timestamp,
            FieldType::Str(14),
            FieldType::Str(0),
        ] {
            assert_eq!(ty.to_string().parse::<FieldType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_field_type_is_invalid_schema() {
        assert!(matches!(
            "float".parse::<FieldType>(),
            Err(CodecError::InvalidSchema(_))
        ));
        assert!(matches!(
            "sx".parse::<FieldType>(),
            Err(CodecError::InvalidSchema(_))
        ));
    }

    #[test]
    fn tags_are_in_range() {
        assert_eq!(FieldType::Bit.tag(), 1);
        assert_eq!(FieldType::Str(3).tag(), 6);
        assert_eq!(FieldType::Timestamp.tag(), 7);
    }

    #[test]
    fn bad_base64_reports_error() {
        assert!(matches!(decode_b64("@@@"), Err(CodecError::InvalidBase64(_))));
    }
}
