//! Generation parameter record.
//!
//! A record is packed as `<compressed schema>|<payload>`. The schema is built
//! fresh on every pack because the three string fields are sized by the
//! current UTF-8 byte length of their values, which makes the packed form
//! self-describing.

use super::{
    compress_schema, decompress_schema, pack, unpack, CodecError, FieldType, Result, Value,
};
use serde::{Deserialize, Serialize};

/// Separator between the schema and payload segments
pub const RECORD_SEPARATOR: char = '|';

pub const DEFAULT_LENGTH: i32 = 40;
pub const DEFAULT_VERSION: i32 = 1;
pub const DEFAULT_SYMBOLS: &str = "!@#$%^&*(){}[]=,.";

const FIELD_COUNT: usize = 12;

/// What the extension does with the salt field when a page is opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutofillOption {
    #[default]
    DoNothing,
    AutofillDomain,
    AutofillUrl,
    AutofillKeyword,
}

impl AutofillOption {
    pub fn index(self) -> u8 {
        match self {
            AutofillOption::DoNothing => 0,
            AutofillOption::AutofillDomain => 1,
            AutofillOption::AutofillUrl => 2,
            AutofillOption::AutofillKeyword => 3,
        }
    }

    /// Unknown indices fall back to [`AutofillOption::DoNothing`]
    pub fn from_index(index: u8) -> Self {
        match index {
            1 => AutofillOption::AutofillDomain,
            2 => AutofillOption::AutofillUrl,
            3 => AutofillOption::AutofillKeyword,
            _ => AutofillOption::DoNothing,
        }
    }
}

/// Plain parameter values carried by a [`ParamRecord`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordParams {
    /// Still holding defaults rather than user-chosen values
    pub is_initial: bool,
    pub lowercase_checked: bool,
    pub uppercase_checked: bool,
    pub numbers_checked: bool,
    pub symbols_checked: bool,
    pub auto_fill_option: AutofillOption,
    #[serde(rename = "pwlength")]
    pub pw_length: i32,
    pub version: i32,
    pub symbols: String,
    pub salt: String,
    /// Master secret in the UI state; the generated password in history items
    pub pw: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Default for RecordParams {
    fn default() -> Self {
        Self::defaults_at(chrono::Utc::now().timestamp_millis())
    }
}

impl RecordParams {
    /// Default parameters stamped with `timestamp`
    pub fn defaults_at(timestamp: i64) -> Self {
        Self {
            is_initial: true,
            lowercase_checked: true,
            uppercase_checked: true,
            numbers_checked: true,
            symbols_checked: true,
            auto_fill_option: AutofillOption::DoNothing,
            pw_length: DEFAULT_LENGTH,
            version: DEFAULT_VERSION,
            symbols: DEFAULT_SYMBOLS.to_string(),
            salt: String::new(),
            pw: String::new(),
            timestamp,
        }
    }

    /// Data-dependent schema for the current values
    pub fn schema(&self) -> Vec<FieldType> {
        vec![
            FieldType::Bool,
            FieldType::Bool,
            FieldType::Bool,
            FieldType::Bool,
            FieldType::Bool,
            FieldType::Byte,
            FieldType::Int32,
            FieldType::Int32,
            FieldType::Str(self.symbols.len()),
            FieldType::Str(self.salt.len()),
            FieldType::Str(self.pw.len()),
            FieldType::Timestamp,
        ]
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Bool(self.is_initial),
            Value::Bool(self.lowercase_checked),
            Value::Bool(self.uppercase_checked),
            Value::Bool(self.numbers_checked),
            Value::Bool(self.symbols_checked),
            Value::Byte(self.auto_fill_option.index()),
            Value::Int32(self.pw_length),
            Value::Int32(self.version),
            Value::Str(self.symbols.clone()),
            Value::Str(self.salt.clone()),
            Value::Str(self.pw.clone()),
            Value::Timestamp(self.timestamp),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        if values.len() != FIELD_COUNT {
            return Err(CodecError::UnexpectedShape(format!(
                "expected {} fields, found {}",
                FIELD_COUNT,
                values.len()
            )));
        }

        let mut fields = values.into_iter();
        let mut next_bool = |name: &str| -> Result<bool> {
            match fields.next() {
                Some(Value::Bool(v)) | Some(Value::Bit(v)) => Ok(v),
                other => Err(shape_error(name, "bool", other.as_ref())),
            }
        };
        let is_initial = next_bool("is_initial")?;
        let lowercase_checked = next_bool("lowercaseChecked")?;
        let uppercase_checked = next_bool("uppercaseChecked")?;
        let numbers_checked = next_bool("numbersChecked")?;
        let symbols_checked = next_bool("symbolsChecked")?;

        let auto_fill_option = match fields.next() {
            Some(Value::Byte(index)) => AutofillOption::from_index(index),
            other => return Err(shape_error("autoFillOption", "byte", other.as_ref())),
        };

        let mut next_int = |name: &str| -> Result<i32> {
            match fields.next() {
                Some(Value::Int32(v)) => Ok(v),
                other => Err(shape_error(name, "int", other.as_ref())),
            }
        };
        let pw_length = next_int("pwlength")?;
        let version = next_int("version")?;

        let mut next_str = |name: &str| -> Result<String> {
            match fields.next() {
                Some(Value::Str(v)) => Ok(v),
                other => Err(shape_error(name, "string", other.as_ref())),
            }
        };
        let symbols = next_str("symbols")?;
        let salt = next_str("salt")?;
        let pw = next_str("pw")?;

        let timestamp = match fields.next() {
            Some(Value::Timestamp(v)) | Some(Value::Int64(v)) => v,
            other => return Err(shape_error("timestamp", "timestamp", other.as_ref())),
        };

        Ok(Self {
            is_initial,
            lowercase_checked,
            uppercase_checked,
            numbers_checked,
            symbols_checked,
            auto_fill_option,
            pw_length,
            version,
            symbols,
            salt,
            pw,
            timestamp,
        })
    }

    /// Current value of a settable field
    pub fn field(&self, key: RecordKey) -> RecordField {
        match key {
            RecordKey::LowercaseChecked => RecordField::LowercaseChecked(self.lowercase_checked),
            RecordKey::UppercaseChecked => RecordField::UppercaseChecked(self.uppercase_checked),
            RecordKey::NumbersChecked => RecordField::NumbersChecked(self.numbers_checked),
            RecordKey::SymbolsChecked => RecordField::SymbolsChecked(self.symbols_checked),
            RecordKey::AutoFillOption => RecordField::AutoFillOption(self.auto_fill_option),
            RecordKey::PwLength => RecordField::PwLength(self.pw_length),
            RecordKey::Version => RecordField::Version(self.version),
            RecordKey::Symbols => RecordField::Symbols(self.symbols.clone()),
            RecordKey::Salt => RecordField::Salt(self.salt.clone()),
            RecordKey::Pw => RecordField::Pw(self.pw.clone()),
        }
    }

    fn apply(&mut self, field: RecordField) {
        match field {
            RecordField::LowercaseChecked(v) => self.lowercase_checked = v,
            RecordField::UppercaseChecked(v) => self.uppercase_checked = v,
            RecordField::NumbersChecked(v) => self.numbers_checked = v,
            RecordField::SymbolsChecked(v) => self.symbols_checked = v,
            RecordField::AutoFillOption(v) => self.auto_fill_option = v,
            RecordField::PwLength(v) => self.pw_length = v,
            RecordField::Version(v) => self.version = v,
            RecordField::Symbols(v) => self.symbols = v,
            RecordField::Salt(v) => self.salt = v,
            RecordField::Pw(v) => self.pw = v,
        }
    }
}

fn shape_error(name: &str, expected: &str, found: Option<&Value>) -> CodecError {
    CodecError::UnexpectedShape(format!(
        "field '{}' should be {}, found {}",
        name,
        expected,
        found.map_or("nothing", Value::kind)
    ))
}

/// Name of a user-settable record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordKey {
    LowercaseChecked,
    UppercaseChecked,
    NumbersChecked,
    SymbolsChecked,
    AutoFillOption,
    #[serde(rename = "pwlength")]
    PwLength,
    Version,
    Symbols,
    Salt,
    Pw,
}

/// A single field update, as sent across the request boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "camelCase")]
pub enum RecordField {
    LowercaseChecked(bool),
    UppercaseChecked(bool),
    NumbersChecked(bool),
    SymbolsChecked(bool),
    AutoFillOption(AutofillOption),
    #[serde(rename = "pwlength")]
    PwLength(i32),
    Version(i32),
    Symbols(String),
    Salt(String),
    Pw(String),
}

impl RecordField {
    pub fn key(&self) -> RecordKey {
        match self {
            RecordField::LowercaseChecked(_) => RecordKey::LowercaseChecked,
            RecordField::UppercaseChecked(_) => RecordKey::UppercaseChecked,
            RecordField::NumbersChecked(_) => RecordKey::NumbersChecked,
            RecordField::SymbolsChecked(_) => RecordKey::SymbolsChecked,
            RecordField::AutoFillOption(_) => RecordKey::AutoFillOption,
            RecordField::PwLength(_) => RecordKey::PwLength,
            RecordField::Version(_) => RecordKey::Version,
            RecordField::Symbols(_) => RecordKey::Symbols,
            RecordField::Salt(_) => RecordKey::Salt,
            RecordField::Pw(_) => RecordKey::Pw,
        }
    }
}

/// A parameter record together with its packed form.
///
/// Every mutation re-packs immediately, so [`packed_string`](Self::packed_string)
/// is always current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRecord {
    params: RecordParams,
    packed_schema: String,
    packed_payload: String,
}

impl ParamRecord {
    /// Build and pack a record
    pub fn new(params: RecordParams) -> Result<Self> {
        let (packed_schema, packed_payload) = Self::pack_params(&params)?;
        Ok(Self {
            params,
            packed_schema,
            packed_payload,
        })
    }

    /// Record holding the default parameters, stamped now
    pub fn with_defaults() -> Result<Self> {
        Self::new(RecordParams::default())
    }

    /// Decode a packed record string
    pub fn from_packed(packed: &str) -> Result<Self> {
        let (schema_part, payload_part) = packed.split_once(RECORD_SEPARATOR).ok_or_else(|| {
            CodecError::MalformedRecord(format!("missing '{}' separator", RECORD_SEPARATOR))
        })?;

        let schema = decompress_schema(schema_part)?;
        let values = unpack(&schema, payload_part)?;
        let params = RecordParams::from_values(values)?;

        Ok(Self {
            params,
            packed_schema: schema_part.to_string(),
            packed_payload: payload_part.to_string(),
        })
    }

    /// Replace this record with the decoded `packed` string.
    ///
    /// An empty string leaves the record unchanged.
    pub fn unpack_into(&mut self, packed: &str) -> Result<()> {
        if packed.is_empty() {
            return Ok(());
        }
        *self = Self::from_packed(packed)?;
        Ok(())
    }

    fn pack_params(params: &RecordParams) -> Result<(String, String)> {
        let schema = params.schema();
        let packed_schema = compress_schema(&schema)?;
        let packed_payload = pack(&schema, &params.values())?;
        Ok((packed_schema, packed_payload))
    }

    fn commit(&mut self, params: RecordParams) -> Result<()> {
        let (packed_schema, packed_payload) = Self::pack_params(&params)?;
        self.params = params;
        self.packed_schema = packed_schema;
        self.packed_payload = packed_payload;
        Ok(())
    }

    pub fn params(&self) -> &RecordParams {
        &self.params
    }

    pub fn timestamp(&self) -> i64 {
        self.params.timestamp
    }

    /// `<schema>|<payload>`
    pub fn packed_string(&self) -> String {
        format!(
            "{}{}{}",
            self.packed_schema, RECORD_SEPARATOR, self.packed_payload
        )
    }

    /// Set one field and re-pack. On error the record is left unchanged.
    pub fn set(&mut self, field: RecordField) -> Result<()> {
        let mut params = self.params.clone();
        params.apply(field);
        self.commit(params)
    }

    /// Replace every field at once and re-pack
    pub fn replace(&mut self, params: RecordParams) -> Result<()> {
        self.commit(params)
    }

    /// Adopt another record's generation parameters.
    ///
    /// Copies everything except `pw` and `timestamp`, and marks the record as
    /// user-set.
    pub fn apply_params(&mut self, other: &RecordParams) -> Result<()> {
        let params = RecordParams {
            is_initial: false,
            pw: self.params.pw.clone(),
            timestamp: self.params.timestamp,
            ..other.clone()
        };
        self.commit(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: i64) -> RecordParams {
        RecordParams {
            is_initial: false,
            lowercase_checked: false,
            uppercase_checked: true,
            numbers_checked: false,
            symbols_checked: true,
            auto_fill_option: AutofillOption::AutofillKeyword,
            pw_length: 100,
            version: 2,
            symbols: "[]~()".to_string(),
            salt: "鹽".to_string(),
            pw: "heh-password".to_string(),
            timestamp,
        }
    }

    #[test]
    fn test_record_round_trip() {
        let cases = vec![
            RecordParams {
                pw_length: 10,
                version: 5,
                symbols: "!@#$%^&*~.".to_string(),
                salt: "salt".to_string(),
                pw: "password".to_string(),
                ..RecordParams::defaults_at(123_456_789)
            },
            sample(123_456_789_456),
            RecordParams::defaults_at(0),
        ];

        for params in cases {
            let record = ParamRecord::new(params.clone()).unwrap();
            let decoded = ParamRecord::from_packed(&record.packed_string()).unwrap();
            assert_eq!(decoded.params(), &params);
            assert_eq!(decoded.packed_string(), record.packed_string());
        }
    }

    #[test]
    fn test_packed_string_shape() {
        let record = ParamRecord::new(RecordParams::defaults_at(1)).unwrap();
        let packed = record.packed_string();
        assert_eq!(packed.matches(RECORD_SEPARATOR).count(), 1);
        assert!(!packed.contains(','));
    }

    #[test]
    fn test_schema_tracks_string_lengths() {
        let mut record = ParamRecord::new(RecordParams::defaults_at(1)).unwrap();
        record.set(RecordField::Salt("example.com".to_string())).unwrap();

        let packed = record.packed_string();
        let (schema_part, _) = packed.split_once('|').unwrap();
        let schema = decompress_schema(schema_part).unwrap();
        assert_eq!(schema[9], FieldType::Str("example.com".len()));
    }

    #[test]
    fn test_set_repacks() {
        let mut record = ParamRecord::new(RecordParams::defaults_at(1)).unwrap();
        let before = record.packed_string();
        record.set(RecordField::PwLength(12)).unwrap();
        assert_ne!(record.packed_string(), before);

        let decoded = ParamRecord::from_packed(&record.packed_string()).unwrap();
        assert_eq!(decoded.params().pw_length, 12);
    }

    #[test]
    fn test_failed_set_leaves_record_unchanged() {
        let mut record = ParamRecord::new(RecordParams::defaults_at(1)).unwrap();
        let before = record.clone();
        let err = record.set(RecordField::Salt("x".repeat(70_000))).unwrap_err();
        assert!(matches!(err, CodecError::InvalidSchema(_)));
        assert_eq!(record, before);
    }

    #[test]
    fn test_empty_unpack_is_noop() {
        let mut record = ParamRecord::new(sample(42)).unwrap();
        let before = record.clone();
        record.unpack_into("").unwrap();
        assert_eq!(record, before);
    }

    #[test]
    fn test_missing_separator() {
        assert!(matches!(
            ParamRecord::from_packed("AAAA"),
            Err(CodecError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let schema = compress_schema(&[FieldType::Bit]).unwrap();
        let payload = pack(&[FieldType::Bit], &[Value::Bit(true)]).unwrap();
        let err = ParamRecord::from_packed(&format!("{}|{}", schema, payload)).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedShape(_)));
    }

    #[test]
    fn test_truncated_payload_surfaces() {
        let record = ParamRecord::new(sample(7)).unwrap();
        let packed = record.packed_string();
        let (schema_part, _) = packed.split_once('|').unwrap();
        let err = ParamRecord::from_packed(&format!("{}|AAAA", schema_part)).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedPayload { .. }));
    }

    #[test]
    fn test_apply_params_keeps_pw_and_timestamp() {
        let mut record = ParamRecord::new(RecordParams {
            pw: "master".to_string(),
            ..RecordParams::defaults_at(5)
        })
        .unwrap();
        record.apply_params(&sample(999)).unwrap();

        let params = record.params();
        assert!(!params.is_initial);
        assert_eq!(params.pw, "master");
        assert_eq!(params.timestamp, 5);
        assert_eq!(params.salt, "鹽");
        assert_eq!(params.auto_fill_option, AutofillOption::AutofillKeyword);
    }

    #[test]
    fn test_unknown_autofill_index_defaults() {
        assert_eq!(AutofillOption::from_index(9), AutofillOption::DoNothing);
        assert_eq!(AutofillOption::from_index(2), AutofillOption::AutofillUrl);
    }

    #[test]
    fn test_record_field_wire_format() {
        let json = serde_json::to_string(&RecordField::PwLength(16)).unwrap();
        assert_eq!(json, r#"{"key":"pwlength","value":16}"#);

        let field: RecordField =
            serde_json::from_str(r#"{"key":"autoFillOption","value":"autofill-url"}"#).unwrap();
        assert_eq!(field, RecordField::AutoFillOption(AutofillOption::AutofillUrl));
    }
}
