//! Bit stream packer.
//!
//! Bits are written MSB-first within a byte. The cursor is a byte position
//! plus a bit offset in `0..=8`; an offset of 8 means the current byte is full
//! and the next bit write moves on. Every non-bit field first aligns to a byte
//! boundary, padding up to 7 bits with zeros.
//!
//! [`calculate_size`] replays the same bookkeeping without writing, so the
//! packed buffer can be sized exactly before any field is written.

use super::{decode_b64, encode_b64, CodecError, FieldType, Result, Value};

/// Writer over a growable byte buffer
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    byte_pos: usize,
    bit_offset: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with room for `size` bytes
    pub fn with_capacity(size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(size),
            byte_pos: 0,
            bit_offset: 0,
        }
    }

    /// Bytes touched so far, including a partially written trailing byte
    pub fn len(&self) -> usize {
        self.byte_pos + usize::from(self.bit_offset > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure(&mut self, end: usize) {
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
    }

    pub fn write_bit(&mut self, value: bool) {
        if self.bit_offset >= 8 {
            self.byte_pos += 1;
            self.bit_offset = 0;
        }
        self.ensure(self.byte_pos + 1);

        let mask = 1u8 << (7 - self.bit_offset);
        if value {
            self.buf[self.byte_pos] |= mask;
        } else {
            self.buf[self.byte_pos] &= !mask;
        }
        self.bit_offset += 1;
    }

    /// Write the low `count` bits of `value`, most significant first, without aligning
    pub fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32);
        for shift in (0..count).rev() {
            self.write_bit((value >> shift) & 1 == 1);
        }
    }

    pub fn align_to_byte(&mut self) {
        if self.bit_offset > 0 {
            self.byte_pos += 1;
            self.bit_offset = 0;
        }
    }

    fn write_aligned(&mut self, bytes: &[u8]) {
        self.align_to_byte();
        let end = self.byte_pos + bytes.len();
        self.ensure(end);
        self.buf[self.byte_pos..end].copy_from_slice(bytes);
        self.byte_pos = end;
    }

    pub fn write_byte(&mut self, value: u8) {
        self.write_aligned(&[value]);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_aligned(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_aligned(&value.to_be_bytes());
    }

    /// Write `value` as exactly `len` bytes: UTF-8, truncated or zero-padded.
    ///
    /// A zero-length string still aligns the cursor, matching [`calculate_size`].
    pub fn write_str(&mut self, value: &str, len: usize) {
        let bytes = value.as_bytes();
        let copied = bytes.len().min(len);
        let mut field = vec![0u8; len];
        field[..copied].copy_from_slice(&bytes[..copied]);
        self.write_aligned(&field);
    }

    /// Consume the writer and return exactly [`len`](Self::len) bytes
    pub fn finish(mut self) -> Vec<u8> {
        let used = self.len();
        self.buf.resize(used, 0);
        self.buf
    }
}

/// Reader over a borrowed byte buffer
#[derive(Debug)]
pub struct BitReader<'a> {
    buf: &'a [u8],
    byte_pos: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            byte_pos: 0,
            bit_offset: 0,
        }
    }

    /// Unread bits left in the buffer
    pub fn bits_remaining(&self) -> usize {
        let consumed = self.byte_pos * 8 + usize::from(self.bit_offset);
        (self.buf.len() * 8).saturating_sub(consumed)
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        if self.bit_offset >= 8 {
            self.byte_pos += 1;
            self.bit_offset = 0;
        }
        let byte = *self
            .buf
            .get(self.byte_pos)
            .ok_or(CodecError::TruncatedPayload {
                needed: self.byte_pos + 1,
                available: self.buf.len(),
            })?;

        let value = byte & (1u8 << (7 - self.bit_offset)) != 0;
        self.bit_offset += 1;
        Ok(value)
    }

    /// Read `count` bits (at most 32), most significant first, without aligning
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        debug_assert!(count <= 32);
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Ok(value)
    }

    pub fn align_to_byte(&mut self) {
        if self.bit_offset > 0 {
            self.byte_pos += 1;
            self.bit_offset = 0;
        }
    }

    fn read_aligned(&mut self, len: usize) -> Result<&'a [u8]> {
        self.align_to_byte();
        let end = self.byte_pos + len;
        if end > self.buf.len() {
            return Err(CodecError::TruncatedPayload {
                needed: end,
                available: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.byte_pos..end];
        self.byte_pos = end;
        Ok(bytes)
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_aligned(1)?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.read_aligned(4)?);
        Ok(i32::from_be_bytes(raw))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.read_aligned(8)?);
        Ok(i64::from_be_bytes(raw))
    }

    /// Read a `len`-byte string field, trimming trailing zero bytes.
    ///
    /// Bytes that are not valid UTF-8 (for example a multi-byte character cut
    /// by truncation on write) decode as U+FFFD.
    pub fn read_str(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_aligned(len)?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Exact packed size in bytes for `schema`.
///
/// Must stay in lockstep with [`BitWriter`]: bit fields share a byte until it
/// holds 8 bits, every other field aligns first.
pub fn calculate_size(schema: &[FieldType]) -> usize {
    let mut byte_pos = 0usize;
    let mut bit_offset = 0u8;

    for field in schema {
        match field.byte_width() {
            None => {
                if bit_offset < 8 {
                    bit_offset += 1;
                } else {
                    byte_pos += 1;
                    bit_offset = 1;
                }
            }
            Some(width) => {
                if bit_offset > 0 {
                    byte_pos += 1;
                    bit_offset = 0;
                }
                byte_pos += width;
            }
        }
    }

    if bit_offset > 0 {
        byte_pos += 1;
    }
    byte_pos
}

/// Pack `values` under `schema` into raw bytes
pub fn pack_bytes(schema: &[FieldType], values: &[Value]) -> Result<Vec<u8>> {
    if schema.len() != values.len() {
        return Err(CodecError::LengthMismatch {
            schema: schema.len(),
            values: values.len(),
        });
    }

    let size = calculate_size(schema);
    let mut writer = BitWriter::with_capacity(size);

    for (index, (field, value)) in schema.iter().zip(values).enumerate() {
        match (field, value) {
            (FieldType::Bit, Value::Bit(v)) | (FieldType::Bool, Value::Bool(v)) => {
                writer.write_bit(*v)
            }
            (FieldType::Byte, Value::Byte(v)) => writer.write_byte(*v),
            (FieldType::Int32, Value::Int32(v)) => writer.write_i32(*v),
            (FieldType::Int64, Value::Int64(v)) | (FieldType::Timestamp, Value::Timestamp(v)) => {
                writer.write_i64(*v)
            }
            (FieldType::Str(len), Value::Str(s)) => writer.write_str(s, *len),
            _ => {
                return Err(CodecError::TypeMismatch {
                    index,
                    expected: *field,
                    found: value.kind(),
                })
            }
        }
    }

    debug_assert_eq!(writer.len(), size, "calculate_size out of step with writer");
    Ok(writer.finish())
}

/// Pack `values` under `schema` and return the standard base64 text
pub fn pack(schema: &[FieldType], values: &[Value]) -> Result<String> {
    Ok(encode_b64(&pack_bytes(schema, values)?))
}

/// Decode raw bytes strictly in `schema` order
pub fn unpack_bytes(schema: &[FieldType], bytes: &[u8]) -> Result<Vec<Value>> {
    let mut reader = BitReader::new(bytes);
    let mut values = Vec::with_capacity(schema.len());

    for field in schema {
        let value = match *field {
            FieldType::Bit => Value::Bit(reader.read_bit()?),
            FieldType::Bool => Value::Bool(reader.read_bit()?),
            FieldType::Byte => Value::Byte(reader.read_byte()?),
            FieldType::Int32 => Value::Int32(reader.read_i32()?),
            FieldType::Int64 => Value::Int64(reader.read_i64()?),
            FieldType::Timestamp => Value::Timestamp(reader.read_i64()?),
            FieldType::Str(len) => Value::Str(reader.read_str(len)?),
        };
        values.push(value);
    }

    Ok(values)
}

/// Decode base64 `payload` strictly in `schema` order
pub fn unpack(schema: &[FieldType], payload: &str) -> Result<Vec<Value>> {
    unpack_bytes(schema, &decode_b64(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use FieldType::*;

    fn mixed_schema() -> Vec<FieldType> {
        vec![
            Bit, Byte, Int32, Int64, Str(14), Int32, Bit, Str(8), Str(0), Bit, Bool, Str(4),
        ]
    }

    fn mixed_values() -> Vec<Value> {
        vec![
            Value::Bit(true),
            Value::Byte(255),
            Value::Int32(123_456),
            Value::Int64(9_007_199_254_740_991),
            Value::Str("Hello, 世界!".to_string()),
            Value::Int32(-123_456),
            Value::Bit(false),
            Value::Str("Test1234".to_string()),
            Value::Str(String::new()),
            Value::Bit(true),
            Value::Bool(true),
            Value::Str("ABCD".to_string()),
        ]
    }

    #[test]
    fn test_pack_unpack_mixed_schema() {
        let schema = mixed_schema();
        let values = mixed_values();

        let packed = pack(&schema, &values).unwrap();
        let unpacked = unpack(&schema, &packed).unwrap();
        assert_eq!(unpacked, values);
    }

    #[test]
    fn test_pack_unpack_strings_first() {
        let schema = vec![Str(10), Str(5), Int64, Bit, Timestamp, Bit];
        let values = vec![
            Value::Str("Test".to_string()),
            Value::Str("ABC".to_string()),
            Value::Int64(123_456_789),
            Value::Bit(true),
            Value::Timestamp(1_700_000_000_123),
            Value::Bit(false),
        ];

        let unpacked = unpack(&schema, &pack(&schema, &values).unwrap()).unwrap();
        assert_eq!(unpacked, values);
    }

    #[test]
    fn test_extreme_integers() {
        let schema = vec![Int32, Int32, Int64, Int64, Timestamp];
        let values = vec![
            Value::Int32(i32::MIN),
            Value::Int32(i32::MAX),
            Value::Int64(i64::MIN),
            Value::Int64(i64::MAX),
            Value::Timestamp(-1),
        ];

        let unpacked = unpack(&schema, &pack(&schema, &values).unwrap()).unwrap();
        assert_eq!(unpacked, values);
    }

    #[test]
    fn test_calculate_size_matches_writer() {
        let cases: Vec<Vec<FieldType>> = vec![
            vec![],
            vec![Bit],
            vec![Bit; 8],
            vec![Bit; 9],
            vec![Bool, Bool, Bool, Bool, Bool, Byte, Int32, Int32, Str(17), Str(0), Str(6), Timestamp],
            vec![Str(0), Bit, Str(0)],
            mixed_schema(),
        ];

        for schema in cases {
            let values: Vec<Value> = schema
                .iter()
                .map(|f| match f {
                    Bit => Value::Bit(true),
                    Bool => Value::Bool(true),
                    Byte => Value::Byte(7),
                    Int32 => Value::Int32(7),
                    Int64 => Value::Int64(7),
                    Timestamp => Value::Timestamp(7),
                    Str(n) => Value::Str("x".repeat(*n)),
                })
                .collect();
            let bytes = pack_bytes(&schema, &values).unwrap();
            assert_eq!(bytes.len(), calculate_size(&schema), "schema {:?}", schema);
        }
    }

    #[test]
    fn test_bit_layout_is_msb_first() {
        let schema = vec![Bit, Bool, Bit];
        let values = vec![Value::Bit(true), Value::Bool(false), Value::Bit(true)];
        assert_eq!(pack_bytes(&schema, &values).unwrap(), vec![0b1010_0000]);
    }

    #[test]
    fn test_ninth_bit_spills_into_next_byte() {
        let schema = vec![Bit; 9];
        let values = vec![Value::Bit(true); 9];
        assert_eq!(pack_bytes(&schema, &values).unwrap(), vec![0xFF, 0x80]);
    }

    #[test]
    fn test_non_bit_field_aligns() {
        let bytes = pack_bytes(&[Bit, Byte], &[Value::Bit(true), Value::Byte(0x7F)]).unwrap();
        assert_eq!(bytes, vec![0x80, 0x7F]);
    }

    #[test]
    fn test_int32_is_big_endian() {
        let bytes = pack_bytes(&[Int32], &[Value::Int32(0x0102_0304)]).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_over_length_string_truncates() {
        let schema = vec![Str(4)];
        let packed = pack(&schema, &[Value::Str("ABCDEFG".to_string())]).unwrap();
        let unpacked = unpack(&schema, &packed).unwrap();
        assert_eq!(unpacked, vec![Value::Str("ABCD".to_string())]);
    }

    #[test]
    fn test_truncated_multibyte_char_decodes_lossy() {
        // "世" is three bytes; keep only two
        let schema = vec![Str(2)];
        let unpacked = unpack(&schema, &pack(&schema, &[Value::Str("世".to_string())]).unwrap())
            .unwrap();
        assert_eq!(unpacked, vec![Value::Str("\u{FFFD}".to_string())]);
    }

    #[test]
    fn test_trailing_zero_bytes_are_trimmed() {
        let schema = vec![Str(6)];
        let unpacked = unpack(&schema, &pack(&schema, &[Value::Str("ab\0".to_string())]).unwrap())
            .unwrap();
        assert_eq!(unpacked, vec![Value::Str("ab".to_string())]);
    }

    #[test]
    fn test_length_mismatch() {
        let err = pack(&[Bit, Bit], &[Value::Bit(true)]).unwrap_err();
        assert_eq!(err, CodecError::LengthMismatch { schema: 2, values: 1 });
    }

    #[test]
    fn test_type_mismatch() {
        let err = pack(&[Int32], &[Value::Str("1".to_string())]).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { index: 0, .. }));
    }

    #[test]
    fn test_truncated_payload_is_reported() {
        let schema = vec![Bit, Int32, Str(10)];
        let values = vec![
            Value::Bit(true),
            Value::Int32(5),
            Value::Str("0123456789".to_string()),
        ];
        let mut bytes = pack_bytes(&schema, &values).unwrap();
        bytes.truncate(8);

        let err = unpack_bytes(&schema, &bytes).unwrap_err();
        assert_eq!(err, CodecError::TruncatedPayload { needed: 15, available: 8 });
    }

    #[test]
    fn test_truncated_bit_is_reported() {
        let err = unpack_bytes(&[Bit], &[]).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedPayload { .. }));
    }

    #[test]
    fn test_unaligned_bit_runs() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3);
        writer.write_bits(0xBEEF, 16);
        let bytes = writer.finish();
        assert_eq!(bytes.len(), 3);

        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(16).unwrap(), 0xBEEF);
        assert_eq!(reader.bits_remaining(), 5);
    }
}
