//! Schema compression.
//!
//! Each field becomes a 3-bit tag (see [`FieldType::tag`]); a string tag is
//! followed by its 16-bit byte length. The stream is padded with zero bits to
//! a whole byte, and since tag 0 is reserved the padding never decodes as a
//! field.

use super::{decode_b64, encode_b64, BitReader, BitWriter, CodecError, FieldType, Result};

const TAG_BITS: u8 = 3;
const LENGTH_BITS: u8 = 16;

fn encoded_bits(field: FieldType) -> usize {
    match field {
        FieldType::Str(_) => usize::from(TAG_BITS + LENGTH_BITS),
        _ => usize::from(TAG_BITS),
    }
}

/// Compress a schema into base64 text
pub fn compress_schema(schema: &[FieldType]) -> Result<String> {
    let total_bits: usize = schema.iter().map(|f| encoded_bits(*f)).sum();
    let mut writer = BitWriter::with_capacity(total_bits.div_ceil(8));

    for field in schema {
        writer.write_bits(u32::from(field.tag()), TAG_BITS);
        if let FieldType::Str(len) = *field {
            let len = u16::try_from(len).map_err(|_| {
                CodecError::InvalidSchema(format!(
                    "String length {} exceeds {} bytes",
                    len,
                    u16::MAX
                ))
            })?;
            writer.write_bits(u32::from(len), LENGTH_BITS);
        }
    }

    Ok(encode_b64(&writer.finish()))
}

/// Decompress base64 text produced by [`compress_schema`].
///
/// Decoding stops at the first reserved or out-of-range tag, or when too few
/// bits remain for another field.
pub fn decompress_schema(encoded: &str) -> Result<Vec<FieldType>> {
    let bytes = decode_b64(encoded)?;
    let mut reader = BitReader::new(&bytes);
    let mut schema = Vec::new();

    while reader.bits_remaining() >= usize::from(TAG_BITS) {
        let field = match reader.read_bits(TAG_BITS)? {
            1 => FieldType::Bit,
            2 => FieldType::Bool,
            3 => FieldType::Byte,
            4 => FieldType::Int32,
            5 => FieldType::Int64,
            6 => {
                if reader.bits_remaining() < usize::from(LENGTH_BITS) {
                    break;
                }
                FieldType::Str(reader.read_bits(LENGTH_BITS)? as usize)
            }
            7 => FieldType::Timestamp,
            _ => break,
        };
        schema.push(field);
    }

    Ok(schema)
}

/// Parse a comma-separated description such as `"bit,bool,s12,timestamp"`
pub fn parse_schema(description: &str) -> Result<Vec<FieldType>> {
    description
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}
