//! Base64 VLQ coding for the `mappings` field of source map v3.

use super::{Mapping, OriginalLocation, SourceMapError};

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const VLQ_SHIFT: u32 = 5;
const VLQ_CONTINUATION: u32 = 1 << VLQ_SHIFT;
const VLQ_MASK: u32 = VLQ_CONTINUATION - 1;

fn base64_value(byte: u8) -> Option<u32> {
    match byte {
        b'A'..=b'Z' => Some(u32::from(byte - b'A')),
        b'a'..=b'z' => Some(u32::from(byte - b'a') + 26),
        b'0'..=b'9' => Some(u32::from(byte - b'0') + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Decode every signed value in one comma-free segment.
pub fn decode_vlq_segment(segment: &str) -> Result<Vec<i64>, SourceMapError> {
    let mut values = Vec::with_capacity(5);
    let mut accumulator: i64 = 0;
    let mut shift = 0u32;
    let mut pending = false;

    for (offset, byte) in segment.bytes().enumerate() {
        let digit = base64_value(byte).ok_or(SourceMapError::InvalidBase64 {
            character: char::from(byte),
            offset,
        })?;
        if shift > 60 {
            return Err(SourceMapError::VlqOverflow {
                segment: segment.to_string(),
            });
        }

        accumulator += i64::from(digit & VLQ_MASK) << shift;
        if digit & VLQ_CONTINUATION != 0 {
            shift += VLQ_SHIFT;
            pending = true;
            continue;
        }

        let magnitude = accumulator >> 1;
        values.push(if accumulator & 1 == 1 {
            -magnitude
        } else {
            magnitude
        });
        accumulator = 0;
        shift = 0;
        pending = false;
    }

    if pending {
        return Err(SourceMapError::TruncatedVlq {
            segment: segment.to_string(),
        });
    }
    Ok(values)
}

/// Append the VLQ encoding of `value` to `out`.
pub fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = value.unsigned_abs() << 1;
    if value < 0 {
        vlq |= 1;
    }

    loop {
        let mut digit = (vlq & u64::from(VLQ_MASK)) as usize;
        vlq >>= VLQ_SHIFT;
        if vlq > 0 {
            digit |= VLQ_CONTINUATION as usize;
        }
        out.push(char::from(BASE64_ALPHABET[digit]));
        if vlq == 0 {
            break;
        }
    }
}

fn field(value: i64, line: usize, field: &'static str) -> Result<u32, SourceMapError> {
    u32::try_from(value).map_err(|_| SourceMapError::FieldOutOfRange { line, field, value })
}

/// Decode a full `mappings` string into absolute positions.
///
/// Output is ordered by generated line, then by the order segments appear on
/// that line.
pub fn decode_mappings(mappings: &str) -> Result<Vec<Mapping>, SourceMapError> {
    let mut decoded = Vec::new();
    let mut source: i64 = 0;
    let mut original_line: i64 = 0;
    let mut original_column: i64 = 0;
    let mut name: i64 = 0;

    for (line, encoded_line) in mappings.split(';').enumerate() {
        let mut generated_column: i64 = 0;
        let generated_line = field(line as i64, line, "generated line")?;

        for segment in encoded_line.split(',').filter(|s| !s.is_empty()) {
            let values = decode_vlq_segment(segment)?;
            generated_column += values[0];

            let original = match values.len() {
                1 => None,
                4 | 5 => {
                    source += values[1];
                    original_line += values[2];
                    original_column += values[3];
                    let name_index = if values.len() == 5 {
                        name += values[4];
                        Some(field(name, line, "name index")?)
                    } else {
                        None
                    };
                    Some(OriginalLocation {
                        source: field(source, line, "source index")?,
                        line: field(original_line, line, "original line")?,
                        column: field(original_column, line, "original column")?,
                        name: name_index,
                    })
                }
                count => {
                    return Err(SourceMapError::InvalidSegment {
                        line,
                        segment: segment.to_string(),
                        fields: count,
                    })
                }
            };

            decoded.push(Mapping {
                generated_line,
                generated_column: field(generated_column, line, "generated column")?,
                original,
            });
        }
    }

    Ok(decoded)
}

/// Encode mappings sorted by generated position back into a `mappings` string.
pub fn encode_mappings(mappings: &[Mapping]) -> String {
    let mut out = String::new();
    let mut line = 0u32;
    let mut first_on_line = true;
    let mut previous_column: i64 = 0;
    let mut previous_source: i64 = 0;
    let mut previous_line: i64 = 0;
    let mut previous_original_column: i64 = 0;
    let mut previous_name: i64 = 0;

    for mapping in mappings {
        while line < mapping.generated_line {
            out.push(';');
            line += 1;
            previous_column = 0;
            first_on_line = true;
        }
        if !first_on_line {
            out.push(',');
        }
        first_on_line = false;

        let column = i64::from(mapping.generated_column);
        encode_vlq(column - previous_column, &mut out);
        previous_column = column;

        if let Some(original) = &mapping.original {
            let source = i64::from(original.source);
            let original_line = i64::from(original.line);
            let original_column = i64::from(original.column);
            encode_vlq(source - previous_source, &mut out);
            encode_vlq(original_line - previous_line, &mut out);
            encode_vlq(original_column - previous_original_column, &mut out);
            previous_source = source;
            previous_line = original_line;
            previous_original_column = original_column;

            if let Some(name) = original.name {
                let name = i64::from(name);
                encode_vlq(name - previous_name, &mut out);
                previous_name = name;
            }
        }
    }

    out
}
