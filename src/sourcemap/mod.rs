//! Source map v3 model.
//!
//! Only what the rewriter needs: parse, decode `mappings` into absolute
//! positions, and re-encode an adjusted mapping list while carrying every
//! other field through untouched.

pub mod lines;
pub mod vlq;

pub use lines::{LineIndex, Position};
pub use vlq::{decode_mappings, decode_vlq_segment, encode_mappings, encode_vlq};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceMapError {
    #[error("unsupported source map version {0}, expected 3")]
    UnsupportedVersion(u32),

    #[error("invalid base64 character {character:?} at offset {offset} in mappings segment")]
    InvalidBase64 { character: char, offset: usize },

    #[error("VLQ value overflows in segment {segment:?}")]
    VlqOverflow { segment: String },

    #[error("truncated VLQ value in segment {segment:?}")]
    TruncatedVlq { segment: String },

    #[error("segment {segment:?} on generated line {line} has {fields} fields, expected 1, 4 or 5")]
    InvalidSegment {
        line: usize,
        segment: String,
        fields: usize,
    },

    #[error("{field} {value} out of range on generated line {line}")]
    FieldOutOfRange {
        line: usize,
        field: &'static str,
        value: i64,
    },

    #[error("source map JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Position in the original source a generated position maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginalLocation {
    pub source: u32,
    pub line: u32,
    pub column: u32,
    pub name: Option<u32>,
}

/// One decoded `mappings` segment with absolute values.
///
/// Generated columns count UTF-16 code units. A mapping with no original
/// location marks the start of an unmapped span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub original: Option<OriginalLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

impl SourceMap {
    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        let map: SourceMap = serde_json::from_str(json)?;
        if map.version != 3 {
            return Err(SourceMapError::UnsupportedVersion(map.version));
        }
        Ok(map)
    }

    pub fn to_json(&self) -> Result<String, SourceMapError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode_mappings(&self) -> Result<Vec<Mapping>, SourceMapError> {
        decode_mappings(&self.mappings)
    }

    /// Copy of this map with `mappings` replaced by the encoding of `mappings`.
    pub fn with_mappings(&self, mappings: &[Mapping]) -> SourceMap {
        SourceMap {
            mappings: encode_mappings(mappings),
            ..self.clone()
        }
    }
}
