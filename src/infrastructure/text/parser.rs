//! Text record grammar: `<id><kv-delimiter><v1><value-delimiter><v2>...`
//!
//! A value is a decimal float, or `0x` followed by the hex bit pattern of an
//! IEEE-754 double, which lets vectors round-trip through text bit-exactly.

use crate::domain::entities::record::IdVector;
use crate::domain::error::DomainError;
use crate::domain::ports::record_source::RecordParser;
use crate::domain::values::external_id::display_id;

pub const HEX_PREFIX: &str = "0x";

pub struct TextParser {
    kv_delimiter: String,
    value_delimiter: String,
}

impl TextParser {
    pub fn new(kv_delimiter: impl Into<String>, value_delimiter: impl Into<String>) -> Result<Self, DomainError> {
        let kv_delimiter = kv_delimiter.into();
        let value_delimiter = value_delimiter.into();
        if kv_delimiter.is_empty() || value_delimiter.is_empty() {
            return Err(DomainError::Config("text delimiters must not be empty".into()));
        }
        Ok(Self {
            kv_delimiter,
            value_delimiter,
        })
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self {
            kv_delimiter: "\t".into(),
            value_delimiter: " ".into(),
        }
    }
}

/// Decodes one scalar token.
pub fn parse_value(token: &str) -> Result<f64, DomainError> {
    if let Some(hex) = token.strip_prefix(HEX_PREFIX) {
        let bits = u64::from_str_radix(hex, 16)
            .map_err(|e| DomainError::Decode(format!("bad hex value {token:?}: {e}")))?;
        return Ok(f64::from_bits(bits));
    }
    token
        .parse::<f64>()
        .map_err(|e| DomainError::Decode(format!("bad value {token:?}: {e}")))
}

/// Splits `haystack` around the first occurrence of `needle`.
fn split_once_bytes<'a>(haystack: &'a [u8], needle: &[u8]) -> Option<(&'a [u8], &'a [u8])> {
    let at = haystack
        .windows(needle.len())
        .position(|window| window == needle)?;
    Some((&haystack[..at], &haystack[at + needle.len()..]))
}

impl RecordParser for TextParser {
    /// The id is kept as raw bytes; only the value list must be UTF-8.
    fn parse(&self, raw: &[u8]) -> Result<IdVector, DomainError> {
        let (id, values) = split_once_bytes(raw, self.kv_delimiter.as_bytes())
            .ok_or_else(|| DomainError::Decode(format!("cannot split by {:?}", self.kv_delimiter)))?;
        if id.is_empty() {
            return Err(DomainError::Decode("empty id".into()));
        }
        let values = std::str::from_utf8(values).map_err(|e| {
            DomainError::Decode(format!("values for id {} are not UTF-8: {e}", display_id(id)))
        })?;

        let vector = values
            .split(self.value_delimiter.as_str())
            .filter(|t| !t.is_empty())
            .map(parse_value)
            .collect::<Result<Vec<f64>, _>>()?;
        if vector.is_empty() {
            return Err(DomainError::Decode(format!("no values for id {}", display_id(id))));
        }

        Ok(IdVector {
            id: id.to_vec(),
            vector,
        })
    }
}
