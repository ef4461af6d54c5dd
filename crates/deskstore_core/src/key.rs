//! Primary keys.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

const TAG_INT: u8 = 0x01;
const TAG_TEXT: u8 = 0x02;
const SIGN_FLIP: u64 = 1 << 63;
/// 2^53: floats below this magnitude hold integers exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// The integer a JSON number equals, if any. `2` and `2.0` both give 2.
pub(crate) fn integral(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT)
            .map(|f| f as i64)
    })
}

/// The primary key of a record.
///
/// Integer keys order before text keys; within a kind keys use their natural
/// order. Stored keys are encoded so that byte order matches this order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    /// An integer key (auto-increment keys are always integers).
    Int(i64),
    /// A string key.
    Text(String),
}

impl RecordKey {
    /// Extracts a key from a JSON value.
    ///
    /// Integer-valued floats such as `2.0` are integer keys. Returns `None`
    /// for values that cannot be keys (null, booleans, fractional numbers,
    /// arrays, objects).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => integral(n).map(Self::Int),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Converts the key back into a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }

    /// Encodes the key into order-preserving bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Int(i) => {
                let mut out = Vec::with_capacity(9);
                out.push(TAG_INT);
                out.extend_from_slice(&((*i as u64) ^ SIGN_FLIP).to_be_bytes());
                out
            }
            Self::Text(s) => {
                let mut out = Vec::with_capacity(1 + s.len());
                out.push(TAG_TEXT);
                out.extend_from_slice(s.as_bytes());
                out
            }
        }
    }

    /// Decodes a key produced by [`RecordKey::encode`].
    ///
    /// # Errors
    ///
    /// Returns a corruption error for unknown tags, wrong lengths or invalid
    /// UTF-8.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        match bytes.split_first() {
            Some((&TAG_INT, rest)) => {
                let arr: [u8; 8] = rest
                    .try_into()
                    .map_err(|_| CoreError::corrupted("integer key must be 8 bytes"))?;
                Ok(Self::Int((u64::from_be_bytes(arr) ^ SIGN_FLIP) as i64))
            }
            Some((&TAG_TEXT, rest)) => String::from_utf8(rest.to_vec())
                .map(Self::Text)
                .map_err(|_| CoreError::corrupted("text key is not valid UTF-8")),
            _ => Err(CoreError::corrupted("unknown key encoding")),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for RecordKey {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
