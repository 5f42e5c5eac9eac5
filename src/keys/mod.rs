pub mod comparer;
pub mod key_value;


pub use comparer::{
    comparer_for, DoubleKeyComparer, KeyHash, MultiKeyComparer, RecordComparer, SingleKeyComparer,
};
pub use key_value::{KeyTuple, KeyValue};

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::{ReduceError, Result};
use crate::record::{KeyPath, Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    #[default]
    String,
    Int,
    Long,
    Double,
    Date,
}

impl KeyKind {
    pub fn name(&self) -> &'static str {
        match self {
            KeyKind::String => "string",
            KeyKind::Int => "int",
            KeyKind::Long => "long",
            KeyKind::Double => "double",
            KeyKind::Date => "date",
        }
    }
}

/// A field path paired with how its values are compared and hashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedKey {
    #[serde(alias = "field")]
    pub path: KeyPath,
    #[serde(default, alias = "type")]
    pub kind: KeyKind,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl TypedKey {
    pub fn new(path: &str, kind: KeyKind) -> Result<Self> {
        Ok(Self {
            path: KeyPath::parse(path)?,
            kind,
            reverse: false,
            case_insensitive: false,
        })
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Evaluates the path and converts the value to this key's kind.
    ///
    /// Missing fields, nulls and empty strings all become `KeyValue::Null`.
    pub fn extract(&self, record: &Record) -> Result<KeyValue> {
        let value = match record.get_path(&self.path) {
            Some(value) if !value.is_null_like() => value,
            _ => return Ok(KeyValue::Null),
        };

        match (self.kind, value) {
            (KeyKind::String, Value::String(s)) => Ok(if self.case_insensitive {
                KeyValue::Str(s.to_lowercase())
            } else {
                KeyValue::Str(s.clone())
            }),
            (KeyKind::Int, Value::Int(i)) => i32::try_from(*i)
                .map(KeyValue::Int)
                .map_err(|_| self.mismatch("int out of 32-bit range")),
            (KeyKind::Long, Value::Int(i)) => Ok(KeyValue::Long(*i)),
            (KeyKind::Double, Value::Float(f)) => Ok(KeyValue::Double(*f)),
            (KeyKind::Double, Value::Int(i)) => Ok(KeyValue::Double(*i as f64)),
            (KeyKind::Date, Value::Date(d)) => Ok(KeyValue::Date(d.timestamp_micros())),
            (KeyKind::Date, Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|d| KeyValue::Date(d.timestamp_micros()))
                .map_err(|_| self.mismatch("unparseable date string")),
            (_, other) => Err(self.mismatch(other.type_name())),
        }
    }

    /// Compares two extracted values, honoring the direction flag.
    pub fn compare_values(&self, a: &KeyValue, b: &KeyValue) -> Ordering {
        let ordering = a.cmp(b);
        if self.reverse {
            ordering.reverse()
        } else {
            ordering
        }
    }

    fn mismatch(&self, found: &str) -> ReduceError {
        ReduceError::TypeMismatch {
            path: self.path.to_string(),
            expected: self.kind.name(),
            found: found.to_string(),
        }
    }
}

/// Ordered list of typed keys forming one compound key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TypedKey>", into = "Vec<TypedKey>")]
pub struct KeySet {
    keys: Arc<[TypedKey]>,
}

impl KeySet {
    pub fn new(keys: Vec<TypedKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(ReduceError::config("Key list must contain at least one key"));
        }
        Ok(Self { keys: keys.into() })
    }

    pub fn single(key: TypedKey) -> Self {
        Self {
            keys: Arc::from(vec![key]),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[TypedKey] {
        &self.keys
    }

    /// Keeps the first `count` keys.
    pub fn prefix(&self, count: usize) -> Result<Self> {
        if count == 0 || count > self.keys.len() {
            return Err(ReduceError::config(format!(
                "Key prefix {} out of range 1..={}",
                count,
                self.keys.len()
            )));
        }
        Ok(Self {
            keys: Arc::from(&self.keys[..count]),
        })
    }

    pub fn comparer(&self) -> Arc<dyn RecordComparer> {
        comparer::build(self.keys.clone())
    }
}

impl TryFrom<Vec<TypedKey>> for KeySet {
    type Error = ReduceError;

    fn try_from(keys: Vec<TypedKey>) -> Result<Self> {
        KeySet::new(keys)
    }
}

impl From<KeySet> for Vec<TypedKey> {
    fn from(set: KeySet) -> Self {
        set.keys.to_vec()
    }
}
