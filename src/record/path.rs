use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Record, Value};
use crate::error::{ReduceError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PathSegment {
    Field(String),
    Index(usize),
}

/// Dotted field path such as `customer.address.city` or `lines[0].amount`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPath {
    expr: String,
    segments: Vec<PathSegment>,
}

impl KeyPath {
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(ReduceError::config("Key path must not be empty"));
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if name.is_empty() {
                return Err(ReduceError::config(format!(
                    "Invalid key path '{}': empty field name",
                    trimmed
                )));
            }
            segments.push(PathSegment::Field(name.to_string()));

            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(|| {
                    ReduceError::config(format!("Invalid key path '{}': unterminated index", trimmed))
                })?;
                let index = rest[1..close].parse::<usize>().map_err(|_| {
                    ReduceError::config(format!(
                        "Invalid key path '{}': bad index '{}'",
                        trimmed,
                        &rest[1..close]
                    ))
                })?;
                segments.push(PathSegment::Index(index));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(ReduceError::config(format!(
                        "Invalid key path '{}': unexpected '{}'",
                        trimmed, rest
                    )));
                }
            }
        }

        Ok(Self {
            expr: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.expr
    }

    pub fn evaluate<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut current = match first {
            PathSegment::Field(name) => record.get(name)?,
            PathSegment::Index(_) => return None,
        };

        for segment in rest {
            current = match (segment, current) {
                (PathSegment::Field(name), Value::Object(fields)) => fields.get(name)?,
                (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Writes `value` at this path, creating intermediate objects as needed.
    pub(crate) fn assign(&self, record: &mut Record, value: Value) -> Result<()> {
        let Some((PathSegment::Field(name), rest)) = self.segments.split_first() else {
            return Err(ReduceError::config(format!("Invalid key path '{}'", self.expr)));
        };

        if rest.is_empty() {
            record.set(name.clone(), value);
            return Ok(());
        }

        let slot = record
            .fields_mut()
            .entry(name.clone())
            .or_insert(Value::Null);
        assign_into(slot, rest, value, &self.expr)
    }
}

fn assign_into(target: &mut Value, segments: &[PathSegment], value: Value, expr: &str) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return Ok(());
    };

    match head {
        PathSegment::Field(name) => {
            if matches!(target, Value::Null) {
                *target = Value::Object(IndexMap::new());
            }
            match target {
                Value::Object(fields) => {
                    let child = fields.entry(name.clone()).or_insert(Value::Null);
                    assign_into(child, rest, value, expr)
                }
                other => Err(ReduceError::TypeMismatch {
                    path: expr.to_string(),
                    expected: "object",
                    found: other.type_name().to_string(),
                }),
            }
        }
        PathSegment::Index(index) => match target {
            Value::Array(items) if *index < items.len() => assign_into(&mut items[*index], rest, value, expr),
            other => Err(ReduceError::TypeMismatch {
                path: expr.to_string(),
                expected: "array element",
                found: other.type_name().to_string(),
            }),
        },
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl TryFrom<String> for KeyPath {
    type Error = ReduceError;

    fn try_from(value: String) -> Result<Self> {
        KeyPath::parse(&value)
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> Self {
        path.expr
    }
}

impl std::str::FromStr for KeyPath {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self> {
        KeyPath::parse(s)
    }
}
