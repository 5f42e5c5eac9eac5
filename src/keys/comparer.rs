use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::key_value::{KeyTuple, KeyValue};
use super::TypedKey;
use crate::error::{ReduceError, Result};
use crate::record::Record;

/// Combined hash of a record's keys plus the null-key marker.
///
/// `first_null_key_index` counts from the least significant key: the last
/// key has index 0 and the first key has index `n - 1`. Keys are visited
/// last to first and the most significant null key seen wins, so a value
/// above some threshold means "a key at least this significant is missing".
/// It is -1 when no key is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHash {
    pub hash: i32,
    pub first_null_key_index: i32,
}

impl Default for KeyHash {
    fn default() -> Self {
        Self {
            hash: 0,
            first_null_key_index: -1,
        }
    }
}

impl KeyHash {
    fn mix(&mut self, rank: usize, value: &KeyValue) {
        if value.is_null() {
            self.first_null_key_index = rank as i32;
        } else {
            self.hash ^= value.hash_code();
        }
    }

    pub fn from_values(values: &[KeyValue]) -> Self {
        let mut hash = KeyHash::default();
        let last = values.len().saturating_sub(1);
        for (position, value) in values.iter().enumerate().rev() {
            hash.mix(last - position, value);
        }
        hash
    }

    /// Bucket in `0..fan_out`.
    pub fn partition(&self, fan_out: usize) -> usize {
        (self.hash as u32 as usize) % fan_out.max(1)
    }
}

/// Total order, hash and key materialization over records for one key set.
///
/// Every implementation uses the same null convention, so comparers and
/// hashers built from the same keys always agree: equal key tuples hash
/// equally and compare as `Equal`.
pub trait RecordComparer: Send + Sync + fmt::Debug {
    fn keys(&self) -> &[TypedKey];

    fn compare(&self, a: &Record, b: &Record) -> Result<Ordering>;

    fn hash(&self, record: &Record) -> Result<KeyHash>;

    fn get_keys(&self, record: &Record) -> Result<KeyTuple>;

    fn compare_keys(&self, a: &KeyTuple, b: &KeyTuple) -> Ordering {
        compare_tuples(self.keys(), a, b)
    }

    fn hash_keys(&self, keys: &KeyTuple) -> KeyHash {
        KeyHash::from_values(keys.values())
    }

    fn key_count(&self) -> usize {
        self.keys().len()
    }

    /// Comparer over the first `count` keys only.
    fn clone_prefix(&self, count: usize) -> Result<Arc<dyn RecordComparer>> {
        let keys = self.keys();
        if count == 0 || count > keys.len() {
            return Err(ReduceError::config(format!(
                "Cannot keep {} of {} keys",
                count,
                keys.len()
            )));
        }
        Ok(build(Arc::from(&keys[..count])))
    }
}

fn compare_tuples(keys: &[TypedKey], a: &KeyTuple, b: &KeyTuple) -> Ordering {
    for (key, (left, right)) in keys.iter().zip(a.values().iter().zip(b.values())) {
        let ordering = key.compare_values(left, right);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

pub(crate) fn build(keys: Arc<[TypedKey]>) -> Arc<dyn RecordComparer> {
    match keys.len() {
        1 => Arc::new(SingleKeyComparer {
            keys: [keys[0].clone()],
        }),
        2 => Arc::new(DoubleKeyComparer {
            keys: [keys[0].clone(), keys[1].clone()],
        }),
        _ => Arc::new(MultiKeyComparer { keys }),
    }
}

pub fn comparer_for(keys: Vec<TypedKey>) -> Result<Arc<dyn RecordComparer>> {
    if keys.is_empty() {
        return Err(ReduceError::config("Key list must contain at least one key"));
    }
    Ok(build(keys.into()))
}

#[derive(Debug, Clone)]
pub struct SingleKeyComparer {
    keys: [TypedKey; 1],
}

impl SingleKeyComparer {
    pub fn new(key: TypedKey) -> Self {
        Self { keys: [key] }
    }
}

impl RecordComparer for SingleKeyComparer {
    fn keys(&self) -> &[TypedKey] {
        &self.keys
    }

    fn compare(&self, a: &Record, b: &Record) -> Result<Ordering> {
        let key = &self.keys[0];
        Ok(key.compare_values(&key.extract(a)?, &key.extract(b)?))
    }

    fn hash(&self, record: &Record) -> Result<KeyHash> {
        let mut hash = KeyHash::default();
        hash.mix(0, &self.keys[0].extract(record)?);
        Ok(hash)
    }

    fn get_keys(&self, record: &Record) -> Result<KeyTuple> {
        Ok(KeyTuple::new(vec![self.keys[0].extract(record)?]))
    }

    fn compare_keys(&self, a: &KeyTuple, b: &KeyTuple) -> Ordering {
        match (a.get(0), b.get(0)) {
            (Some(left), Some(right)) => self.keys[0].compare_values(left, right),
            _ => a.len().cmp(&b.len()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DoubleKeyComparer {
    keys: [TypedKey; 2],
}

impl DoubleKeyComparer {
    pub fn new(first: TypedKey, second: TypedKey) -> Self {
        Self {
            keys: [first, second],
        }
    }
}

impl RecordComparer for DoubleKeyComparer {
    fn keys(&self) -> &[TypedKey] {
        &self.keys
    }

    fn compare(&self, a: &Record, b: &Record) -> Result<Ordering> {
        let [first, second] = &self.keys;
        let ordering = first.compare_values(&first.extract(a)?, &first.extract(b)?);
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
        Ok(second.compare_values(&second.extract(a)?, &second.extract(b)?))
    }

    fn hash(&self, record: &Record) -> Result<KeyHash> {
        let [first, second] = &self.keys;
        let mut hash = KeyHash::default();
        hash.mix(0, &second.extract(record)?);
        hash.mix(1, &first.extract(record)?);
        Ok(hash)
    }

    fn get_keys(&self, record: &Record) -> Result<KeyTuple> {
        let [first, second] = &self.keys;
        Ok(KeyTuple::new(vec![first.extract(record)?, second.extract(record)?]))
    }
}

#[derive(Debug, Clone)]
pub struct MultiKeyComparer {
    keys: Arc<[TypedKey]>,
}

impl MultiKeyComparer {
    pub fn new(keys: Vec<TypedKey>) -> Result<Self> {
        if keys.is_empty() {
            return Err(ReduceError::config("Key list must contain at least one key"));
        }
        Ok(Self { keys: keys.into() })
    }
}

impl RecordComparer for MultiKeyComparer {
    fn keys(&self) -> &[TypedKey] {
        &self.keys
    }

    fn compare(&self, a: &Record, b: &Record) -> Result<Ordering> {
        for key in self.keys.iter() {
            let ordering = key.compare_values(&key.extract(a)?, &key.extract(b)?);
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }
        Ok(Ordering::Equal)
    }

    fn hash(&self, record: &Record) -> Result<KeyHash> {
        let mut hash = KeyHash::default();
        let last = self.keys.len().saturating_sub(1);
        for (position, key) in self.keys.iter().enumerate().rev() {
            hash.mix(last - position, &key.extract(record)?);
        }
        Ok(hash)
    }

    fn get_keys(&self, record: &Record) -> Result<KeyTuple> {
        self.keys
            .iter()
            .map(|key| key.extract(record))
            .collect::<Result<Vec<_>>>()
            .map(KeyTuple::new)
    }
}
