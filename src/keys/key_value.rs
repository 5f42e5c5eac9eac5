use std::cmp::Ordering;

/// A key value after null normalization and kind conversion.
///
/// Case-insensitive string keys are stored lower-cased, so comparing and
/// hashing extracted values never needs to look at the key again.
#[derive(Debug, Clone)]
pub enum KeyValue {
    Null,
    Str(String),
    Int(i32),
    Long(i64),
    Double(f64),
    /// Microseconds since the Unix epoch. Sub-microsecond precision is
    /// dropped, so dates within the same microsecond are equal keys even
    /// though the stored record values keep their nanoseconds.
    Date(i64),
}

impl KeyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, KeyValue::Null)
    }

    pub fn hash_code(&self) -> i32 {
        match self {
            KeyValue::Null => 0,
            KeyValue::Str(s) => crc32fast::hash(s.as_bytes()) as i32,
            KeyValue::Int(i) => *i,
            KeyValue::Long(v) | KeyValue::Date(v) => fold_i64(*v),
            KeyValue::Double(f) => fold_i64(f.to_bits() as i64),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            KeyValue::Null => 0,
            KeyValue::Str(_) => 1,
            KeyValue::Int(_) => 2,
            KeyValue::Long(_) => 3,
            KeyValue::Double(_) => 4,
            KeyValue::Date(_) => 5,
        }
    }
}

/// XOR of the low and high 32-bit words.
pub fn fold_i64(value: i64) -> i32 {
    (value as i32) ^ ((value >> 32) as i32)
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Null, KeyValue::Null) => Ordering::Equal,
            (KeyValue::Str(a), KeyValue::Str(b)) => a.cmp(b),
            (KeyValue::Int(a), KeyValue::Int(b)) => a.cmp(b),
            (KeyValue::Long(a), KeyValue::Long(b)) => a.cmp(b),
            (KeyValue::Date(a), KeyValue::Date(b)) => a.cmp(b),
            (KeyValue::Double(a), KeyValue::Double(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

/// Materialized key values of one record, in key order.
///
/// The derived ordering ignores direction flags; it is only used where
/// equality matters (unique sets). Ordered comparisons go through
/// `RecordComparer::compare_keys`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeyTuple(Vec<KeyValue>);

impl KeyTuple {
    pub fn new(values: Vec<KeyValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&KeyValue> {
        self.0.get(index)
    }
}
