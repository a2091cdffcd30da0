//! Comparator and sort primitives over heterogeneous CEL values.
//!
//! The comparator is tri-state (`Less`/`Equal`/`Greater`) and defined for
//! every value kind carrying an ordering capability: the numeric kinds
//! (cross-comparable), strings, byte sequences, booleans, timestamps and
//! durations. Everything else is a type error, never a silent default.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use cel_interpreter::objects::{Key, Map};
use cel_interpreter::Value;
use chrono::{DateTime, FixedOffset};

use crate::error::{Error, Result};

/// Sort direction, parsed case-insensitively from the wire string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Apply the direction to an ascending comparison result. Ties stay
    /// ties, so stable sorts preserve input order in both directions.
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(Error::unknown_order(s)),
        }
    }
}

/// Name of a value's kind, for error messages.
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Int(_) => "int",
        Value::UInt(_) => "uint",
        Value::Float(_) => "double",
        Value::String(_) => "string",
        Value::Bytes(_) => "bytes",
        Value::Bool(_) => "bool",
        Value::Timestamp(_) => "timestamp",
        Value::Duration(_) => "duration",
        Value::List(_) => "list",
        Value::Map(_) => "map",
        Value::Null => "null",
        _ => "value",
    }
}

/// Whether a value carries the ordering capability [`compare`] requires.
pub fn is_orderable(value: &Value) -> bool {
    matches!(
        value,
        Value::Int(_)
            | Value::UInt(_)
            | Value::Float(_)
            | Value::String(_)
            | Value::Bytes(_)
            | Value::Bool(_)
            | Value::Timestamp(_)
            | Value::Duration(_)
    )
}

/// Tri-state comparison. Numeric kinds compare across `int`/`uint`/`double`;
/// every other pair must match kinds exactly or the comparison is an error.
pub fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    let incomparable = || Error::incomparable(kind(a), kind(b));
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::UInt(x), Value::UInt(y)) => Ok(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).ok_or_else(incomparable),
        (Value::Int(x), Value::UInt(y)) => Ok(i128::from(*x).cmp(&i128::from(*y))),
        (Value::UInt(x), Value::Int(y)) => Ok(i128::from(*x).cmp(&i128::from(*y))),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y).ok_or_else(incomparable),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)).ok_or_else(incomparable),
        (Value::UInt(x), Value::Float(y)) => (*x as f64).partial_cmp(y).ok_or_else(incomparable),
        (Value::Float(x), Value::UInt(y)) => x.partial_cmp(&(*y as f64)).ok_or_else(incomparable),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Bytes(x), Value::Bytes(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Ok(x.cmp(y)),
        (Value::Duration(x), Value::Duration(y)) => Ok(x.cmp(y)),
        _ => Err(incomparable()),
    }
}

/// Sort a list, dispatching on element shape:
///
/// - `{order, value}` pair records (the macro expander's accumulator
///   elements) are ordered by their `order` field and projected back to
///   their `value` field;
/// - other records are ordered by the conventional creation timestamp
///   field, the specialization for structured records sorted without a
///   key projection;
/// - anything else is ordered by [`compare`] directly.
pub fn sort(items: Vec<Value>, order: SortOrder) -> Result<Vec<Value>> {
    let all_records = !items.is_empty() && items.iter().all(|v| matches!(v, Value::Map(_)));
    if all_records {
        if items.iter().all(is_pair_record) {
            sort_pairs(items, order)
        } else {
            sort_by_creation(items, order)
        }
    } else {
        sort_values(items, order)
    }
}

/// Stable sort of directly comparable values.
pub fn sort_values(mut items: Vec<Value>, order: SortOrder) -> Result<Vec<Value>> {
    let mut failure: Option<Error> = None;
    items.sort_by(|a, b| match compare(a, b) {
        Ok(ordering) => order.apply(ordering),
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(items),
    }
}

/// Stable sort of `{order, value}` pair records by their `order` field,
/// projecting the `value` field out of the sorted result.
pub fn sort_pairs(items: Vec<Value>, order: SortOrder) -> Result<Vec<Value>> {
    let mut pairs = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let record = match &item {
            Value::Map(map) => map.clone(),
            _ => return Err(Error::MalformedPair { index }),
        };
        let key = map_get(&record, PAIR_ORDER_KEY)
            .cloned()
            .ok_or(Error::MalformedPair { index })?;
        let value = map_get(&record, PAIR_VALUE_KEY)
            .cloned()
            .ok_or(Error::MalformedPair { index })?;
        pairs.push((key, value));
    }

    let mut failure: Option<Error> = None;
    pairs.sort_by(|a, b| match compare(&a.0, &b.0) {
        Ok(ordering) => order.apply(ordering),
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(pairs.into_iter().map(|(_, value)| value).collect()),
    }
}

/// Stable sort of structured records by `metadata.creationTimestamp`.
pub fn sort_by_creation(items: Vec<Value>, order: SortOrder) -> Result<Vec<Value>> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let timestamp = creation_timestamp(&item)?;
        keyed.push((timestamp, item));
    }
    keyed.sort_by(|a, b| order.apply(a.0.cmp(&b.0)));
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

/// Positional list reversal. Works for any element type; no error path.
pub fn reverse_list(mut items: Vec<Value>) -> Vec<Value> {
    items.reverse();
    items
}

/// Field names of the two-field record built by `pair`.
pub const PAIR_ORDER_KEY: &str = "order";
pub const PAIR_VALUE_KEY: &str = "value";

/// Build the `{order, value}` record the expanded `sortBy` accumulates.
/// Fails when the key does not implement the ordering capability.
pub fn make_pair(order: Value, value: Value) -> Result<Value> {
    if !is_orderable(&order) {
        return Err(Error::UnorderedPairKey {
            kind: kind(&order).to_string(),
        });
    }
    let mut record = std::collections::HashMap::with_capacity(2);
    record.insert(Key::String(Arc::new(PAIR_ORDER_KEY.to_string())), order);
    record.insert(Key::String(Arc::new(PAIR_VALUE_KEY.to_string())), value);
    Ok(Value::Map(Map {
        map: Arc::new(record),
    }))
}

fn is_pair_record(value: &Value) -> bool {
    match value {
        Value::Map(map) => {
            map_get(map, PAIR_ORDER_KEY).is_some() && map_get(map, PAIR_VALUE_KEY).is_some()
        }
        _ => false,
    }
}

fn map_get<'a>(map: &'a Map, field: &str) -> Option<&'a Value> {
    map.map.get(&Key::String(Arc::new(field.to_string())))
}

fn creation_timestamp(item: &Value) -> Result<DateTime<FixedOffset>> {
    let record = match item {
        Value::Map(map) => map,
        other => return Err(Error::no_creation_timestamp(format!("element is a {}", kind(other)))),
    };
    let metadata = match map_get(record, "metadata") {
        Some(Value::Map(map)) => map.clone(),
        _ => return Err(Error::no_creation_timestamp("missing metadata")),
    };
    match map_get(&metadata, "creationTimestamp") {
        Some(Value::Timestamp(ts)) => Ok(*ts),
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| Error::no_creation_timestamp(e.to_string())),
        _ => Err(Error::no_creation_timestamp(
            "missing metadata.creationTimestamp",
        )),
    }
}
