//! # Data Model
//!
//! Records, field keys, values and key-sets consumed by the reconciliation engine.
//! Records are ordered field maps; keys may be strings, integers or the absent marker.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use time::macros::format_description;
use time::Date;

/// A field name inside a [`Record`].
///
/// Keys are ordered as if each were rendered to the lowercase type-tagged
/// string `"<type>:<value>"` (`int:..`, `nonetype:none`, `str:..`). Integer
/// keys therefore compare by their decimal text, not numerically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Int(i64),
    Absent,
    Str(String),
}

impl FieldKey {
    fn type_tag(&self) -> &'static str {
        match self {
            FieldKey::Int(_) => "int",
            FieldKey::Absent => "nonetype",
            FieldKey::Str(_) => "str",
        }
    }

    fn text(&self) -> String {
        match self {
            FieldKey::Int(n) => n.to_string(),
            FieldKey::Absent => "None".to_string(),
            FieldKey::Str(s) => s.clone(),
        }
    }

    /// The lowercase `"<type>:<value>"` form used for hashing.
    pub fn tagged(&self) -> String {
        format!("{}:{}", self.type_tag(), self.text()).to_lowercase()
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl PartialOrd for FieldKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Tags differ in their first letter, so comparing them first is the
        // same as comparing the full tagged strings.
        let (a, b) = (self.text(), other.text());
        self.type_tag()
            .cmp(other.type_tag())
            .then_with(|| {
                a.chars()
                    .flat_map(char::to_lowercase)
                    .cmp(b.chars().flat_map(char::to_lowercase))
            })
            .then_with(|| a.cmp(&b))
    }
}

impl From<&str> for FieldKey {
    fn from(s: &str) -> Self {
        FieldKey::Str(s.to_string())
    }
}

impl From<String> for FieldKey {
    fn from(s: String) -> Self {
        FieldKey::Str(s)
    }
}

impl From<i64> for FieldKey {
    fn from(n: i64) -> Self {
        FieldKey::Int(n)
    }
}

impl<K: Into<FieldKey>> From<Option<K>> for FieldKey {
    fn from(key: Option<K>) -> Self {
        key.map(Into::into).unwrap_or(FieldKey::Absent)
    }
}

/// A field value.
///
/// `Record` values are foreign-key expansions and `List` values are reverse
/// relations; both are reduced or stripped before records are compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(Date),
    Record(Record),
    List(Vec<Value>),
}

impl Value {
    /// Lowercase type name used by the type-tagging transform.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Null => "nonetype",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Date(_) => "date",
            Value::Record(_) => "dict",
            Value::List(_) => "list",
        }
    }

    /// Scalar display text (`None`, `True`, `2`, `2.0`, `2023-05-05`).
    ///
    /// Nested records and lists render as their canonical JSON form.
    pub fn display_text(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => format_float(*x),
            Value::Str(s) => s.clone(),
            Value::Date(d) => format_date(*d),
            Value::Record(_) | Value::List(_) => crate::similarity::canonical_repr(self),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        let text = if x > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else {
        let scientific = format!("{:e}", x);
        match scientific.split_once('e') {
            Some((mantissa, exponent)) => match exponent.parse::<i32>() {
                Ok(exp) if !(-4..16).contains(&exp) => {
                    let sign = if exp < 0 { '-' } else { '+' };
                    format!("{}e{}{:02}", mantissa, sign, exp.abs())
                }
                _ if x.fract() == 0.0 => format!("{:.1}", x),
                _ => x.to_string(),
            },
            None => x.to_string(),
        }
    }
}

pub(crate) fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Date> for Value {
    fn from(d: Date) -> Self {
        Value::Date(d)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Record(Record::from(map)),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::from(n),
            Value::Float(x) => serde_json::Number::from_f64(x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Date(d) => serde_json::Value::String(format_date(d)),
            Value::Record(r) => serde_json::Value::from(r),
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
        }
    }
}

/// An ordered field map. Insertion order is kept; re-inserting a key
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct Record {
    fields: Vec<(FieldKey, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(key, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<FieldKey>,
        V: Into<Value>,
    {
        let mut record = Self::new();
        for (key, value) in pairs {
            record.insert(key, value);
        }
        record
    }

    /// Insert or replace a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<FieldKey>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &FieldKey) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a string-named field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| matches!(k, FieldKey::Str(s) if s == name))
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &FieldKey) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &FieldKey) -> Option<Value> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(pos).1)
    }

    /// Keep only the fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&FieldKey, &Value) -> bool) {
        self.fields.retain(|(k, v)| keep(k, v));
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &Value)> {
        self.fields.iter().map(|(k, v)| (k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&FieldKey, &mut Value)> {
        self.fields.iter_mut().map(|(k, v)| (&*k, v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Record {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Record::from_pairs(map.into_iter().map(|(k, v)| (k, Value::from(v))))
    }
}

impl TryFrom<serde_json::Value> for Record {
    type Error = String;

    fn try_from(json: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        match json {
            serde_json::Value::Object(map) => Ok(Record::from(map)),
            other => Err(format!("expected a JSON object, found {}", other)),
        }
    }
}

impl From<Record> for serde_json::Value {
    fn from(record: Record) -> Self {
        let map = record
            .fields
            .into_iter()
            .map(|(k, v)| {
                let name = match k {
                    FieldKey::Str(s) => s,
                    FieldKey::Int(n) => n.to_string(),
                    FieldKey::Absent => "None".to_string(),
                };
                (name, serde_json::Value::from(v))
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Ordered, de-duplicated list of fields used for comparison and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeySet(Vec<FieldKey>);

impl KeySet {
    /// All keys of `record` sorted by their tagged form.
    ///
    /// Keys differing only in case tie and keep their record order.
    pub fn of(record: &Record) -> Self {
        let mut keys: Vec<FieldKey> = record.keys().cloned().collect();
        keys.sort_by_cached_key(FieldKey::tagged);
        Self(keys)
    }

    /// Validate explicit `keys` against `record`, or fall back to [`KeySet::of`].
    ///
    /// # Errors
    /// Returns [`ReconcileError::UnknownKey`] when an explicit key is not a
    /// field of `record`.
    pub fn for_record(record: &Record, keys: Option<&[FieldKey]>) -> Result<Self> {
        let Some(keys) = keys else {
            return Ok(Self::of(record));
        };
        let mut ordered: Vec<FieldKey> = Vec::with_capacity(keys.len());
        for key in keys {
            if !record.contains_key(key) {
                return Err(ReconcileError::UnknownKey { key: key.clone() });
            }
            if !ordered.contains(key) {
                ordered.push(key.clone());
            }
        }
        Ok(Self(ordered))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldKey> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[FieldKey] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a FieldKey;
    type IntoIter = std::slice::Iter<'a, FieldKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
