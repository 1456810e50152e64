//! Value objects exchanged with drivers: queries, deltas and call options.

use crate::{Error, Record, Result, path};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const LIMIT: &str = "$limit";
const SKIP: &str = "$skip";
const SORT: &str = "$sort";
const SET: &str = "$set";
const UNSET: &str = "$unset";

/// A filter plus its cursor options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub query: Record,
    #[serde(default)]
    pub opts: QueryOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Record>,
}

impl Query {
    /// Builds a query from a filter object, lifting `$limit`, `$skip` and
    /// `$sort` into [`QueryOptions`].
    pub fn new(filter: Value) -> Result<Self> {
        let Value::Object(mut query) = filter else {
            return Err(Error::invalid_argument(format!(
                "a query must be an object, got `{filter}`"
            )));
        };

        let opts = QueryOptions {
            limit: take_count(&mut query, LIMIT)?,
            skip: take_count(&mut query, SKIP)?,
            sort: match query.remove(SORT) {
                None | Some(Value::Null) => None,
                Some(Value::Object(sort)) => Some(sort),
                Some(other) => {
                    return Err(Error::invalid_argument(format!(
                        "`{SORT}` must be an object, got `{other}`"
                    )));
                }
            },
        };

        Ok(Self { query, opts })
    }

    pub fn to_value(&self) -> Value {
        json!({ "query": self.query, "opts": self.opts })
    }

    pub(crate) fn from_hook_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

fn take_count(query: &mut Record, key: &str) -> Result<Option<u64>> {
    match query.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            Error::invalid_argument(format!("`{key}` must be a non-negative integer"))
        }),
    }
}

/// An update document such as `{"$set": {...}, "$unset": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub diff: Value,
}

impl Delta {
    pub fn new(diff: Value) -> Result<Self> {
        if !diff.is_object() {
            return Err(Error::invalid_argument(format!(
                "a delta must be an object, got `{diff}`"
            )));
        }

        Ok(Self { diff })
    }

    /// The minimal delta turning `old` into `new`. Changed or added leaves are
    /// `$set` under their dotted path, removed keys are `$unset`; arrays are
    /// compared as a whole.
    pub fn between(old: &Record, new: &Record) -> Self {
        let mut set = Map::new();
        let mut unset = Map::new();

        diff_into(old, new, "", &mut set, &mut unset);

        let mut diff = Map::new();
        if !set.is_empty() {
            diff.insert(SET.into(), Value::Object(set));
        }
        if !unset.is_empty() {
            diff.insert(UNSET.into(), Value::Object(unset));
        }

        Self {
            diff: Value::Object(diff),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.diff {
            Value::Object(map) => map.values().all(|value| match value {
                Value::Object(fields) => fields.is_empty(),
                _ => false,
            }),
            _ => true,
        }
    }

    /// Applies the delta to `record`. Keys outside `$set`/`$unset` are set
    /// as they are.
    pub fn apply(&self, record: &mut Record) {
        let Value::Object(diff) = &self.diff else {
            return;
        };

        for (key, value) in diff {
            match (key.as_str(), value) {
                (SET, Value::Object(fields)) => {
                    for (path, value) in fields {
                        path::set(record, path, value.clone());
                    }
                }
                (UNSET, Value::Object(fields)) => {
                    for path in fields.keys() {
                        path::remove(record, path);
                    }
                }
                (operator, _) if operator.starts_with('$') => {}
                (path, value) => path::set(record, path, value.clone()),
            }
        }
    }

    /// The fields this delta writes, as a nested object suitable for partial
    /// validation.
    pub fn patch(&self) -> Record {
        let mut patch = Record::new();
        self.apply(&mut patch);
        patch
    }
}

fn diff_into(old: &Record, new: &Record, prefix: &str, set: &mut Record, unset: &mut Record) {
    for (key, value) in new {
        let path = format!("{prefix}{key}");

        match (old.get(key), value) {
            (Some(previous), _) if previous == value => {}
            (Some(Value::Object(previous)), Value::Object(current)) => {
                diff_into(previous, current, &format!("{path}."), set, unset);
            }
            _ => {
                set.insert(path, value.clone());
            }
        }
    }

    for key in old.keys() {
        if !new.contains_key(key) {
            unset.insert(format!("{prefix}{key}"), Value::from(""));
        }
    }
}

/// Per-call options, handed to hooks and to the driver unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub raw_mode: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_schema_validation: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Options {
    pub fn with_skip_schema_validation(mut self, skip: bool) -> Self {
        self.skip_schema_validation = skip;
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub(crate) fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    pub(crate) fn from_hook_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Anything usable as a query filter.
pub trait Filter: Send {
    fn to_filter(&self) -> Value;
}

impl Filter for Value {
    fn to_filter(&self) -> Value {
        self.clone()
    }
}

impl Filter for Record {
    fn to_filter(&self) -> Value {
        Value::Object(self.clone())
    }
}

/// Anything usable as an update document.
pub trait Update: Send {
    fn to_update(&self) -> Value;
}

impl Update for Value {
    fn to_update(&self) -> Value {
        self.clone()
    }
}

impl Update for Record {
    fn to_update(&self) -> Value {
        Value::Object(self.clone())
    }
}

impl Update for Delta {
    fn to_update(&self) -> Value {
        self.diff.clone()
    }
}

/// Comparison operators for typed filters.
#[derive(Debug)]
pub enum FilterOperator<'a, T: Serialize + ?Sized> {
    Eq(&'a T),
    Ne(&'a T),
    Gt(&'a T),
    Gte(&'a T),
    Lt(&'a T),
    Lte(&'a T),
    In(&'a [&'a T]),
    Nin(&'a [&'a T]),
}

impl<T: Serialize + ?Sized> FilterOperator<'_, T> {
    /// Equality is written as the plain value so that it also matches array
    /// members; every other operator keeps its `$` form.
    pub fn to_value(&self) -> Value {
        fn convert<T: Serialize + ?Sized>(value: &T) -> Value {
            serde_json::to_value(value).unwrap_or(Value::Null)
        }

        let (operator, value) = match self {
            Self::Eq(value) => return convert(*value),
            Self::Ne(value) => ("$ne", convert(*value)),
            Self::Gt(value) => ("$gt", convert(*value)),
            Self::Gte(value) => ("$gte", convert(*value)),
            Self::Lt(value) => ("$lt", convert(*value)),
            Self::Lte(value) => ("$lte", convert(*value)),
            Self::In(values) => ("$in", convert(values)),
            Self::Nin(values) => ("$nin", convert(values)),
        };

        json!({ operator: value })
    }
}

/// A field of a typed filter or update that is either set or left out.
#[derive(Debug)]
pub enum Field<T> {
    Set(T),
    Omit,
}

impl<T> Field<T> {
    pub fn from_opt(opt: Option<T>) -> Self {
        match opt {
            Some(val) => Self::Set(val),
            None => Self::Omit,
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Omit
    }
}
