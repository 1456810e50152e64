#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use merlin::{
    Config, Delta, Driver, Merlin, Options, Query, Record, Result,
    driver::{IntStream, RecordStream},
    path,
};
use serde_json::Value;
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// A driver call as the test driver saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: &'static str,
    pub collection: String,
    pub query: Value,
    pub limit: Option<u64>,
}

#[derive(Default)]
struct State {
    collections: HashMap<String, Vec<Record>>,
    calls: Vec<Call>,
    next_id: u64,
}

/// Keeps collections in memory and records every call. Clones share state.
#[derive(Clone, Default)]
pub struct TestDriver {
    state: Arc<Mutex<State>>,
}

impl TestDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, collection: &str, records: impl IntoIterator<Item = Value>) {
        let mut state = self.state.lock().unwrap();

        let records = records.into_iter().map(|record| match record {
            Value::Object(record) => record,
            other => panic!("not a record: {other}"),
        });

        state
            .collections
            .entry(collection.to_owned())
            .or_default()
            .extend(records);
    }

    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.state
            .lock()
            .unwrap()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|call| call.op == op).collect()
    }

    fn record_call(&self, op: &'static str, collection: &str, query: Option<&Query>) {
        self.state.lock().unwrap().calls.push(Call {
            op,
            collection: collection.to_owned(),
            query: query.map_or(Value::Null, |query| Value::Object(query.query.clone())),
            limit: query.and_then(|query| query.opts.limit),
        });
    }

    fn matching(&self, collection: &str, query: &Query) -> Vec<usize> {
        let state = self.state.lock().unwrap();

        let indexes = state
            .collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .enumerate()
                    .filter(|(_, record)| matches(record, &query.query))
                    .map(|(index, _)| index)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let skip = usize::try_from(query.opts.skip.unwrap_or(0)).unwrap();
        let limit = query
            .opts
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap());

        indexes.into_iter().skip(skip).take(limit).collect()
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => None,
    }
}

fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(value) => value == expected,
        None => expected.is_null(),
    }
}

fn is_in(value: Option<&Value>, candidates: &Value) -> bool {
    candidates
        .as_array()
        .is_some_and(|candidates| candidates.iter().any(|candidate| equals(value, candidate)))
}

fn satisfies(value: Option<&Value>, operator: &str, operand: &Value) -> bool {
    let ordering = value.and_then(|value| compare(value, operand));

    match operator {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => ordering == Some(Ordering::Greater),
        "$gte" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => ordering == Some(Ordering::Less),
        "$lte" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        "$in" => is_in(value, operand),
        "$nin" => !is_in(value, operand),
        other => panic!("unsupported operator {other}"),
    }
}

pub fn matches(record: &Record, filter: &Record) -> bool {
    filter.iter().all(|(key, condition)| {
        let value = path::get(record, key);

        match condition {
            Value::Object(operators) if operators.keys().all(|key| key.starts_with('$')) => {
                operators
                    .iter()
                    .all(|(operator, operand)| satisfies(value, operator, operand))
            }
            expected => equals(value, expected),
        }
    })
}

#[async_trait]
impl Driver for TestDriver {
    async fn connect(&self, _url: &str, _opts: &Options) -> Result<()> {
        self.record_call("connect", "", None);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record_call("disconnect", "", None);
        Ok(())
    }

    async fn index(&self, collection: &str, _opts: &Options, field_path: &str) -> Result<()> {
        self.state.lock().unwrap().calls.push(Call {
            op: "index",
            collection: collection.to_owned(),
            query: Value::from(field_path),
            limit: None,
        });
        Ok(())
    }

    fn count(&self, collection: &str, _opts: &Options, query: &Query) -> IntStream {
        self.record_call("count", collection, Some(query));
        let count = self.matching(collection, query).len() as u64;

        stream::iter([Ok(count)]).boxed()
    }

    fn find(&self, collection: &str, _opts: &Options, query: &Query) -> RecordStream {
        self.record_call("find", collection, Some(query));

        let indexes = self.matching(collection, query);
        let state = self.state.lock().unwrap();
        let records = indexes
            .into_iter()
            .map(|index| Ok(state.collections[collection][index].clone()))
            .collect::<Vec<_>>();

        stream::iter(records).boxed()
    }

    fn insert(&self, collection: &str, _opts: &Options, records: RecordStream) -> RecordStream {
        self.record_call("insert", collection, None);

        let state = self.state.clone();
        let collection = collection.to_owned();

        records
            .map_ok(move |mut record| {
                let mut state = state.lock().unwrap();

                if !record.contains_key("id") {
                    state.next_id += 1;
                    record.insert("id".into(), Value::from(state.next_id.to_string()));
                }

                state
                    .collections
                    .entry(collection.clone())
                    .or_default()
                    .push(record.clone());

                record
            })
            .boxed()
    }

    fn update(&self, collection: &str, _opts: &Options, query: &Query, delta: &Delta) -> IntStream {
        self.record_call("update", collection, Some(query));

        let indexes = self.matching(collection, query);
        let mut state = self.state.lock().unwrap();

        if let Some(records) = state.collections.get_mut(collection) {
            for index in &indexes {
                delta.apply(&mut records[*index]);
            }
        }

        stream::iter([Ok(indexes.len() as u64)]).boxed()
    }

    fn remove(&self, collection: &str, _opts: &Options, query: &Query) -> IntStream {
        self.record_call("remove", collection, Some(query));

        let indexes = self.matching(collection, query);
        let mut state = self.state.lock().unwrap();

        if let Some(records) = state.collections.get_mut(collection) {
            for index in indexes.iter().rev() {
                records.remove(*index);
            }
        }

        stream::iter([Ok(indexes.len() as u64)]).boxed()
    }
}

/// An orchestrator with a fresh test driver installed.
pub fn setup() -> (Merlin, TestDriver) {
    setup_with(Config::default())
}

pub fn setup_with(config: Config) -> (Merlin, TestDriver) {
    let merlin = Merlin::new(config).unwrap();
    let driver = TestDriver::new();
    merlin.set_driver(driver.clone()).unwrap();

    (merlin, driver)
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(record) => record,
        other => panic!("not a record: {other}"),
    }
}
