//! Dotted path access into records.

use crate::Record;
use serde_json::{Map, Value};

pub fn get<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

pub fn get_mut<'a>(record: &'a mut Record, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let mut current = record.get_mut(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Writes `value` at `path`, replacing any non-object on the way with an object.
pub fn set(record: &mut Record, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            record.insert(path.to_owned(), value);
        }
        Some((head, rest)) => {
            let child = record
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));

            if !child.is_object() {
                *child = Value::Object(Map::new());
            }

            if let Value::Object(map) = child {
                set(map, rest, value);
            }
        }
    }
}

pub fn remove(record: &mut Record, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => record.remove(path),
        Some((head, rest)) => match record.get_mut(head)? {
            Value::Object(map) => remove(map, rest),
            _ => None,
        },
    }
}

pub fn contains(record: &Record, path: &str) -> bool {
    get(record, path).is_some()
}

/// Recursively merges `overlay` into `base`; leaves in `overlay` win.
pub fn merge(base: &mut Record, overlay: &Record) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(target)), Value::Object(source)) => merge(target, source),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn reads_nested_values() {
        let record = record(json!({ "a": { "b": [1, { "c": true }] } }));

        assert_eq!(get(&record, "a.b.1.c"), Some(&json!(true)));
        assert_eq!(get(&record, "a.x"), None);
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut record = record(json!({ "a": 1 }));

        set(&mut record, "a.b.c", json!("x"));

        assert_eq!(Value::Object(record), json!({ "a": { "b": { "c": "x" } } }));
    }

    #[test]
    fn remove_returns_the_value() {
        let mut record = record(json!({ "a": { "b": 1, "c": 2 } }));

        assert_eq!(remove(&mut record, "a.b"), Some(json!(1)));
        assert_eq!(Value::Object(record), json!({ "a": { "c": 2 } }));
    }

    #[test]
    fn merge_keeps_untouched_branches() {
        let mut base = record(json!({ "a": { "b": 1 }, "c": 1 }));

        merge(&mut base, &record(json!({ "a": { "d": 2 }, "c": 3 })));

        assert_eq!(
            Value::Object(base),
            json!({ "a": { "b": 1, "d": 2 }, "c": 3 })
        );
    }
}
