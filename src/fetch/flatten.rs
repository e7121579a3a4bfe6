//! Flattening of JSON report documents into flat rows
//!
//! Nested objects become dotted-path columns (`{"a": {"b": 1}}` → `a.b = 1`).
//! Arrays and scalars are leaf values.

use serde_json::{Map, Value};

/// One flattened row: column name to JSON value
pub type FlatRow = Map<String, Value>;

/// Flatten a decoded response body into rows
///
/// Accepted shapes:
/// - an array of objects (one row per element)
/// - an object wrapping such an array under `data`
/// - a single object (one row)
/// - `null` (no rows)
///
/// Anything else is rejected with a description of what was found.
pub fn flatten_response(body: Value) -> Result<Vec<FlatRow>, String> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => flatten_items(items),
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(items)) => flatten_items(items),
            Some(other) => {
                object.insert("data".to_string(), other);
                Ok(vec![flatten_object(object)])
            }
            None => Ok(vec![flatten_object(object)]),
        },
        other => Err(format!("expected an array or object, found {}", kind(&other))),
    }
}

fn flatten_items(items: Vec<Value>) -> Result<Vec<FlatRow>, String> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(object) => Ok(flatten_object(object)),
            other => Err(format!("element {index} is {}, not an object", kind(&other))),
        })
        .collect()
}

/// Flatten one object into dotted-path columns
pub fn flatten_object(object: Map<String, Value>) -> FlatRow {
    let mut row = FlatRow::new();
    flatten_into(&mut row, None, object);
    row
}

fn flatten_into(row: &mut FlatRow, prefix: Option<&str>, object: Map<String, Value>) {
    for (key, value) in object {
        let column = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key,
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => {
                flatten_into(row, Some(&column), nested);
            }
            leaf => {
                row.insert(column, leaf);
            }
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
