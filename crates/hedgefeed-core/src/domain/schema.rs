//! One parser for every canonical record type.
//!
//! Accepted input shapes are a list of records, a wrapper object holding the
//! list under the record's [`Record::LIST_FIELD`], or a single record object.
//! Anything else is rejected.

use serde_json::Value;

use crate::domain::models::Record;
use crate::SchemaError;

pub fn parse_records<T: Record>(value: Value) -> Result<Vec<T>, SchemaError> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| parse_one(index, item))
            .collect(),
        Value::Object(mut map) => match map.remove(T::LIST_FIELD) {
            Some(Value::Array(items)) => parse_records(Value::Array(items)),
            Some(Value::Null) => Ok(Vec::new()),
            Some(other) => Err(unexpected::<T>(&other)),
            None => parse_one(0, Value::Object(map)).map(|record| vec![record]),
        },
        other => Err(unexpected::<T>(&other)),
    }
}

/// Parses a raw response body.
pub fn parse_records_str<T: Record>(body: &str) -> Result<Vec<T>, SchemaError> {
    let value = serde_json::from_str::<Value>(body).map_err(|error| SchemaError::InvalidJson {
        message: error.to_string(),
    })?;
    parse_records(value)
}

fn parse_one<T: Record>(index: usize, item: Value) -> Result<T, SchemaError> {
    let record = serde_json::from_value::<T>(item).map_err(|error| SchemaError::MalformedRecord {
        record: T::NAME,
        index,
        message: error.to_string(),
    })?;

    record
        .validate()
        .map_err(|source| SchemaError::InvalidRecord {
            record: T::NAME,
            index,
            source,
        })?;

    Ok(record)
}

fn unexpected<T: Record>(value: &Value) -> SchemaError {
    SchemaError::UnexpectedShape {
        record: T::NAME,
        field: T::LIST_FIELD,
        found: json_kind(value),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CompanyNews, Price};
    use serde_json::json;

    fn price(date: &str, close: f64) -> Value {
        json!({
            "ticker": "AAPL",
            "time": date,
            "open": close,
            "high": close,
            "low": close,
            "close": close,
            "volume": 100
        })
    }

    #[test]
    fn accepts_list_wrapper_and_single_object() {
        let list = parse_records::<Price>(json!([price("2024-01-01", 1.0), price("2024-01-02", 2.0)]))
            .expect("list shape");
        assert_eq!(list.len(), 2);

        let wrapped = parse_records::<Price>(json!({ "prices": [price("2024-01-01", 1.0)] }))
            .expect("wrapper shape");
        assert_eq!(wrapped.len(), 1);

        let single = parse_records::<Price>(price("2024-01-03", 3.0)).expect("single shape");
        assert_eq!(single[0].close, 3.0);
    }

    #[test]
    fn empty_and_null_lists_are_not_errors() {
        assert!(parse_records::<Price>(json!({ "prices": [] })).expect("empty").is_empty());
        assert!(parse_records::<Price>(json!({ "prices": null })).expect("null").is_empty());
    }

    #[test]
    fn rejects_scalars_and_wrong_list_field_types() {
        let err = parse_records::<Price>(json!(42)).expect_err("scalar");
        assert!(matches!(err, SchemaError::UnexpectedShape { found: "number", .. }));

        let err = parse_records::<Price>(json!({ "prices": "nope" })).expect_err("string field");
        assert!(matches!(err, SchemaError::UnexpectedShape { found: "string", .. }));
    }

    #[test]
    fn reports_position_of_malformed_record() {
        let err = parse_records::<CompanyNews>(json!({
            "news": [
                { "ticker": "AAPL", "title": "ok", "source": "wire", "date": "2024-01-01" },
                { "ticker": "AAPL", "source": "wire", "date": "2024-01-01" }
            ]
        }))
        .expect_err("second record lacks a title");
        assert!(matches!(err, SchemaError::MalformedRecord { index: 1, .. }));
    }

    #[test]
    fn rejects_records_that_fail_validation() {
        let err = parse_records::<Price>(json!([price("2024-01-01", -1.0)])).expect_err("negative");
        assert!(matches!(err, SchemaError::InvalidRecord { index: 0, .. }));
    }

    #[test]
    fn invalid_json_body_is_a_schema_error() {
        let err = parse_records_str::<Price>("<html>").expect_err("not json");
        assert!(matches!(err, SchemaError::InvalidJson { .. }));
    }
}
