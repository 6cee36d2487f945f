//! Time-indexed tabular view over a sequence of records.
//!
//! The view is a pure projection: rows are indexed by their `time` field
//! (`date` when no row carries `time`), numeric price columns are coerced to
//! numbers and rows are ordered ascending by timestamp. Serialization uses
//! the split orientation `{columns, index, data}`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::json_kind;
use crate::{SchemaError, UtcDateTime};

const NUMERIC_COLUMNS: [&str; 5] = ["open", "close", "high", "low", "volume"];
const TIMESTAMP_KEYS: [&str; 2] = ["time", "date"];

/// Single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => number.as_f64().map_or(Self::Null, Self::Number),
            Value::String(text) => Self::Text(text.clone()),
            nested => Self::Text(nested.to_string()),
        }
    }

    fn numeric_from_json(value: &Value) -> Self {
        let parsed = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .filter(|number| number.is_finite())
            .map_or(Self::Null, Self::Number)
    }
}

/// Rows of cells indexed by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub index: Vec<UtcDateTime>,
    pub data: Vec<Vec<Cell>>,
}

impl Table {
    /// Builds the view from any sequence of serializable records.
    pub fn from_records<T: Serialize>(records: &[T]) -> Result<Self, SchemaError> {
        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                serde_json::to_value(record).map_err(|error| SchemaError::MalformedRecord {
                    record: "row",
                    index,
                    message: error.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_value(Value::Array(rows), "rows")
    }

    /// Builds the view from a list, a wrapper object holding the list under
    /// `list_field`, or a single row object.
    pub fn from_value(value: Value, list_field: &'static str) -> Result<Self, SchemaError> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove(list_field) {
                Some(Value::Array(items)) => items,
                Some(Value::Null) => Vec::new(),
                Some(other) => return Err(unexpected_shape(list_field, &other)),
                None => vec![Value::Object(map)],
            },
            other => return Err(unexpected_shape(list_field, &other)),
        };

        let rows = items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(unexpected_shape(list_field, &other)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_rows(&rows)
    }

    fn from_rows(rows: &[Map<String, Value>]) -> Result<Self, SchemaError> {
        if rows.is_empty() {
            return Ok(Self::default());
        }

        let timestamp_key = TIMESTAMP_KEYS
            .into_iter()
            .find(|key| rows.iter().all(|row| row.contains_key(*key)))
            .ok_or_else(|| {
                let index = rows
                    .iter()
                    .position(|row| !TIMESTAMP_KEYS.iter().any(|key| row.contains_key(*key)))
                    .unwrap_or(0);
                SchemaError::MissingTimestamp { index }
            })?;

        let columns: Vec<String> = rows
            .iter()
            .flat_map(|row| row.keys())
            .filter(|key| key.as_str() != timestamp_key)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut indexed = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let timestamp = parse_timestamp(index, &row[timestamp_key])?;
            let cells = columns
                .iter()
                .map(|column| {
                    let value = row.get(column).unwrap_or(&Value::Null);
                    if NUMERIC_COLUMNS.contains(&column.as_str()) {
                        Cell::numeric_from_json(value)
                    } else {
                        Cell::from_json(value)
                    }
                })
                .collect::<Vec<_>>();
            indexed.push((timestamp, cells));
        }

        indexed.sort_by_key(|(timestamp, _)| *timestamp);
        let (index, data) = indexed.into_iter().unzip();

        Ok(Self {
            columns,
            index,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Cells of a named column, top to bottom.
    ///
    /// `None` when the column is unknown or a row is too short to hold it.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let position = self.columns.iter().position(|column| column == name)?;
        self.data.iter().map(|row| row.get(position)).collect()
    }
}

fn parse_timestamp(index: usize, value: &Value) -> Result<UtcDateTime, SchemaError> {
    let unreadable = || SchemaError::UnreadableTimestamp {
        index,
        value: value.to_string(),
    };
    let text = value.as_str().ok_or_else(unreadable)?;
    UtcDateTime::parse_lenient(text).map_err(|_| unreadable())
}

fn unexpected_shape(field: &'static str, value: &Value) -> SchemaError {
    SchemaError::UnexpectedShape {
        record: "row",
        field,
        found: json_kind(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mixed_numeric_spellings_are_coerced() {
        let table = Table::from_value(
            json!([
                { "time": "2024-01-01", "open": 1, "close": "n/a", "volume": "1200" },
            ]),
            "prices",
        )
        .expect("table");

        let open = table.column("open").expect("open column");
        let close = table.column("close").expect("close column");
        let volume = table.column("volume").expect("volume column");
        assert_eq!(open[0], &Cell::Number(1.0));
        assert_eq!(close[0], &Cell::Null);
        assert_eq!(volume[0], &Cell::Number(1200.0));
    }

    #[test]
    fn non_numeric_columns_keep_their_text() {
        let table = Table::from_value(
            json!({ "time": "2024-01-01", "ticker": "AAPL", "close": 3 }),
            "prices",
        )
        .expect("single row");

        assert_eq!(table.columns, vec!["close", "ticker"]);
        assert_eq!(table.data[0][1], Cell::Text(String::from("AAPL")));
    }

    #[test]
    fn empty_input_yields_empty_table() {
        let table = Table::from_value(json!({ "prices": [] }), "prices").expect("empty");
        assert!(table.is_empty());
    }

    #[test]
    fn split_serialization_uses_columns_index_data() {
        let table = Table::from_value(json!([{ "date": "2024-01-01", "close": 1 }]), "prices")
            .expect("table");
        let encoded = serde_json::to_value(&table).expect("encode");

        assert_eq!(
            encoded,
            json!({
                "columns": ["close"],
                "index": ["2024-01-01T00:00:00Z"],
                "data": [[1.0]]
            })
        );
        let decoded: Table = serde_json::from_value(encoded).expect("decode");
        assert_eq!(decoded, table);
    }

    #[test]
    fn ragged_rows_have_no_column() {
        let table: Table = serde_json::from_value(json!({
            "columns": ["open", "close"],
            "index": ["2024-01-01T00:00:00Z", "2024-01-02T00:00:00Z"],
            "data": [[1.0, 2.0], [3.0]]
        }))
        .expect("decode");

        assert_eq!(table.column("open"), Some(vec![&Cell::Number(1.0), &Cell::Number(3.0)]));
        assert_eq!(table.column("close"), None);
        assert_eq!(table.column("volume"), None);
    }

    #[test]
    fn unreadable_timestamp_is_reported() {
        let err = Table::from_value(json!([{ "time": 17 }]), "prices").expect_err("must fail");
        assert!(matches!(err, SchemaError::UnreadableTimestamp { index: 0, .. }));
    }
}
