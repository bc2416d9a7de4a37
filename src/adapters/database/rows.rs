//! Binding values and decoding `AnyRow`s.

use std::collections::BTreeMap;

use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Column, Row};

use crate::domain::{ColumnType, Record, Value};

pub(crate) type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// Bind every value in order
pub(crate) fn bind_all<'q>(mut query: AnyQuery<'q>, params: &[Value]) -> AnyQuery<'q> {
    for param in params {
        query = match param {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

/// Decode a row into a record, using the typecast map where the column is known.
pub(crate) fn decode_row(
    row: &AnyRow,
    typecast: &BTreeMap<String, ColumnType>,
) -> Result<Record, sqlx::Error> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let value = match typecast.get(name) {
            Some(ColumnType::Primary | ColumnType::Integer) => decode_int(row, index)?,
            Some(ColumnType::Float) => decode_float(row, index)?,
            Some(ColumnType::Boolean) => decode_bool(row, index)?,
            Some(ColumnType::String | ColumnType::Text) => {
                row.try_get::<Option<String>, _>(index)?.into()
            }
            None => decode_untyped(row, index),
        };
        record.insert(name.to_string(), value);
    }
    Ok(record)
}

fn decode_int(row: &AnyRow, index: usize) -> Result<Value, sqlx::Error> {
    match row.try_get::<Option<i64>, _>(index) {
        Ok(v) => Ok(v.into()),
        Err(_) => row
            .try_get::<Option<i32>, _>(index)
            .map(|v| v.map(i64::from).into()),
    }
}

fn decode_float(row: &AnyRow, index: usize) -> Result<Value, sqlx::Error> {
    match row.try_get::<Option<f64>, _>(index) {
        Ok(v) => Ok(v.into()),
        // SQLite hands back whole floats as integers
        Err(_) => decode_int(row, index).map(|v| match v {
            Value::Int(i) => Value::Float(i as f64),
            other => other,
        }),
    }
}

fn decode_bool(row: &AnyRow, index: usize) -> Result<Value, sqlx::Error> {
    match row.try_get::<Option<bool>, _>(index) {
        Ok(v) => Ok(v.into()),
        Err(_) => decode_int(row, index).map(|v| match v {
            Value::Int(i) => Value::Bool(i != 0),
            other => other,
        }),
    }
}

fn decode_untyped(row: &AnyRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.into();
    }
    Value::Null
}

/// Single integer out of the first column, e.g. `COUNT(*)`
pub(crate) fn scalar_i64(row: &AnyRow) -> Result<i64, sqlx::Error> {
    match row.try_get::<i64, _>(0) {
        Ok(v) => Ok(v),
        Err(_) => row.try_get::<i32, _>(0).map(i64::from),
    }
}
