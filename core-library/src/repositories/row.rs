//! Helpers for extracting typed values from a `QueryRow`.

use crate::error::{LibraryError, Result};
use bridge_traits::database::{QueryRow, QueryValue};
use bridge_traits::error::BridgeError;

pub(crate) fn get_string(row: &QueryRow, col: &str) -> Result<String> {
    row.get(col)
        .and_then(|v| match v {
            QueryValue::Text(s) => Some(s.clone()),
            _ => None,
        })
        .ok_or_else(|| missing_column(col))
}

pub(crate) fn get_optional_string(row: &QueryRow, col: &str) -> Option<String> {
    row.get(col).and_then(|v| match v {
        QueryValue::Text(s) => Some(s.clone()),
        _ => None,
    })
}

pub(crate) fn get_i64(row: &QueryRow, col: &str) -> Result<i64> {
    row.get(col)
        .and_then(QueryValue::as_i64)
        .ok_or_else(|| missing_column(col))
}

pub(crate) fn get_optional_i64(row: &QueryRow, col: &str) -> Option<i64> {
    row.get(col).and_then(QueryValue::as_i64)
}

fn missing_column(col: &str) -> LibraryError {
    LibraryError::Bridge(BridgeError::Database(format!(
        "Missing or invalid column: {}",
        col
    )))
}
