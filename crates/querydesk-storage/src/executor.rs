//! Read-only statement execution.
//!
//! Runs a single already-authorized SELECT and converts the rows into
//! [`TableData`] with JSON cell values.

use rusqlite::types::ValueRef;
use serde_json::Value;
use tracing::debug;

use querydesk_core::error::QueryDeskError;
use querydesk_core::types::TableData;

use crate::db::Database;

impl Database {
    /// Execute a read-only statement, returning at most `max_rows` rows.
    ///
    /// Statements that would modify the database are refused before any
    /// row is stepped, whatever the caller's role.
    pub fn execute_read(&self, sql: &str, max_rows: usize) -> Result<TableData, QueryDeskError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| QueryDeskError::Execution(e.to_string()))?;

            if !stmt.readonly() {
                return Err(QueryDeskError::Execution(
                    "only read-only statements can be executed".to_string(),
                ));
            }

            let headers: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let width = headers.len();

            let mut rows = stmt
                .query([])
                .map_err(|e| QueryDeskError::Execution(e.to_string()))?;

            let mut out = Vec::new();
            while let Some(row) = rows
                .next()
                .map_err(|e| QueryDeskError::Execution(e.to_string()))?
            {
                if out.len() >= max_rows {
                    debug!(max_rows, "Row cap reached, truncating result");
                    break;
                }
                let mut cells = Vec::with_capacity(width);
                for i in 0..width {
                    let cell = row
                        .get_ref(i)
                        .map_err(|e| QueryDeskError::Execution(e.to_string()))?;
                    cells.push(to_json(cell));
                }
                out.push(cells);
            }

            Ok(TableData::new(headers, out))
        })
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}
