//! Schema discovery over `sqlite_master` and `PRAGMA table_info`.

use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use querydesk_core::error::QueryDeskError;

use crate::db::Database;

/// A column as reported by `PRAGMA table_info`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub primary_key: bool,
}

/// A user table and its columns in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl Database {
    /// Names of all user tables, sorted. Internal `sqlite_*` tables and the
    /// migrations table are excluded.
    pub fn table_names(&self) -> Result<Vec<String>, QueryDeskError> {
        self.with_conn(list_tables)
    }

    /// Column details for one table, or `None` when the table does not exist.
    pub fn table_info(&self, table: &str) -> Result<Option<TableInfo>, QueryDeskError> {
        self.with_conn(|conn| {
            if !list_tables(conn)?.iter().any(|t| t == table) {
                return Ok(None);
            }
            let columns = columns_of(conn, table)?;
            Ok(Some(TableInfo {
                name: table.to_string(),
                columns,
            }))
        })
    }

    /// Map of table name to column names for every user table.
    pub fn describe_schema(&self) -> Result<BTreeMap<String, Vec<String>>, QueryDeskError> {
        self.with_conn(|conn| {
            let mut schema = BTreeMap::new();
            for table in list_tables(conn)? {
                let columns = columns_of(conn, &table)?
                    .into_iter()
                    .map(|c| c.name)
                    .collect();
                schema.insert(table, columns);
            }
            Ok(schema)
        })
    }
}

fn list_tables(conn: &Connection) -> Result<Vec<String>, QueryDeskError> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table'
               AND name NOT LIKE 'sqlite_%'
               AND name != 'schema_migrations'
             ORDER BY name",
        )
        .map_err(|e| QueryDeskError::Schema(format!("Table list prepare: {}", e)))?;

    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| QueryDeskError::Schema(format!("Table list query: {}", e)))?;

    let mut tables = Vec::new();
    for row in rows {
        tables.push(row.map_err(|e| QueryDeskError::Schema(e.to_string()))?);
    }
    Ok(tables)
}

fn columns_of(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, QueryDeskError> {
    // Table names come from sqlite_master, so quoting is enough here.
    let sql = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| QueryDeskError::Schema(format!("Column list prepare: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                data_type: row.get(2)?,
                primary_key: row.get::<_, i64>(5)? > 0,
            })
        })
        .map_err(|e| QueryDeskError::Schema(format!("Column list query: {}", e)))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|e| QueryDeskError::Schema(e.to_string()))?);
    }
    Ok(columns)
}
