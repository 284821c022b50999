use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryDeskError;

// =============================================================================
// Enums
// =============================================================================

/// Caller identity used for access control. Supplied per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Analyst,
    Readonly,
    Viewer,
}

impl Role {
    /// Every role, in display order.
    pub const ALL: [Role; 4] = [Role::Viewer, Role::Readonly, Role::Analyst, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Analyst => "analyst",
            Role::Readonly => "readonly",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = QueryDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "analyst" => Ok(Role::Analyst),
            "readonly" => Ok(Role::Readonly),
            "viewer" => Ok(Role::Viewer),
            other => Err(QueryDeskError::UnknownRole(other.to_string())),
        }
    }
}

/// Data-access operation a role may be granted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    Visualize,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Visualize => "visualize",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Tabular data
// =============================================================================

/// Rows returned by a read, with their column headers.
///
/// `row_count` always equals `rows.len()` when built through [`TableData::new`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

impl TableData {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        let row_count = rows.len();
        Self {
            headers,
            rows,
            row_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when every row has one cell per header and the count matches.
    pub fn is_well_formed(&self) -> bool {
        self.row_count == self.rows.len()
            && self.rows.iter().all(|r| r.len() == self.headers.len())
    }
}
