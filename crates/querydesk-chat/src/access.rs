//! Role-based access policy.
//!
//! Every role maps to a flat, fully enumerated scope: the tables it may
//! touch, the columns of each table, and the operations it holds. Scopes
//! are built fresh per request and never mutated.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use querydesk_core::types::{Operation, Role};

/// Columns a role may see in one table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnGrant {
    All,
    Only(BTreeSet<String>),
}

impl ColumnGrant {
    pub fn permits(&self, column: &str) -> bool {
        match self {
            ColumnGrant::All => true,
            ColumnGrant::Only(cols) => cols.iter().any(|c| c.eq_ignore_ascii_case(column)),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ColumnGrant::All)
    }
}

/// Granted scope for one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    pub role: Role,
    pub tables: BTreeMap<String, ColumnGrant>,
    pub operations: BTreeSet<Operation>,
}

impl AccessScope {
    pub fn allows(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    pub fn grant(&self, table: &str) -> Option<&ColumnGrant> {
        self.tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, grant)| grant)
    }

    pub fn allows_table(&self, table: &str) -> bool {
        self.grant(table).is_some()
    }

    pub fn allows_column(&self, table: &str, column: &str) -> bool {
        self.grant(table).is_some_and(|g| g.permits(column))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Filter `columns` (in their schema order) down to the permitted ones.
    pub fn visible_columns(&self, table: &str, columns: &[String]) -> Vec<String> {
        match self.grant(table) {
            Some(grant) => columns.iter().filter(|c| grant.permits(c)).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Restrict a full schema map to what this scope may see.
    pub fn restrict_schema(
        &self,
        schema: &BTreeMap<String, Vec<String>>,
    ) -> BTreeMap<String, Vec<String>> {
        schema
            .iter()
            .filter(|(table, _)| self.allows_table(table))
            .map(|(table, cols)| (table.clone(), self.visible_columns(table, cols)))
            .collect()
    }
}

/// One row of the role table, as exposed on the administrative surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDescription {
    pub role: Role,
    pub operations: Vec<Operation>,
    pub tables: BTreeMap<String, ColumnGrant>,
}

/// Static role table.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessPolicy;

const BASE_TABLES: [&str; 4] = ["users", "orders", "products", "categories"];
const ANALYST_TABLES: [&str; 6] = ["users", "orders", "products", "categories", "sales", "analytics"];
const ADMIN_TABLES: [&str; 6] = ["users", "orders", "products", "categories", "sales", "analytics"];

impl AccessPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Build the scope granted to `role`.
    pub fn scope_for(&self, role: Role) -> AccessScope {
        let (tables, operations): (BTreeMap<String, ColumnGrant>, &[Operation]) = match role {
            Role::Viewer => (
                [
                    ("users", only(&["id", "name", "email"])),
                    ("orders", only(&["id", "total_amount", "order_date"])),
                ]
                .into_iter()
                .map(|(t, g)| (t.to_string(), g))
                .collect(),
                &[Operation::Read],
            ),
            Role::Readonly => (all_columns(&BASE_TABLES), &[Operation::Read]),
            Role::Analyst => (
                all_columns(&ANALYST_TABLES),
                &[Operation::Read, Operation::Visualize],
            ),
            Role::Admin => (
                all_columns(&ADMIN_TABLES),
                &[Operation::Read, Operation::Write, Operation::Visualize],
            ),
        };

        AccessScope {
            role,
            tables,
            operations: operations.iter().copied().collect(),
        }
    }

    /// Whether `role` may perform `operation` on `table` (and `column`, when
    /// given). Never fails; anything outside the scope is simply `false`.
    pub fn check(
        &self,
        role: Role,
        table: &str,
        column: Option<&str>,
        operation: Operation,
    ) -> bool {
        let scope = self.scope_for(role);
        if !scope.allows(operation) {
            return false;
        }
        match column {
            Some(col) => scope.allows_column(table, col),
            None => scope.allows_table(table),
        }
    }

    /// The full role table.
    pub fn roles(&self) -> Vec<RoleDescription> {
        Role::ALL
            .iter()
            .map(|&role| {
                let scope = self.scope_for(role);
                RoleDescription {
                    role,
                    operations: scope.operations.iter().copied().collect(),
                    tables: scope.tables,
                }
            })
            .collect()
    }
}

fn only(columns: &[&str]) -> ColumnGrant {
    ColumnGrant::Only(columns.iter().map(|c| c.to_string()).collect())
}

fn all_columns(tables: &[&str]) -> BTreeMap<String, ColumnGrant> {
    tables
        .iter()
        .map(|t| (t.to_string(), ColumnGrant::All))
        .collect()
}
