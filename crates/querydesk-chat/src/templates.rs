//! Deterministic SQL drafts for when no generator answers.
//!
//! Drafts are built from the full schema, not the caller's scope: a query
//! about a table the caller cannot see still produces SQL, and the gate
//! rejects it. The scope is only used to expand `*` into the permitted
//! columns of column-restricted tables.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::access::AccessScope;

// =============================================================================
// Patterns
// =============================================================================

static LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:top|first|last|limit|latest)\s+(\d{1,4})\b").expect("Invalid limit regex")
});

static PLACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:from|in|living\s+in|based\s+in|located\s+in)\s+([a-z][a-z .'-]*?)\s*(?:$|[?!,;]|\b(?:with|and|who|that|sorted|ordered|limit|please)\b)")
        .expect("Invalid place regex")
});

static GROUP_BY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:by|per|for\s+each|across)\s+(?:product\s+|user\s+|customer\s+)?([a-z_]+)")
        .expect("Invalid group regex")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z_]+").expect("Invalid word regex"));

const SUM_WORDS: &[&str] = &[
    "revenue", "sales", "spending", "spent", "spend", "amount", "total", "income", "earnings",
];
const AVG_WORDS: &[&str] = &["average", "avg", "mean"];
const COUNT_WORDS: &[&str] = &["count", "how many", "number of"];
const TOP_CUSTOMER_WORDS: &[&str] = &["top customers", "best customers", "top users", "biggest customers"];

/// Numeric columns worth summing, in preference order.
const SUM_MEASURES: &[&str] = &["total_amount", "revenue", "value"];

/// Numeric columns worth averaging or ranking by.
const RANK_MEASURES: &[&str] = &["total_amount", "revenue", "value", "price"];

/// Words that name a table without spelling it.
const TABLE_SYNONYMS: &[(&str, &str)] = &[
    ("customer", "users"),
    ("customers", "users"),
    ("people", "users"),
    ("person", "users"),
    ("purchase", "orders"),
    ("purchases", "orders"),
    ("item", "products"),
    ("items", "products"),
    ("metric", "analytics"),
    ("metrics", "analytics"),
];

// =============================================================================
// Builder
// =============================================================================

/// Builds fallback SQL against a schema map (table -> columns).
pub struct SqlTemplates<'a> {
    schema: &'a BTreeMap<String, Vec<String>>,
    scope: &'a AccessScope,
    default_limit: usize,
}

impl<'a> SqlTemplates<'a> {
    pub fn new(
        schema: &'a BTreeMap<String, Vec<String>>,
        scope: &'a AccessScope,
        default_limit: usize,
    ) -> Self {
        Self {
            schema,
            scope,
            default_limit,
        }
    }

    /// Single-table read: `SELECT cols FROM t [WHERE city = ..] [ORDER BY ..] LIMIT n`,
    /// or a `COUNT(*)` when the query asks how many.
    pub fn simple(&self, query: &str) -> Option<String> {
        let lower = query.to_lowercase();
        let table = self.mentioned_tables(&lower).into_iter().next()?;
        let columns = self.columns(&table);

        let mut sql = if contains_any(&lower, COUNT_WORDS) {
            format!("SELECT COUNT(*) AS count FROM {}", table)
        } else {
            format!("SELECT {} FROM {}", self.projection(&table, None), table)
        };

        if columns.iter().any(|c| c == "city") {
            if let Some(city) = self.place(query) {
                sql.push_str(&format!(" WHERE city = '{}'", city.replace('\'', "''")));
            }
        }

        if contains_any(&lower, COUNT_WORDS) {
            return Some(sql);
        }

        if LIMIT_RE.is_match(&lower) || lower.contains("most expensive") || lower.contains("highest") {
            if let Some(measure) = measure_of(columns, RANK_MEASURES) {
                sql.push_str(&format!(" ORDER BY {} DESC", measure));
            }
        }
        sql.push_str(&format!(" LIMIT {}", self.limit(&lower)));
        Some(sql)
    }

    /// Joins and aggregations. Falls back to [`SqlTemplates::simple`] when
    /// no multi-table or grouping pattern applies.
    pub fn complex(&self, query: &str) -> Option<String> {
        let lower = query.to_lowercase();

        if contains_any(&lower, TOP_CUSTOMER_WORDS) {
            return Some(self.top_customers(&lower));
        }
        if let Some(sql) = self.grouped(&lower) {
            return Some(sql);
        }
        if let Some(sql) = self.joined(&lower) {
            return Some(sql);
        }
        self.simple(query)
    }

    fn top_customers(&self, lower: &str) -> String {
        format!(
            "SELECT u.name, SUM(o.total_amount) AS total_spent FROM users u \
             JOIN orders o ON o.user_id = u.id GROUP BY u.id, u.name \
             ORDER BY total_spent DESC LIMIT {}",
            self.limit_or(lower, 5)
        )
    }

    /// `<metric> by <column>`.
    fn grouped(&self, lower: &str) -> Option<String> {
        let mentioned = self.mentioned_tables(lower);
        let column = GROUP_BY_RE
            .captures_iter(lower)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .find_map(|word| self.resolve_column(&word, &mentioned))?;
        let (group_table, group_col) = column;

        let wants_sum = contains_any(lower, SUM_WORDS);
        let wants_avg = contains_any(lower, AVG_WORDS);

        // Measure on the grouped table itself.
        if wants_sum || wants_avg {
            let measures = if wants_avg { RANK_MEASURES } else { SUM_MEASURES };
            if let Some(measure) = measure_of(self.columns(&group_table), measures) {
                let (func, alias) = aggregate(lower, wants_avg, measure);
                return Some(format!(
                    "SELECT {col}, {func}({m}) AS {alias} FROM {t} GROUP BY {col} ORDER BY {alias} DESC LIMIT {n}",
                    col = group_col,
                    func = func,
                    m = measure,
                    alias = alias,
                    t = group_table,
                    n = self.limit(lower),
                ));
            }

            // Measure on a table that references the grouped one.
            if let Some((fact, fk, measure)) = self.fact_table_for(&group_table) {
                let (ga, fa) = aliases(&group_table, &fact);
                let (func, alias) = aggregate(lower, wants_avg, measure);
                return Some(format!(
                    "SELECT {ga}.{col}, {func}({fa}.{m}) AS {alias} FROM {gt} {ga} \
                     JOIN {ft} {fa} ON {fa}.{fk} = {ga}.id GROUP BY {ga}.{col} \
                     ORDER BY {alias} DESC LIMIT {n}",
                    ga = ga,
                    fa = fa,
                    col = group_col,
                    func = func,
                    m = measure,
                    alias = alias,
                    gt = group_table,
                    ft = fact,
                    fk = fk,
                    n = self.limit(lower),
                ));
            }
        }

        Some(format!(
            "SELECT {col}, COUNT(*) AS count FROM {t} GROUP BY {col} ORDER BY count DESC LIMIT {n}",
            col = group_col,
            t = group_table,
            n = self.limit(lower),
        ))
    }

    /// `<a> with <b>`: join two mentioned tables over a `<table>_id` key.
    fn joined(&self, lower: &str) -> Option<String> {
        let mentioned = self.mentioned_tables(lower);
        if mentioned.len() < 2 {
            return None;
        }
        let (left, right) = (&mentioned[0], &mentioned[1]);
        let (la, ra) = aliases(left, right);

        let on = if let Some(fk) = self.foreign_key(left, right) {
            format!("{}.{} = {}.id", la, fk, ra)
        } else if let Some(fk) = self.foreign_key(right, left) {
            format!("{}.{} = {}.id", ra, fk, la)
        } else {
            return None;
        };

        let right_singular = singular(right);
        let mut cols = vec![self.projection(left, Some(&la))];
        let right_cols: Vec<String> = self
            .visible(right)
            .into_iter()
            .filter(|c| c != "id" && !c.ends_with("_id"))
            .map(|c| format!("{}.{} AS {}_{}", ra, c, right_singular, c))
            .collect();
        if right_cols.is_empty() {
            return None;
        }
        cols.extend(right_cols);

        Some(format!(
            "SELECT {} FROM {} {} JOIN {} {} ON {} LIMIT {}",
            cols.join(", "),
            left,
            la,
            right,
            ra,
            on,
            self.limit(lower)
        ))
    }

    // ---- helpers ----

    fn columns(&self, table: &str) -> &[String] {
        self.schema.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn visible(&self, table: &str) -> Vec<String> {
        match self.scope.grant(table) {
            Some(_) => self.scope.visible_columns(table, self.columns(table)),
            None => self.columns(table).to_vec(),
        }
    }

    /// `*` (or `a.*`) when every column is visible, else the explicit list.
    fn projection(&self, table: &str, alias: Option<&str>) -> String {
        let restricted = self.scope.grant(table).is_some_and(|g| !g.is_all());
        let prefix = alias.map(|a| format!("{}.", a)).unwrap_or_default();
        if restricted {
            self.visible(table)
                .iter()
                .map(|c| format!("{}{}", prefix, c))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            format!("{}*", prefix)
        }
    }

    /// Schema tables the query names, in order of first mention.
    fn mentioned_tables(&self, lower: &str) -> Vec<String> {
        let mut found = Vec::new();
        for word in WORD_RE.find_iter(lower).map(|m| m.as_str()) {
            let table = self
                .schema
                .keys()
                .find(|t| t.as_str() == word || singular(t) == word)
                .cloned()
                .or_else(|| {
                    TABLE_SYNONYMS
                        .iter()
                        .find(|(syn, _)| *syn == word)
                        .map(|(_, t)| t.to_string())
                        .filter(|t| self.schema.contains_key(t))
                });
            if let Some(t) = table {
                if !found.contains(&t) {
                    found.push(t);
                }
            }
        }
        found
    }

    /// Map a grouping word to (table, column), preferring mentioned tables.
    fn resolve_column(&self, word: &str, mentioned: &[String]) -> Option<(String, String)> {
        let candidates = [word.to_string(), singular(word)];
        let owns = |table: &str| {
            self.columns(table)
                .iter()
                .find(|c| candidates.iter().any(|w| w == *c))
                .cloned()
        };
        for table in mentioned {
            if let Some(col) = owns(table) {
                return Some((table.clone(), col));
            }
        }
        // "by product" / "by user": group on the named table's `name`.
        if let Some(table) = self
            .schema
            .keys()
            .find(|t| candidates.iter().any(|w| *w == **t || *w == singular(t)))
        {
            if self.columns(table).iter().any(|c| c == "name") {
                return Some((table.clone(), "name".to_string()));
            }
        }
        self.schema
            .keys()
            .find_map(|t| owns(t).map(|c| (t.clone(), c)))
    }

    /// A table holding `<singular(table)>_id` and a measure column.
    fn fact_table_for(&self, table: &str) -> Option<(String, String, &'static str)> {
        let fk = format!("{}_id", singular(table));
        let ordered = std::iter::once("orders".to_string())
            .chain(self.schema.keys().filter(|t| t.as_str() != "orders").cloned());
        for fact in ordered {
            let cols = self.columns(&fact);
            if fact != table && cols.contains(&fk) {
                if let Some(measure) = measure_of(cols, SUM_MEASURES) {
                    return Some((fact, fk, measure));
                }
            }
        }
        None
    }

    /// Column of `from` referencing `to`, if any.
    fn foreign_key(&self, from: &str, to: &str) -> Option<String> {
        let fk = format!("{}_id", singular(to));
        self.columns(from).iter().find(|c| **c == fk).cloned()
    }

    fn place(&self, query: &str) -> Option<String> {
        let caps = PLACE_RE.captures(query)?;
        let raw = caps.get(1)?.as_str().trim().trim_end_matches('.');
        let lower = raw.to_lowercase();
        if raw.is_empty() || !self.mentioned_tables(&lower).is_empty() {
            return None;
        }
        Some(title_case(raw))
    }

    fn limit(&self, lower: &str) -> usize {
        self.limit_or(lower, self.default_limit)
    }

    fn limit_or(&self, lower: &str, default: usize) -> usize {
        LIMIT_RE
            .captures(lower)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(default)
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| {
        if n.contains(' ') {
            text.contains(n)
        } else {
            WORD_RE.find_iter(text).any(|m| m.as_str() == *n)
        }
    })
}

fn measure_of(columns: &[String], preference: &[&'static str]) -> Option<&'static str> {
    preference
        .iter()
        .copied()
        .find(|m| columns.iter().any(|c| c == m))
}

/// Aggregate function and output alias for `measure`.
fn aggregate(lower: &str, avg: bool, measure: &str) -> (&'static str, String) {
    if avg {
        ("AVG", format!("avg_{}", measure))
    } else if contains_any(lower, &["sales"]) {
        ("SUM", "total_sales".to_string())
    } else if measure == "total_amount" || measure == "revenue" {
        ("SUM", "total_revenue".to_string())
    } else {
        ("SUM", format!("total_{}", measure))
    }
}

/// Short distinct aliases for two tables.
fn aliases(a: &str, b: &str) -> (String, String) {
    let first = |s: &str, n: usize| s.chars().take(n).collect::<String>();
    if first(a, 1) != first(b, 1) {
        (first(a, 1), first(b, 1))
    } else {
        (first(a, 2), format!("{}2", first(b, 2)))
    }
}

pub(crate) fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = word.strip_suffix('s') {
        stem.to_string()
    } else {
        word.to_string()
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessPolicy;
    use querydesk_core::types::Role;

    fn schema() -> BTreeMap<String, Vec<String>> {
        let cols = |c: &[&str]| c.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut s = BTreeMap::new();
        s.insert(
            "users".to_string(),
            cols(&["id", "name", "email", "age", "city", "created_at"]),
        );
        s.insert(
            "orders".to_string(),
            cols(&["id", "user_id", "product_id", "quantity", "total_amount", "order_date", "status"]),
        );
        s.insert(
            "products".to_string(),
            cols(&["id", "name", "price", "category", "stock_quantity"]),
        );
        s.insert("categories".to_string(), cols(&["id", "name", "description"]));
        s.insert(
            "sales".to_string(),
            cols(&["id", "product_id", "region", "quarter", "revenue"]),
        );
        s
    }

    fn simple(role: Role, q: &str) -> Option<String> {
        let schema = schema();
        let scope = AccessPolicy.scope_for(role);
        SqlTemplates::new(&schema, &scope, 10).simple(q)
    }

    fn complex(role: Role, q: &str) -> Option<String> {
        let schema = schema();
        let scope = AccessPolicy.scope_for(role);
        SqlTemplates::new(&schema, &scope, 10).complex(q)
    }

    // ---- Simple ----

    #[test]
    fn test_show_all_users() {
        assert_eq!(
            simple(Role::Analyst, "Show me all users").unwrap(),
            "SELECT * FROM users LIMIT 10"
        );
    }

    #[test]
    fn test_viewer_projection_is_expanded() {
        assert_eq!(
            simple(Role::Viewer, "list users").unwrap(),
            "SELECT id, name, email FROM users LIMIT 10"
        );
    }

    #[test]
    fn test_users_from_city() {
        assert_eq!(
            simple(Role::Readonly, "show users from new york").unwrap(),
            "SELECT * FROM users WHERE city = 'New York' LIMIT 10"
        );
    }

    #[test]
    fn test_city_with_trailing_clause() {
        assert_eq!(
            simple(Role::Readonly, "customers in Chicago please").unwrap(),
            "SELECT * FROM users WHERE city = 'Chicago' LIMIT 10"
        );
    }

    #[test]
    fn test_from_table_is_not_a_city() {
        assert_eq!(
            simple(Role::Readonly, "get data from users").unwrap(),
            "SELECT * FROM users LIMIT 10"
        );
    }

    #[test]
    fn test_top_n_orders_by_measure() {
        assert_eq!(
            simple(Role::Readonly, "top 3 products").unwrap(),
            "SELECT * FROM products ORDER BY price DESC LIMIT 3"
        );
    }

    #[test]
    fn test_count_query() {
        assert_eq!(
            simple(Role::Readonly, "how many orders are there").unwrap(),
            "SELECT COUNT(*) AS count FROM orders"
        );
    }

    #[test]
    fn test_synonym_maps_to_table() {
        assert_eq!(
            simple(Role::Readonly, "list customers").unwrap(),
            "SELECT * FROM users LIMIT 10"
        );
    }

    #[test]
    fn test_out_of_scope_table_still_drafted() {
        assert_eq!(
            simple(Role::Viewer, "show me all products").unwrap(),
            "SELECT * FROM products LIMIT 10"
        );
    }

    #[test]
    fn test_no_table_no_draft() {
        assert!(simple(Role::Admin, "what is the weather").is_none());
    }

    #[test]
    fn test_literal_quotes_escaped() {
        let sql = simple(Role::Readonly, "users in o'fallon").unwrap();
        assert!(sql.contains("'O''fallon'"), "{}", sql);
    }

    // ---- Complex ----

    #[test]
    fn test_users_by_city_counts() {
        assert_eq!(
            complex(Role::Analyst, "Create a bar chart of users by city").unwrap(),
            "SELECT city, COUNT(*) AS count FROM users GROUP BY city ORDER BY count DESC LIMIT 10"
        );
    }

    #[test]
    fn test_revenue_by_city_joins_orders() {
        assert_eq!(
            complex(Role::Analyst, "total revenue by city").unwrap(),
            "SELECT u.city, SUM(o.total_amount) AS total_revenue FROM users u \
             JOIN orders o ON o.user_id = u.id GROUP BY u.city \
             ORDER BY total_revenue DESC LIMIT 10"
        );
    }

    #[test]
    fn test_sales_by_product_category() {
        let sql = complex(Role::Analyst, "sales by product category").unwrap();
        assert!(
            sql.starts_with("SELECT p.category, SUM(o.total_amount) AS total_sales"),
            "{}",
            sql
        );
        assert!(sql.contains("JOIN orders o ON o.product_id = p.id"));
    }

    #[test]
    fn test_revenue_by_region_uses_sales_measure() {
        assert_eq!(
            complex(Role::Analyst, "revenue by region").unwrap(),
            "SELECT region, SUM(revenue) AS total_revenue FROM sales GROUP BY region ORDER BY total_revenue DESC LIMIT 10"
        );
    }

    #[test]
    fn test_average_order_value_by_status() {
        assert_eq!(
            complex(Role::Analyst, "average order amount by status").unwrap(),
            "SELECT status, AVG(total_amount) AS avg_total_amount FROM orders GROUP BY status ORDER BY avg_total_amount DESC LIMIT 10"
        );
    }

    #[test]
    fn test_orders_with_users_join() {
        let sql = complex(Role::Analyst, "show orders with user names").unwrap();
        assert!(sql.starts_with("SELECT o.*, u.name AS user_name"), "{}", sql);
        assert!(sql.contains("FROM orders o JOIN users u ON o.user_id = u.id"));
    }

    #[test]
    fn test_top_customers() {
        let sql = complex(Role::Analyst, "who are our top customers").unwrap();
        assert!(sql.contains("SUM(o.total_amount) AS total_spent"));
        assert!(sql.ends_with("LIMIT 5"));
    }

    #[test]
    fn test_complex_falls_back_to_simple() {
        assert_eq!(
            complex(Role::Analyst, "list products").unwrap(),
            "SELECT * FROM products LIMIT 10"
        );
    }

    // ---- Helpers ----

    #[test]
    fn test_singular() {
        assert_eq!(singular("users"), "user");
        assert_eq!(singular("categories"), "category");
        assert_eq!(singular("analytics"), "analytic");
        assert_eq!(singular("city"), "city");
    }

    #[test]
    fn test_aliases_distinct() {
        assert_eq!(aliases("users", "orders"), ("u".to_string(), "o".to_string()));
        assert_eq!(aliases("sales", "sessions"), ("sa".to_string(), "se2".to_string()));
    }
}
