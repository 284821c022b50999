//! SQL gate: inspects an opaque SQL payload and authorizes it against a scope.
//!
//! This is not a parser. A small tokenizer pulls out what the gate needs:
//! the statement kind, the tables named after FROM/JOIN with their aliases,
//! qualified column references, bare identifiers, output aliases, and
//! wildcard usage. String literals and comments are discarded first so
//! their contents never look like identifiers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use querydesk_core::types::Operation;

use crate::access::AccessScope;
use crate::error::ChatError;

/// Keywords that mark a statement as modifying data or schema.
const MUTATING_KEYWORDS: &[&str] = &[
    "ALTER", "ATTACH", "CREATE", "DELETE", "DETACH", "DROP", "INSERT", "PRAGMA", "REINDEX",
    "REPLACE", "TRUNCATE", "UPDATE", "VACUUM",
];

/// Words that are never column references.
const RESERVED: &[&str] = &[
    "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "COLLATE", "CROSS", "CURRENT_DATE",
    "CURRENT_TIME", "CURRENT_TIMESTAMP", "DESC", "DISTINCT", "ELSE", "END", "ESCAPE", "EXCEPT",
    "EXISTS", "FALSE", "FROM", "FULL", "GLOB", "GROUP", "HAVING", "IN", "INNER", "INTEGER",
    "INTERSECT", "IS", "ISNULL", "JOIN", "LEFT", "LIKE", "LIMIT", "NATURAL", "NOCASE", "NOT",
    "NOTNULL", "NULL", "NULLS", "OFFSET", "ON", "OR", "ORDER", "OUTER", "REAL", "RECURSIVE",
    "RIGHT", "SELECT", "TEXT", "THEN", "TRUE", "UNION", "USING", "VALUES", "WHEN", "WHERE", "WITH",
    "FIRST", "LAST", "NUMERIC",
];

/// Words that end a table reference (and so can never be a table alias).
const CLAUSE_WORDS: &[&str] = &[
    "CROSS", "EXCEPT", "FULL", "GROUP", "HAVING", "INNER", "INTERSECT", "JOIN", "LEFT", "LIMIT",
    "NATURAL", "ON", "ORDER", "OUTER", "RIGHT", "UNION", "USING", "WHERE", "WINDOW",
];

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
enum Token {
    /// Unquoted word.
    Word(String),
    /// `"x"`, `` `x` `` or `[x]`. Never treated as a keyword.
    Quoted(String),
    Number,
    Literal,
    Punct(char),
}

impl Token {
    fn ident(&self) -> Option<&str> {
        match self {
            Token::Word(w) | Token::Quoted(w) => Some(w),
            _ => None,
        }
    }

    fn is_word(&self, kw: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(kw))
    }

    fn is_punct(&self, c: char) -> bool {
        matches!(self, Token::Punct(p) if *p == c)
    }
}

fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
        } else if c == '\'' {
            // '' inside a literal is an escaped quote.
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        i += 2;
                        continue;
                    }
                    break;
                }
                i += 1;
            }
            i += 1;
            tokens.push(Token::Literal);
        } else if c == '"' || c == '`' || c == '[' {
            let close = if c == '[' { ']' } else { c };
            let start = i + 1;
            i = start;
            while i < chars.len() && chars[i] != close {
                i += 1;
            }
            tokens.push(Token::Quoted(chars[start..i.min(chars.len())].iter().collect()));
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number);
        } else {
            tokens.push(Token::Punct(c));
            i += 1;
        }
    }

    tokens
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn is_clause_word(word: &str) -> bool {
    CLAUSE_WORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

// =============================================================================
// Inspection
// =============================================================================

/// Leading statement keyword class.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Write(String),
    Other(String),
    #[default]
    Empty,
}

/// What the gate extracted from one SQL payload. All names are lowercase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SqlInspection {
    pub kind: StatementKind,
    pub multi_statement: bool,
    pub mutating_keywords: BTreeSet<String>,
    /// Tables named after FROM / JOIN, in order of first appearance.
    pub tables: Vec<String>,
    /// alias -> table
    pub aliases: HashMap<String, String>,
    /// (qualifier, column); column is `*` for `t.*`.
    pub qualified: Vec<(String, String)>,
    /// Unqualified names read as columns. Alias declarations and
    /// top-level ORDER BY references to output aliases are excluded.
    pub bare_identifiers: BTreeSet<String>,
    pub output_aliases: BTreeSet<String>,
    pub bare_wildcard: bool,
    pub has_join: bool,
}

impl SqlInspection {
    pub fn statement_kind(&self) -> &StatementKind {
        &self.kind
    }

    /// True for SELECT statements without any mutating keyword.
    pub fn is_read_only(&self) -> bool {
        *self.statement_kind() == StatementKind::Select && self.mutating_keywords.is_empty()
    }

    /// True when more than one table is read.
    pub fn is_multi_table(&self) -> bool {
        self.has_join || self.tables.len() > 1
    }

    fn resolve_qualifier(&self, qualifier: &str) -> Option<&str> {
        if let Some(table) = self.aliases.get(qualifier) {
            return Some(table);
        }
        self.tables
            .iter()
            .find(|t| t.as_str() == qualifier)
            .map(String::as_str)
    }
}

/// Extract the gate-relevant structure from `sql`.
pub fn inspect(sql: &str) -> SqlInspection {
    let tokens = tokenize(sql);
    let mut out = SqlInspection::default();

    let first_semicolon = tokens.iter().position(|t| t.is_punct(';'));
    if let Some(pos) = first_semicolon {
        out.multi_statement = tokens[pos..].iter().any(|t| !t.is_punct(';'));
    }

    out.kind = match tokens.first() {
        None => StatementKind::Empty,
        Some(Token::Word(w)) => {
            let upper = w.to_ascii_uppercase();
            if upper == "SELECT" || upper == "WITH" {
                StatementKind::Select
            } else if MUTATING_KEYWORDS.contains(&upper.as_str()) {
                StatementKind::Write(upper)
            } else {
                StatementKind::Other(upper)
            }
        }
        Some(_) => StatementKind::Other(String::new()),
    };

    // Indices consumed as table names, aliases, output aliases or qualified refs.
    let mut consumed = vec![false; tokens.len()];

    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];

        if let Token::Word(w) = tok {
            let upper = w.to_ascii_uppercase();
            if MUTATING_KEYWORDS.contains(&upper.as_str()) {
                // `replace(...)` is a string function, not a statement.
                let is_call = upper == "REPLACE" && tokens.get(i + 1).is_some_and(|t| t.is_punct('('));
                if !is_call {
                    out.mutating_keywords.insert(upper.clone());
                }
            }

            if upper == "FROM" || upper == "JOIN" {
                if upper == "JOIN" {
                    out.has_join = true;
                }
                i = read_table_refs(&tokens, i + 1, upper == "FROM", &mut out, &mut consumed);
                continue;
            }

            if upper == "AS" {
                if let Some(name) = tokens.get(i + 1).and_then(Token::ident) {
                    out.output_aliases.insert(name.to_ascii_lowercase());
                    consumed[i + 1] = true;
                }
            }
        }

        i += 1;
    }

    // Output aliases resolve before columns only in the outermost ORDER BY.
    // Anywhere else a name is read as a column when the schema has one.
    let mut depth = 0usize;
    let mut in_order_by = false;

    for i in 0..tokens.len() {
        match &tokens[i] {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => depth = depth.saturating_sub(1),
            Token::Punct(';') => in_order_by = false,
            Token::Word(w) if depth == 0 => {
                if w.eq_ignore_ascii_case("ORDER")
                    && tokens.get(i + 1).is_some_and(|t| t.is_word("BY"))
                {
                    in_order_by = true;
                } else if ["LIMIT", "OFFSET", "UNION", "EXCEPT", "INTERSECT"]
                    .iter()
                    .any(|k| w.eq_ignore_ascii_case(k))
                {
                    in_order_by = false;
                }
            }
            _ => {}
        }
        if consumed[i] {
            continue;
        }
        match &tokens[i] {
            Token::Punct('*') => {
                let prev = i.checked_sub(1).map(|p| &tokens[p]);
                match prev {
                    Some(Token::Punct('.')) | Some(Token::Punct('(')) => {}
                    Some(t) if t.is_word("SELECT") || t.is_word("DISTINCT") || t.is_punct(',') => {
                        out.bare_wildcard = true;
                    }
                    _ => {}
                }
            }
            t @ (Token::Word(_) | Token::Quoted(_)) => {
                let name = t.ident().unwrap_or_default().to_ascii_lowercase();
                let dotted = tokens.get(i + 1).is_some_and(|n| n.is_punct('.'));
                if dotted {
                    let column = match tokens.get(i + 2) {
                        Some(Token::Punct('*')) => Some("*".to_string()),
                        Some(next) => next.ident().map(str::to_ascii_lowercase),
                        None => None,
                    };
                    if let Some(column) = column {
                        out.qualified.push((name, column));
                        consumed[i + 2] = true;
                    }
                    continue;
                }
                let after_dot = i > 0 && tokens[i - 1].is_punct('.');
                let is_call = tokens.get(i + 1).is_some_and(|n| n.is_punct('('));
                let keyword = matches!(t, Token::Word(w) if is_reserved(w)
                    || MUTATING_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(w)));
                let alias_ref =
                    in_order_by && depth == 0 && out.output_aliases.contains(&name);
                if !after_dot && !is_call && !keyword && !alias_ref {
                    out.bare_identifiers.insert(name);
                }
            }
            _ => {}
        }
    }

    out
}

/// Read `table [AS alias] [, table [AS alias]]*` starting at `i`.
fn read_table_refs(
    tokens: &[Token],
    mut i: usize,
    allow_list: bool,
    out: &mut SqlInspection,
    consumed: &mut [bool],
) -> usize {
    loop {
        let Some(name) = tokens.get(i).and_then(Token::ident) else {
            // Subquery or syntax the gate does not model; inner FROMs are
            // picked up by the main scan.
            return i;
        };
        if matches!(tokens[i], Token::Word(ref w) if is_reserved(w)) {
            return i;
        }
        let table = name.to_ascii_lowercase();
        consumed[i] = true;
        if !out.tables.contains(&table) {
            out.tables.push(table.clone());
        }
        i += 1;

        if tokens.get(i).is_some_and(|t| t.is_word("AS")) {
            consumed[i] = true;
            i += 1;
        }
        if let Some(alias) = tokens.get(i).and_then(Token::ident) {
            let is_alias = match &tokens[i] {
                Token::Word(w) => !is_clause_word(w) && !is_reserved(w),
                _ => true,
            };
            if is_alias {
                out.aliases.insert(alias.to_ascii_lowercase(), table);
                consumed[i] = true;
                i += 1;
            }
        }

        if allow_list && tokens.get(i).is_some_and(|t| t.is_punct(',')) {
            i += 1;
            continue;
        }
        return i;
    }
}

// =============================================================================
// Authorization
// =============================================================================

/// Authorize `sql` for `scope`. `schema` (table -> columns) resolves bare
/// column names to the tables that own them.
///
/// The error message is an internal reason meant for logs only.
pub fn authorize(
    scope: &AccessScope,
    sql: &str,
    schema: &BTreeMap<String, Vec<String>>,
) -> Result<SqlInspection, ChatError> {
    let inspection = inspect(sql);
    authorize_inspection(scope, &inspection, schema)?;
    Ok(inspection)
}

pub fn authorize_inspection(
    scope: &AccessScope,
    inspection: &SqlInspection,
    schema: &BTreeMap<String, Vec<String>>,
) -> Result<(), ChatError> {
    let deny = |reason: String| Err(ChatError::AccessDenied(reason));

    if inspection.multi_statement {
        return deny("multiple statements in one payload".to_string());
    }
    match inspection.statement_kind() {
        StatementKind::Empty => return deny("empty statement".to_string()),
        StatementKind::Other(kw) => return deny(format!("unsupported statement '{}'", kw)),
        _ => {}
    }

    if !inspection.is_read_only() && !scope.allows(Operation::Write) {
        return deny(format!(
            "write operation ({}) requires write permission",
            describe_write(inspection)
        ));
    }
    if !scope.allows(Operation::Read) {
        return deny("read permission missing".to_string());
    }

    for table in &inspection.tables {
        if !scope.allows_table(table) {
            return deny(format!("table '{}' not granted", table));
        }
    }

    for (qualifier, column) in &inspection.qualified {
        let Some(table) = inspection.resolve_qualifier(qualifier) else {
            continue;
        };
        if column == "*" {
            if !scope.grant(table).is_some_and(|g| g.is_all()) {
                return deny(format!("wildcard on column-restricted table '{}'", table));
            }
        } else if !scope.allows_column(table, column) {
            return deny(format!("column '{}.{}' not granted", table, column));
        }
    }

    if inspection.bare_wildcard {
        for table in &inspection.tables {
            if !scope.grant(table).is_some_and(|g| g.is_all()) {
                return deny(format!("wildcard on column-restricted table '{}'", table));
            }
        }
    }

    // Table names and aliases never shadow a bare column of the same name.
    for ident in &inspection.bare_identifiers {
        for table in &inspection.tables {
            let owns = schema
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(table))
                .is_some_and(|(_, cols)| cols.iter().any(|c| c.eq_ignore_ascii_case(ident)));
            if owns && !scope.allows_column(table, ident) {
                return deny(format!("column '{}.{}' not granted", table, ident));
            }
        }
    }

    Ok(())
}

fn describe_write(inspection: &SqlInspection) -> String {
    match inspection.statement_kind() {
        StatementKind::Write(kw) => kw.clone(),
        _ => inspection
            .mutating_keywords
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
    }
}
