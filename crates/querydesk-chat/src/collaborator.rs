//! Interfaces to the external collaborators the pipeline depends on:
//! intent classification, SQL drafting, chart drafting, the relational
//! engine and its schema.
//!
//! Every call made through these traits is bounded by [`with_timeout`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use querydesk_core::types::{Operation, TableData};
use querydesk_storage::Database;

use crate::access::AccessScope;
use crate::error::ChatError;
use crate::types::{ChartResult, Intent};

/// Context handed to the SQL generator: the schema restricted to the
/// caller's scope and rendered conversation history.
#[derive(Clone, Debug, Default)]
pub struct GenerationContext {
    pub schema: BTreeMap<String, Vec<String>>,
    pub history: String,
}

impl GenerationContext {
    /// Render the schema as `table(col, col)` lines for a prompt.
    pub fn schema_prompt(&self) -> String {
        self.schema
            .iter()
            .map(|(table, cols)| format!("{}({})", table, cols.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> Result<Intent, ChatError>;
}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, query: &str, context: &GenerationContext) -> Result<String, ChatError>;
}

#[async_trait]
pub trait ChartGenerator: Send + Sync {
    async fn generate(&self, query: &str, data: &TableData) -> Result<ChartResult, ChatError>;
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Run an already-authorized read.
    async fn execute(&self, sql: &str, scope: &AccessScope) -> Result<TableData, ChatError>;
}

#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Table name to column names, for every table in the engine.
    async fn describe(&self) -> Result<BTreeMap<String, Vec<String>>, ChatError>;
}

/// Stand-in for collaborators that are not configured. Always fails, so the
/// deterministic fallbacks answer.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unavailable;

#[async_trait]
impl IntentClassifier for Unavailable {
    async fn classify(&self, _query: &str) -> Result<Intent, ChatError> {
        Err(ChatError::Classification(
            "no intent classifier configured".to_string(),
        ))
    }
}

#[async_trait]
impl SqlGenerator for Unavailable {
    async fn generate(&self, _query: &str, _ctx: &GenerationContext) -> Result<String, ChatError> {
        Err(ChatError::Generation("no SQL generator configured".to_string()))
    }
}

#[async_trait]
impl ChartGenerator for Unavailable {
    async fn generate(&self, _query: &str, _data: &TableData) -> Result<ChartResult, ChatError> {
        Err(ChatError::Generation("no chart generator configured".to_string()))
    }
}

/// SQLite-backed data and schema source.
///
/// Blocking rusqlite calls run on the blocking pool.
#[derive(Clone, Debug)]
pub struct SqliteSource {
    db: Arc<Database>,
    max_rows: usize,
}

impl SqliteSource {
    pub fn new(db: Arc<Database>, max_rows: usize) -> Self {
        Self { db, max_rows }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

#[async_trait]
impl DataSource for SqliteSource {
    async fn execute(&self, sql: &str, scope: &AccessScope) -> Result<TableData, ChatError> {
        if !scope.allows(Operation::Read) {
            return Err(ChatError::AccessDenied("read permission missing".to_string()));
        }
        let db = Arc::clone(&self.db);
        let sql = sql.to_string();
        let max_rows = self.max_rows;
        debug!(%sql, "Executing read");
        tokio::task::spawn_blocking(move || db.execute_read(&sql, max_rows))
            .await
            .map_err(|e| ChatError::Execution(format!("query task failed: {}", e)))?
            .map_err(ChatError::from)
    }
}

#[async_trait]
impl SchemaSource for SqliteSource {
    async fn describe(&self) -> Result<BTreeMap<String, Vec<String>>, ChatError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || db.describe_schema())
            .await
            .map_err(|e| ChatError::Storage(format!("schema task failed: {}", e)))?
            .map_err(ChatError::from)
    }
}

/// Await `fut` for at most `limit`; expiry becomes [`ChatError::Timeout`].
pub async fn with_timeout<T, F>(label: &'static str, limit: Duration, fut: F) -> Result<T, ChatError>
where
    F: Future<Output = Result<T, ChatError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ChatError::Timeout(label)),
    }
}
