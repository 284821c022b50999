//! Query handler registry and trait definition.
//!
//! Defines the `QueryHandler` async trait, the registry that selects a
//! handler by [`Intent`], and the shared read path used by every handler
//! that touches the database.

pub mod complex_query;
pub mod conversation;
pub mod simple_query;
pub mod unauthorized;
pub mod visualization;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use querydesk_core::config::CollaboratorConfig;
use querydesk_core::types::{Role, TableData};

use crate::access::AccessScope;
use crate::collaborator::{
    with_timeout, ChartGenerator, DataSource, GenerationContext, SchemaSource, SqlGenerator,
};
use crate::error::ChatError;
use crate::history::render_context;
use crate::router::RoutingDecision;
use crate::sql;
use crate::templates::SqlTemplates;
use crate::types::{HistoryEntry, Intent, PartialResult};

pub use complex_query::ComplexQueryHandler;
pub use conversation::ConversationHandler;
pub use simple_query::SimpleQueryHandler;
pub use unauthorized::UnauthorizedHandler;
pub use visualization::VisualizationHandler;

/// Everything a handler may look at for one request.
#[derive(Clone, Copy, Debug)]
pub struct HandlerContext<'a> {
    pub user_id: &'a str,
    pub query: &'a str,
    pub scope: &'a AccessScope,
    /// Recent history, most recent last.
    pub history: &'a [HistoryEntry],
    pub decision: &'a RoutingDecision,
    pub request_context: Option<&'a serde_json::Value>,
}

impl HandlerContext<'_> {
    pub fn role(&self) -> Role {
        self.scope.role
    }
}

/// A handler for one intent.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// The intent this handler serves.
    fn intent(&self) -> Intent;

    /// Produce partial results for the request.
    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<Vec<PartialResult>, ChatError>;
}

// =============================================================================
// Registry
// =============================================================================

/// Maps intents to their handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Intent, Arc<dyn QueryHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same intent.
    pub fn register(&mut self, handler: Arc<dyn QueryHandler>) {
        self.handlers.insert(handler.intent(), handler);
    }

    pub fn get(&self, intent: Intent) -> Option<Arc<dyn QueryHandler>> {
        self.handlers.get(&intent).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Register the five built-in handlers.
    pub fn register_defaults(
        &mut self,
        reads: Arc<ReadPath>,
        charts: Arc<dyn ChartGenerator>,
        chart_timeout: Duration,
    ) {
        self.register(Arc::new(ConversationHandler));
        self.register(Arc::new(SimpleQueryHandler::new(Arc::clone(&reads))));
        self.register(Arc::new(ComplexQueryHandler::new(Arc::clone(&reads))));
        self.register(Arc::new(VisualizationHandler::new(
            reads,
            charts,
            chart_timeout,
        )));
        self.register(Arc::new(UnauthorizedHandler));
    }
}

// =============================================================================
// Read path
// =============================================================================

/// Shape of the read a handler is willing to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadShape {
    /// One table, no joins.
    Single,
    /// Joins and aggregations allowed.
    Multi,
}

/// Time limits for collaborator calls.
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
    pub classify: Duration,
    pub generation: Duration,
    pub query: Duration,
}

impl From<&CollaboratorConfig> for Timeouts {
    fn from(config: &CollaboratorConfig) -> Self {
        Self {
            classify: Duration::from_millis(config.classify_timeout_ms),
            generation: Duration::from_millis(config.generation_timeout_ms),
            query: Duration::from_millis(config.query_timeout_ms),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&CollaboratorConfig::default())
    }
}

/// The statement that ran and what it returned.
#[derive(Clone, Debug)]
pub struct ReadOutcome {
    pub sql: String,
    pub table: TableData,
}

/// Draft, gate, and execute a read for one request.
///
/// The generator sees only the scoped schema. Its draft (or the template
/// fallback) must pass [`sql::authorize`] before anything runs.
pub struct ReadPath {
    generator: Arc<dyn SqlGenerator>,
    data: Arc<dyn DataSource>,
    schema: Arc<dyn SchemaSource>,
    timeouts: Timeouts,
    default_limit: usize,
    context_turns: usize,
}

impl ReadPath {
    pub fn new(
        generator: Arc<dyn SqlGenerator>,
        data: Arc<dyn DataSource>,
        schema: Arc<dyn SchemaSource>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            generator,
            data,
            schema,
            timeouts,
            default_limit: 50,
            context_turns: 10,
        }
    }

    pub fn with_limits(mut self, default_limit: usize, context_turns: usize) -> Self {
        self.default_limit = default_limit;
        self.context_turns = context_turns;
        self
    }

    pub async fn read(
        &self,
        ctx: &HandlerContext<'_>,
        shape: ReadShape,
    ) -> Result<ReadOutcome, ChatError> {
        let schema = with_timeout("schema lookup", self.timeouts.query, self.schema.describe()).await?;

        let start = ctx.history.len().saturating_sub(self.context_turns);
        let generation = GenerationContext {
            schema: ctx.scope.restrict_schema(&schema),
            history: render_context(&ctx.history[start..]),
        };

        let draft = match with_timeout(
            "SQL generation",
            self.timeouts.generation,
            self.generator.generate(ctx.query, &generation),
        )
        .await
        {
            Ok(sql) if !sql.trim().is_empty() => Some(sql.trim().trim_end_matches(';').to_string()),
            Ok(_) => {
                warn!("SQL generator returned an empty draft, using template");
                None
            }
            Err(e) => {
                warn!(error = %e, "SQL generation failed, using template");
                None
            }
        };

        let draft = draft.filter(|sql| {
            let keep = shape == ReadShape::Multi || !sql::inspect(sql).is_multi_table();
            if !keep {
                debug!("Discarding multi-table draft for a single-table read");
            }
            keep
        });

        let sql = match draft {
            Some(sql) => sql,
            None => {
                let templates = SqlTemplates::new(&schema, ctx.scope, self.default_limit);
                let built = match shape {
                    ReadShape::Single => templates.simple(ctx.query),
                    ReadShape::Multi => templates.complex(ctx.query),
                };
                built.ok_or_else(|| {
                    ChatError::Generation("no template matches the request".to_string())
                })?
            }
        };

        sql::authorize(ctx.scope, &sql, &schema)?;
        debug!(user_id = ctx.user_id, %sql, "Read authorized");

        let table = with_timeout(
            "query execution",
            self.timeouts.query,
            self.data.execute(&sql, ctx.scope),
        )
        .await?;

        Ok(ReadOutcome { sql, table })
    }
}
