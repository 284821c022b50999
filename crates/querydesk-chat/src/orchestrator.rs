//! Chat orchestrator: central coordinator wiring scoping, routing, handlers,
//! and the response composer.
//!
//! Every request walks `received -> scoped -> routed -> handling -> composed`,
//! or ends in `denied`. Requests for one user run one at a time; different
//! users run concurrently.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use querydesk_core::config::{ChatConfig, QueryDeskConfig};
use querydesk_core::types::{Operation, Role};
use querydesk_storage::Database;

use crate::access::{AccessPolicy, RoleDescription};
use crate::collaborator::{
    with_timeout, ChartGenerator, DataSource, IntentClassifier, SchemaSource, SqlGenerator,
    SqliteSource, Unavailable,
};
use crate::composer::ResponseComposer;
use crate::error::ChatError;
use crate::handler::unauthorized::denial_message;
use crate::handler::{HandlerContext, HandlerRegistry, ReadPath, Timeouts};
use crate::history::HistoryStore;
use crate::router::IntentRouter;
use crate::types::{
    ChatRequest, HistoryEntry, HistoryStats, InteractionType, PartialResult, Reply,
};

// =============================================================================
// Collaborators
// =============================================================================

/// The external services the pipeline calls.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn IntentClassifier>,
    pub sql: Arc<dyn SqlGenerator>,
    pub charts: Arc<dyn ChartGenerator>,
    pub data: Arc<dyn DataSource>,
    pub schema: Arc<dyn SchemaSource>,
}

impl Collaborators {
    /// SQLite for data and schema; no language model behind the
    /// classifier or generators.
    pub fn sqlite(source: SqliteSource) -> Self {
        let source = Arc::new(source);
        Self {
            classifier: Arc::new(Unavailable),
            sql: Arc::new(Unavailable),
            charts: Arc::new(Unavailable),
            data: source.clone(),
            schema: source,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_sql_generator(mut self, sql: Arc<dyn SqlGenerator>) -> Self {
        self.sql = sql;
        self
    }

    pub fn with_chart_generator(mut self, charts: Arc<dyn ChartGenerator>) -> Self {
        self.charts = charts;
        self
    }

    pub fn with_data_source(mut self, data: Arc<dyn DataSource>) -> Self {
        self.data = data;
        self
    }
}

/// Result of looking up a table's columns for a role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnLookup {
    Granted(Vec<String>),
    /// The table exists but the role may not read it.
    Forbidden,
    Unknown,
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct ChatOrchestrator {
    policy: AccessPolicy,
    router: IntentRouter,
    registry: HandlerRegistry,
    composer: ResponseComposer,
    history: Arc<HistoryStore>,
    schema: Arc<dyn SchemaSource>,
    timeouts: Timeouts,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(collaborators: Collaborators, config: ChatConfig, timeouts: Timeouts) -> Self {
        Self::with_history(collaborators, config, timeouts, Arc::new(HistoryStore::new()))
    }

    pub fn with_history(
        collaborators: Collaborators,
        config: ChatConfig,
        timeouts: Timeouts,
        history: Arc<HistoryStore>,
    ) -> Self {
        let policy = AccessPolicy::new();
        let known_tables: BTreeSet<String> = policy
            .roles()
            .into_iter()
            .flat_map(|r| r.tables.into_keys())
            .collect();
        let router = IntentRouter::new(
            collaborators.classifier,
            timeouts.classify,
            known_tables,
        );

        let reads = Arc::new(
            ReadPath::new(
                collaborators.sql,
                collaborators.data,
                Arc::clone(&collaborators.schema),
                timeouts,
            )
            .with_limits(config.default_row_limit, config.context_turns),
        );
        let mut registry = HandlerRegistry::new();
        registry.register_defaults(reads, collaborators.charts, timeouts.generation);

        let composer = ResponseComposer::new(Arc::clone(&history), config.reply_history_limit);

        Self {
            policy,
            router,
            registry,
            composer,
            history,
            schema: collaborators.schema,
            timeouts,
            user_locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Default wiring over an opened database.
    pub fn from_config(config: &QueryDeskConfig, db: Arc<Database>) -> Self {
        let source = SqliteSource::new(db, config.database.max_rows);
        Self::new(
            Collaborators::sqlite(source),
            config.chat.clone(),
            Timeouts::from(&config.collaborators),
        )
    }

    /// Answer one query.
    ///
    /// Fails only on request validation. Everything after scoping ends in
    /// a reply, including denials and collaborator failures.
    pub async fn handle(&self, request: ChatRequest) -> Result<Reply, ChatError> {
        self.validate(&request)?;
        let ChatRequest {
            user_id,
            role,
            query,
            context,
        } = request;
        let query = query.trim();
        info!(user_id = %user_id, role = %role, query_len = query.len(), "Query received");

        let lock = self.user_lock(&user_id);
        let guard = lock.lock().await;

        let scope = self.policy.scope_for(role);
        let history = self.history.get(&user_id, self.config.context_turns);
        debug!(user_id = %user_id, tables = scope.tables.len(), "Scoped");

        let decision = self.router.route(query, &scope).await;
        info!(
            user_id = %user_id,
            classified = %decision.classified,
            intent = %decision.intent,
            source = ?decision.source,
            "Routed"
        );
        if decision.overridden {
            warn!(
                user_id = %user_id,
                role = %role,
                classified = %decision.classified,
                "Denied: role lacks the required operation"
            );
        }

        let ctx = HandlerContext {
            user_id: &user_id,
            query,
            scope: &scope,
            history: &history,
            decision: &decision,
            request_context: context.as_ref(),
        };

        let (parts, interaction) = match self.registry.get(decision.intent) {
            Some(handler) => {
                debug!(user_id = %user_id, intent = %decision.intent, "Handling");
                match handler.handle(&ctx).await {
                    Ok(parts) => (parts, InteractionType::from(decision.intent)),
                    Err(ChatError::AccessDenied(reason)) => {
                        warn!(user_id = %user_id, role = %role, %reason, "Denied by SQL gate");
                        let required = decision.required.or(Some(Operation::Read));
                        (
                            vec![PartialResult::Text(denial_message(role, required))],
                            InteractionType::Unauthorized,
                        )
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Handler failed");
                        (
                            vec![PartialResult::Text(failure_message(&e).to_string())],
                            InteractionType::Error,
                        )
                    }
                }
            }
            None => {
                warn!(intent = %decision.intent, "No handler registered");
                (
                    vec![PartialResult::Text(NOT_PROCESSED.to_string())],
                    InteractionType::Error,
                )
            }
        };

        let reply = self
            .composer
            .compose(parts, &user_id, role, query, interaction);
        info!(
            user_id = %user_id,
            interaction = interaction.as_str(),
            has_data = reply.data.is_some(),
            "Composed"
        );

        drop(guard);
        drop(lock);
        self.release_lock(&user_id);
        Ok(reply)
    }

    // -- Administrative surface --

    pub fn get_history(&self, user_id: &str, limit: usize) -> Vec<HistoryEntry> {
        self.history.get(user_id, limit)
    }

    /// Returns whether the user had any history.
    pub fn clear_history(&self, user_id: &str) -> bool {
        let cleared = self.history.clear(user_id);
        self.release_lock(user_id);
        info!(user_id, cleared, "History cleared");
        cleared
    }

    pub fn export_history(&self, user_id: &str) -> Result<Option<String>, ChatError> {
        self.history.export(user_id)
    }

    pub fn roles(&self) -> Vec<RoleDescription> {
        self.policy.roles()
    }

    pub fn stats(&self) -> HistoryStats {
        self.history.stats()
    }

    pub fn users(&self) -> Vec<String> {
        self.history.users()
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Tables `role` may read that exist in the engine.
    pub async fn visible_tables(&self, role: Role) -> Result<Vec<String>, ChatError> {
        let schema = self.describe().await?;
        let scope = self.policy.scope_for(role);
        Ok(schema
            .into_keys()
            .filter(|table| scope.allows_table(table))
            .collect())
    }

    /// Columns of `table` that `role` may read.
    pub async fn visible_columns(&self, role: Role, table: &str) -> Result<ColumnLookup, ChatError> {
        let schema = self.describe().await?;
        let Some((name, columns)) = schema
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
        else {
            return Ok(ColumnLookup::Unknown);
        };
        let scope = self.policy.scope_for(role);
        if !scope.allows_table(name) {
            return Ok(ColumnLookup::Forbidden);
        }
        Ok(ColumnLookup::Granted(scope.visible_columns(name, columns)))
    }

    // -- Private helpers --

    fn validate(&self, request: &ChatRequest) -> Result<(), ChatError> {
        if request.user_id.trim().is_empty() {
            return Err(ChatError::EmptyUserId);
        }
        let query = request.query.trim();
        if query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }
        if query.chars().count() > self.config.max_query_length {
            return Err(ChatError::QueryTooLong(self.config.max_query_length));
        }
        Ok(())
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    /// Drop the user's lock entry when no request holds or awaits it.
    fn release_lock(&self, user_id: &str) {
        let mut locks = self.user_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(user_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(user_id);
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.user_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn describe(&self) -> Result<BTreeMap<String, Vec<String>>, ChatError> {
        with_timeout("schema lookup", self.timeouts.query, self.schema.describe()).await
    }
}

const NOT_PROCESSED: &str =
    "I could not process that request. Try asking about a specific table, for example \"Show me all users\".";

/// User-facing text for a failure after scoping.
fn failure_message(err: &ChatError) -> &'static str {
    match err {
        ChatError::Execution(_) | ChatError::Storage(_) => {
            "I ran into a problem running that query. Please try rephrasing it."
        }
        ChatError::Timeout(_) => "That request took too long to process. Please try again.",
        _ => NOT_PROCESSED,
    }
}
