//! Conversational query pipeline for QueryDesk.
//!
//! Turns a natural-language question into a scoped, authorized read against
//! the relational engine and answers with text, a table, and optionally a
//! chart. Per-user history carries context between questions.

pub mod access;
pub mod collaborator;
pub mod composer;
pub mod error;
pub mod handler;
pub mod history;
pub mod orchestrator;
pub mod router;
pub mod sql;
pub mod templates;
pub mod types;

pub use access::{AccessPolicy, AccessScope, ColumnGrant, RoleDescription};
pub use collaborator::{
    ChartGenerator, DataSource, GenerationContext, IntentClassifier, SchemaSource, SqlGenerator,
    SqliteSource, Unavailable,
};
pub use composer::ResponseComposer;
pub use error::ChatError;
pub use handler::{HandlerContext, HandlerRegistry, QueryHandler, ReadPath, Timeouts};
pub use history::{HistoryStore, HistorySummarizer, KeywordSummarizer};
pub use orchestrator::{ChatOrchestrator, Collaborators, ColumnLookup};
pub use router::{ClassificationSource, IntentRouter, RoutingDecision};
pub use types::{
    ChartResult, ChartType, ChatRequest, CompactionDigest, HistoryEntry, HistoryStats, Intent,
    InteractionType, PartialResult, Reply, ReplyData,
};
