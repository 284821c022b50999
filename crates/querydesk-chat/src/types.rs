//! Types for the chat pipeline: intents, history entries, partial results,
//! and the request/reply envelopes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use querydesk_core::types::{Operation, Role, TableData};

// =============================================================================
// Intent
// =============================================================================

/// What a query is asking for. Produced by the router, consumed once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ChitChat,
    SimpleQuery,
    ComplexQuery,
    Visualize,
    Unauthorized,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::ChitChat => "chit_chat",
            Intent::SimpleQuery => "simple_query",
            Intent::ComplexQuery => "complex_query",
            Intent::Visualize => "visualize",
            Intent::Unauthorized => "unauthorized",
        }
    }

    /// Parse the tag an external classifier returns. Accepts a few common
    /// spellings; anything else is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_")
            .as_str()
        {
            "chit_chat" | "chitchat" | "conversation" => Some(Intent::ChitChat),
            "simple_query" | "simple" | "query" => Some(Intent::SimpleQuery),
            "complex_query" | "complex" => Some(Intent::ComplexQuery),
            "visualize" | "visualization" | "chart" => Some(Intent::Visualize),
            "unauthorized" => Some(Intent::Unauthorized),
            _ => None,
        }
    }

    /// Operation the caller must hold for this intent to run, if any.
    pub fn required_operation(&self) -> Option<Operation> {
        match self {
            Intent::SimpleQuery | Intent::ComplexQuery => Some(Operation::Read),
            Intent::Visualize => Some(Operation::Visualize),
            Intent::ChitChat | Intent::Unauthorized => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// History
// =============================================================================

/// Tag describing what kind of exchange a history entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    ChitChat,
    SimpleQuery,
    ComplexQuery,
    Visualize,
    Unauthorized,
    Error,
    /// Synthetic entry standing in for a compacted prefix.
    Summary,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::ChitChat => "chit_chat",
            InteractionType::SimpleQuery => "simple_query",
            InteractionType::ComplexQuery => "complex_query",
            InteractionType::Visualize => "visualize",
            InteractionType::Unauthorized => "unauthorized",
            InteractionType::Error => "error",
            InteractionType::Summary => "summary",
        }
    }
}

impl From<Intent> for InteractionType {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::ChitChat => InteractionType::ChitChat,
            Intent::SimpleQuery => InteractionType::SimpleQuery,
            Intent::ComplexQuery => InteractionType::ComplexQuery,
            Intent::Visualize => InteractionType::Visualize,
            Intent::Unauthorized => InteractionType::Unauthorized,
        }
    }
}

/// Digest carried by a summary entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionDigest {
    /// Number of raw entries folded into this summary, across compactions.
    pub original_count: usize,
    pub key_topics: Vec<String>,
    /// Broad categories seen in the folded queries (data retrieval, aggregation, ...).
    pub categories: Vec<String>,
    /// Count of folded entries per interaction-type tag.
    pub interaction_counts: BTreeMap<String, usize>,
}

/// One recorded exchange. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub query: String,
    pub response_summary: String,
    pub interaction_type: InteractionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<CompactionDigest>,
}

impl HistoryEntry {
    pub fn new(
        role: Role,
        query: impl Into<String>,
        response_summary: impl Into<String>,
        interaction_type: InteractionType,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            role,
            query: query.into(),
            response_summary: response_summary.into(),
            interaction_type,
            digest: None,
        }
    }

    pub fn is_summary(&self) -> bool {
        self.interaction_type == InteractionType::Summary
    }
}

// =============================================================================
// Partial results
// =============================================================================

/// Chart kinds the visualization handler can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    Pie,
    Line,
    Scatter,
    Area,
    Histogram,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Pie => "pie",
            ChartType::Line => "line",
            ChartType::Scatter => "scatter",
            ChartType::Area => "area",
            ChartType::Histogram => "histogram",
        }
    }

    /// Parse a supported chart name. Unsupported names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bar" => Some(ChartType::Bar),
            "pie" => Some(ChartType::Pie),
            "line" => Some(ChartType::Line),
            "scatter" => Some(ChartType::Scatter),
            "area" => Some(ChartType::Area),
            "histogram" => Some(ChartType::Histogram),
            _ => None,
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chart specification: labels on `x`, numeric series on `y`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartResult {
    pub chart_type: ChartType,
    pub x: Vec<serde_json::Value>,
    pub y: Vec<f64>,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_label: Option<String>,
}

/// Typed output of a handler, merged by the composer.
#[derive(Clone, Debug, PartialEq)]
pub enum PartialResult {
    Text(String),
    Table(TableData),
    Chart(ChartResult),
}

// =============================================================================
// Request / reply
// =============================================================================

/// Inbound query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub role: Role,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// Structured payload attached to a reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartResult>,
}

/// The single conversational reply for a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ReplyData>,
    pub history: Vec<HistoryEntry>,
}

/// Totals reported on the administrative surface.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub active_users: usize,
    pub total_entries: usize,
}
