//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query/path parameters via axum extractors,
//! calls into the chat orchestrator or the database, and returns JSON.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use querydesk_chat::{ChatRequest, ColumnLookup, HistoryEntry, Reply, RoleDescription};
use querydesk_core::types::Role;
use querydesk_storage::ColumnInfo;

use crate::error::ApiError;
use crate::state::AppState;

/// Default number of entries returned by GET /history/{user_id}.
const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Number of user ids listed by GET /stats.
const STATS_USER_SAMPLE: usize = 10;

// =============================================================================
// Query parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RoleParams {
    pub role: Option<String>,
}

impl RoleParams {
    fn role(&self) -> Result<Role, ApiError> {
        let raw = self
            .role
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("'role' query parameter is required".to_string()))?;
        Ok(Role::from_str(raw)?)
    }
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct BannerResponse {
    pub service: String,
    pub version: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub database: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub history: Vec<HistoryEntry>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub user_id: String,
    pub cleared: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RolesResponse {
    pub roles: Vec<RoleDescription>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub active_users: usize,
    pub total_entries: usize,
    pub users: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TablesResponse {
    pub role: Role,
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TableSchemaResponse {
    pub table: String,
    pub role: Role,
    pub columns: Vec<ColumnInfo>,
}

// =============================================================================
// Service
// =============================================================================

/// GET / - service banner.
pub async fn root() -> Json<BannerResponse> {
    Json(BannerResponse {
        service: "QueryDesk".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = Arc::clone(&state.database);
    let connected = tokio::task::spawn_blocking(move || db.ping())
        .await
        .unwrap_or(false);

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        database: if connected { "connected" } else { "disconnected" }.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// =============================================================================
// Chat
// =============================================================================

/// POST /chat - answer one query.
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Reply>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let reply = state.orchestrator.handle(request).await?;
    Ok(Json(reply))
}

// =============================================================================
// History
// =============================================================================

/// GET /history/{user_id} - recent history, most recent last.
pub async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Json<HistoryResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let history = state.orchestrator.get_history(&user_id, limit);
    let total = state.orchestrator.history().len(&user_id);
    Json(HistoryResponse {
        user_id,
        history,
        total,
    })
}

/// DELETE /history/{user_id} - clear a user's history.
pub async fn clear_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<ClearResponse> {
    let cleared = state.orchestrator.clear_history(&user_id);
    let message = if cleared {
        format!("History cleared for user {}", user_id)
    } else {
        format!("No history found for user {}", user_id)
    };
    Json(ClearResponse {
        user_id,
        cleared,
        message,
    })
}

/// GET /history/{user_id}/export - full history as a JSON document.
pub async fn export_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = state
        .orchestrator
        .export_history(&user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("No history found for user {}", user_id)))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        doc,
    ))
}

// =============================================================================
// Roles, stats, schema
// =============================================================================

/// GET /roles - the role table.
pub async fn roles(State(state): State<AppState>) -> Json<RolesResponse> {
    Json(RolesResponse {
        roles: state.orchestrator.roles(),
    })
}

/// GET /stats - history usage.
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let totals = state.orchestrator.stats();
    let mut users = state.orchestrator.users();
    users.truncate(STATS_USER_SAMPLE);
    Json(StatsResponse {
        active_users: totals.active_users,
        total_entries: totals.total_entries,
        users,
    })
}

/// GET /tables?role= - tables the role may read.
pub async fn tables(
    State(state): State<AppState>,
    Query(params): Query<RoleParams>,
) -> Result<Json<TablesResponse>, ApiError> {
    let role = params.role()?;
    let tables = state.orchestrator.visible_tables(role).await?;
    Ok(Json(TablesResponse { role, tables }))
}

/// GET /schema/{table}?role= - permitted columns of one table.
pub async fn table_schema(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<RoleParams>,
) -> Result<Json<TableSchemaResponse>, ApiError> {
    let role = params.role()?;
    let permitted = match state.orchestrator.visible_columns(role, &table).await? {
        ColumnLookup::Granted(columns) => columns,
        ColumnLookup::Forbidden => {
            tracing::warn!(%role, "Schema request for a table outside the role's scope");
            return Err(ApiError::Forbidden(
                "Your role does not have access to this table".to_string(),
            ));
        }
        ColumnLookup::Unknown => {
            return Err(ApiError::NotFound(format!("Table '{}' not found", table)));
        }
    };

    let db = Arc::clone(&state.database);
    let name = table.to_lowercase();
    let info = tokio::task::spawn_blocking(move || db.table_info(&name))
        .await
        .map_err(|e| ApiError::Internal(format!("Schema task failed: {}", e)))??
        .ok_or_else(|| ApiError::NotFound(format!("Table '{}' not found", table)))?;

    let columns = info
        .columns
        .into_iter()
        .filter(|c| permitted.contains(&c.name))
        .collect();

    Ok(Json(TableSchemaResponse {
        table: info.name,
        role,
        columns,
    }))
}
