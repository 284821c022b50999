//! QueryDesk API crate - axum HTTP server and route handlers.
//!
//! Exposes the chat pipeline over REST: the chat endpoint, per-user
//! history management, the role table, usage stats, schema views scoped
//! by role, and health checks.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
