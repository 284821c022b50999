//! Single-table reads.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::ChatError;
use crate::handler::{HandlerContext, QueryHandler, ReadPath, ReadShape};
use crate::types::{Intent, PartialResult};

/// Reply for modification requests that reach the handler. Writes are never
/// executed through chat, whatever the role.
pub const WRITE_NOT_SUPPORTED: &str = "I can only read data through this chat. \
     Changes to the data have to be made directly in the database.";

/// Handler for `simple_query`.
pub struct SimpleQueryHandler {
    reads: Arc<ReadPath>,
}

impl SimpleQueryHandler {
    pub fn new(reads: Arc<ReadPath>) -> Self {
        Self { reads }
    }
}

#[async_trait]
impl QueryHandler for SimpleQueryHandler {
    fn intent(&self) -> Intent {
        Intent::SimpleQuery
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<Vec<PartialResult>, ChatError> {
        if ctx.decision.wants_write() {
            info!(user_id = ctx.user_id, role = %ctx.role(), "Declining data modification request");
            return Ok(vec![PartialResult::Text(WRITE_NOT_SUPPORTED.to_string())]);
        }

        let outcome = self.reads.read(ctx, ReadShape::Single).await?;
        info!(
            user_id = ctx.user_id,
            rows = outcome.table.row_count,
            "Simple query answered"
        );
        Ok(vec![PartialResult::Table(outcome.table)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::Unavailable;
    use crate::handler::test_support::*;
    use crate::router::ClassificationSource;
    use crate::router::RoutingDecision;
    use querydesk_core::types::{Operation, Role};
    use serde_json::json;

    #[tokio::test]
    async fn test_show_all_users() {
        let handler = SimpleQueryHandler::new(reads(Arc::new(Unavailable)));
        let scope = scope(Role::Analyst);
        let decision = decision(Intent::SimpleQuery);
        let ctx = context("Show me all users", &scope, &[], &decision);

        let results = handler.handle(&ctx).await.unwrap();
        assert_eq!(results.len(), 1);
        match &results[0] {
            PartialResult::Table(table) => {
                assert_eq!(
                    table.headers,
                    vec!["id", "name", "email", "age", "city", "created_at"]
                );
                assert_eq!(table.row_count, 8);
                assert_eq!(table.rows[0][1], json!("Alice Johnson"));
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_city_filter() {
        let handler = SimpleQueryHandler::new(reads(Arc::new(Unavailable)));
        let scope = scope(Role::Readonly);
        let decision = decision(Intent::SimpleQuery);
        let ctx = context("Show users from New York", &scope, &[], &decision);

        let results = handler.handle(&ctx).await.unwrap();
        let PartialResult::Table(table) = &results[0] else {
            panic!("expected table");
        };
        assert!(table.row_count >= 1);
        let city = table.headers.iter().position(|h| h == "city").unwrap();
        assert!(table.rows.iter().all(|r| r[city] == json!("New York")));
    }

    #[tokio::test]
    async fn test_write_request_declined_for_admin() {
        let handler = SimpleQueryHandler::new(reads(Arc::new(Unavailable)));
        let scope = scope(Role::Admin);
        let decision = RoutingDecision {
            classified: Intent::SimpleQuery,
            intent: Intent::SimpleQuery,
            source: ClassificationSource::Heuristic,
            required: Some(Operation::Write),
            overridden: false,
        };
        let ctx = context("DROP TABLE users", &scope, &[], &decision);

        let results = handler.handle(&ctx).await.unwrap();
        assert_eq!(results, vec![PartialResult::Text(WRITE_NOT_SUPPORTED.to_string())]);
    }

    #[tokio::test]
    async fn test_viewer_denied_products() {
        let handler = SimpleQueryHandler::new(reads(Arc::new(Unavailable)));
        let scope = scope(Role::Viewer);
        let decision = decision(Intent::SimpleQuery);
        let ctx = context("List all products", &scope, &[], &decision);

        let err = handler.handle(&ctx).await.unwrap_err();
        assert!(matches!(err, ChatError::AccessDenied(_)));
    }
}
