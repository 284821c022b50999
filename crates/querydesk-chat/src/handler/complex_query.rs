//! Joins and aggregations.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::ChatError;
use crate::handler::{HandlerContext, QueryHandler, ReadPath, ReadShape};
use crate::types::{Intent, PartialResult};

/// Handler for `complex_query`.
pub struct ComplexQueryHandler {
    reads: Arc<ReadPath>,
}

impl ComplexQueryHandler {
    pub fn new(reads: Arc<ReadPath>) -> Self {
        Self { reads }
    }
}

#[async_trait]
impl QueryHandler for ComplexQueryHandler {
    fn intent(&self) -> Intent {
        Intent::ComplexQuery
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<Vec<PartialResult>, ChatError> {
        let outcome = self.reads.read(ctx, ReadShape::Multi).await?;
        info!(
            user_id = ctx.user_id,
            rows = outcome.table.row_count,
            "Complex query answered"
        );
        Ok(vec![PartialResult::Table(outcome.table)])
    }
}
