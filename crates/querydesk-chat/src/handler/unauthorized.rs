//! Denials. Always succeeds, and never names a table or column.

use async_trait::async_trait;

use querydesk_core::types::{Operation, Role};

use crate::error::ChatError;
use crate::handler::{HandlerContext, QueryHandler};
use crate::types::{Intent, PartialResult};

/// Handler for `unauthorized`.
pub struct UnauthorizedHandler;

#[async_trait]
impl QueryHandler for UnauthorizedHandler {
    fn intent(&self) -> Intent {
        Intent::Unauthorized
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<Vec<PartialResult>, ChatError> {
        Ok(vec![PartialResult::Text(denial_message(
            ctx.role(),
            ctx.decision.required,
        ))])
    }
}

/// Role-aware denial text for a request needing `required`.
pub fn denial_message(role: Role, required: Option<Operation>) -> String {
    let reason = match required {
        Some(Operation::Write) => {
            "I'm not able to make changes to data for you.".to_string()
        }
        Some(Operation::Visualize) => {
            "Charts and visualizations are not available for your role.".to_string()
        }
        _ => "I don't have permission to access that information for you.".to_string(),
    };
    format!("{} {}", reason, role_hint(role))
}

fn role_hint(role: Role) -> &'static str {
    match role {
        Role::Viewer => "As a viewer you can look at basic user and order information.",
        Role::Readonly => "Your read-only role covers users, orders, products and categories.",
        Role::Analyst => "Your analyst role can read and chart data but cannot change it.",
        Role::Admin => "Please contact your database administrator if you need this.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::*;
    use crate::router::{ClassificationSource, RoutingDecision};

    async fn deny(role: Role, required: Option<Operation>) -> String {
        let scope = scope(role);
        let decision = RoutingDecision {
            classified: Intent::SimpleQuery,
            intent: Intent::Unauthorized,
            source: ClassificationSource::Heuristic,
            required,
            overridden: true,
        };
        let ctx = context("DROP TABLE users", &scope, &[], &decision);
        match UnauthorizedHandler.handle(&ctx).await.unwrap().remove(0) {
            PartialResult::Text(text) => text,
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_denial_for_viewer() {
        let text = deny(Role::Viewer, Some(Operation::Write)).await;
        assert!(text.starts_with("I'm not able to make changes"));
        assert!(text.contains("viewer"));
    }

    #[tokio::test]
    async fn test_read_denial_default_text() {
        let text = deny(Role::Readonly, Some(Operation::Read)).await;
        assert!(text.starts_with("I don't have permission to access that information for you."));
    }

    #[tokio::test]
    async fn test_visualize_denial() {
        let text = deny(Role::Viewer, Some(Operation::Visualize)).await;
        assert!(text.starts_with("Charts and visualizations are not available"));
    }

    #[test]
    fn test_denials_never_name_restricted_objects() {
        for role in Role::ALL {
            for op in [None, Some(Operation::Read), Some(Operation::Write), Some(Operation::Visualize)] {
                let text = denial_message(role, op).to_lowercase();
                for restricted in ["sales", "analytics", "city", "age", "price", "drop table"] {
                    assert!(!text.contains(restricted), "{} leaks {}", text, restricted);
                }
            }
        }
    }
}
