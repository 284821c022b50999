//! Intent router.
//!
//! A keyword pre-pass classifies most queries without any external call.
//! Anything it cannot place goes to the external classifier under a
//! timeout, falling back to `simple_query`. The chosen intent is then
//! re-checked against the caller's scope and replaced by `unauthorized`
//! when the scope lacks the operation the intent needs.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use querydesk_core::types::{Operation, Role};

use crate::access::{AccessPolicy, AccessScope};
use crate::collaborator::{with_timeout, IntentClassifier};
use crate::templates::singular;
use crate::types::Intent;

// =============================================================================
// Compiled regex sets (compiled once, reused across calls)
// =============================================================================

struct IntentPatterns {
    write: Vec<Regex>,
    visualize: Vec<Regex>,
    complex: Vec<Regex>,
    chit_chat: Vec<Regex>,
    data: Vec<Regex>,
}

static INTENT_PATTERNS: LazyLock<IntentPatterns> = LazyLock::new(|| {
    let mk = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(p).expect("Invalid intent regex"))
            .collect()
    };

    IntentPatterns {
        // Checked first: a modification request is never small talk or a chart.
        write: mk(&[
            r"(?i)\b(?:drop|delete|truncate|insert|alter)\b",
            r"(?i)\bupdate\s+(?:the\s+)?\w+\s+set\b",
            r"(?i)\bupdate\s+(?:all\s+)?(?:the\s+)?(?:users?|orders?|products?|categor(?:y|ies)|sales|analytics)\b",
            r"(?i)\bcreate\s+(?:a\s+)?(?:new\s+)?(?:table|index|view|user|record)\b",
            r"(?i)\b(?:remove|erase|wipe)\s+(?:all\s+)?(?:the\s+)?\w+",
            r"(?i)\b(?:modify|change|rename)\s+(?:the\s+)?(?:table|column|schema)\b",
        ]),
        visualize: mk(&[
            r"(?i)\b(?:chart|charts|plot|graph|graphs|diagram)\b",
            r"(?i)\bvisuali[sz](?:e|ation)\b",
            r"(?i)\b(?:histogram|pie|scatter)\b",
            r"(?i)\bdraw\b",
        ]),
        complex: mk(&[
            r"(?i)\bjoin(?:ed|s)?\b",
            r"(?i)\bgroup(?:ed)?\s+by\b",
            r"(?i)\b(?:aggregate|breakdown|broken\s+down|compare|comparison|trend)\b",
            r"(?i)\b(?:sum|total|average|avg|mean|revenue)\b",
            r"(?i)\btop\s+customers\b",
            r"(?i)\bwith\s+(?:their|the)\b",
            r"(?i)\b(?:by|per)\s+(?:city|category|status|region|quarter|product|user|customer|month|date|metric)\b",
        ]),
        chit_chat: mk(&[
            r"(?i)^\s*(?:hi|hello|hey|howdy|greetings|good\s+(?:morning|afternoon|evening))\b",
            r"(?i)\bhow\s+are\s+you\b",
            r"(?i)\b(?:thanks|thank\s+you|cheers)\b",
            r"(?i)\bmy\s+name\s+is\b",
            r"(?i)\b(?:i\s+am|i'm|call\s+me)\s+[A-Za-z]+\s*[.!]?\s*$",
            r"(?i)\bwhat(?:'s|\s+is)\s+my\s+name\b",
            r"(?i)\bwho\s+am\s+i\b",
            r"(?i)\bwho\s+are\s+you\b",
            r"(?i)\bwhat\s+can\s+you\s+do\b",
            r"(?i)^\s*help\b",
            r"(?i)\b(?:bye|goodbye|see\s+you)\b",
        ]),
        data: mk(&[
            r"(?i)\b(?:show|list|get|find|display|fetch|select|retrieve|give\s+me|how\s+many|count)\b",
            r"(?i)\b(?:records?|rows?|data|table|tables|entries)\b",
            r"(?i)\b(?:customers?|people)\b",
        ]),
    }
});

/// Orders and sorts are not groupings.
static SORT_BY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:order(?:ed)?|sort(?:ed)?)\s+by\b").expect("Invalid sort regex"));

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|re| re.is_match(text))
}

// =============================================================================
// Decision
// =============================================================================

/// Where the classified intent came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Heuristic,
    External,
    Fallback,
}

/// Outcome of routing one query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    /// Intent before the scope check.
    pub classified: Intent,
    /// Intent after the scope check.
    pub intent: Intent,
    pub source: ClassificationSource,
    /// Operation the query needs; `Write` for modification requests.
    pub required: Option<Operation>,
    pub overridden: bool,
}

impl RoutingDecision {
    pub fn wants_write(&self) -> bool {
        self.required == Some(Operation::Write)
    }
}

// =============================================================================
// Router
// =============================================================================

pub struct IntentRouter {
    classifier: Arc<dyn IntentClassifier>,
    classify_timeout: Duration,
    /// Table names and their singular forms, lowercase.
    table_words: Vec<String>,
}

impl IntentRouter {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        classify_timeout: Duration,
        tables: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut table_words = Vec::new();
        for table in tables {
            let table = table.to_lowercase();
            let one = singular(&table);
            if one != table {
                table_words.push(one);
            }
            table_words.push(table);
        }
        Self {
            classifier,
            classify_timeout,
            table_words,
        }
    }

    /// Keyword pre-pass. Returns the intent and any operation stronger than
    /// the intent's default, or `None` when nothing matched.
    pub fn pre_classify(&self, query: &str) -> Option<(Intent, Option<Operation>)> {
        let p = &*INTENT_PATTERNS;

        if any_match(&p.write, query) {
            return Some((Intent::SimpleQuery, Some(Operation::Write)));
        }
        if any_match(&p.visualize, query) {
            return Some((Intent::Visualize, None));
        }
        if any_match(&p.complex, query) && !self.is_only_sorting(query) {
            return Some((Intent::ComplexQuery, None));
        }

        let has_data = any_match(&p.data, query) || self.mentions_table(query);
        if any_match(&p.chit_chat, query) && !has_data {
            return Some((Intent::ChitChat, None));
        }
        if has_data {
            return Some((Intent::SimpleQuery, None));
        }
        None
    }

    /// Classify and re-check against `scope`.
    pub async fn route(&self, query: &str, scope: &AccessScope) -> RoutingDecision {
        let (classified, required, source) = match self.pre_classify(query) {
            Some((intent, required)) => (intent, required, ClassificationSource::Heuristic),
            None => {
                let call = self.classifier.classify(query);
                match with_timeout("intent classification", self.classify_timeout, call).await {
                    Ok(intent) => (intent, None, ClassificationSource::External),
                    Err(e) => {
                        warn!(error = %e, "Intent classification failed, falling back to simple_query");
                        (Intent::SimpleQuery, None, ClassificationSource::Fallback)
                    }
                }
            }
        };

        let needed = required.or(classified.required_operation());
        let overridden = needed.is_some_and(|op| !scope.allows(op));
        let intent = if overridden {
            Intent::Unauthorized
        } else {
            classified
        };

        debug!(
            role = %scope.role,
            classified = %classified,
            intent = %intent,
            ?source,
            overridden,
            "Routed query"
        );

        RoutingDecision {
            classified,
            intent,
            source,
            required: needed,
            overridden,
        }
    }

    /// Classify for `role`, returning only the final intent.
    pub async fn classify(&self, query: &str, role: Role) -> Intent {
        let scope = AccessPolicy.scope_for(role);
        self.route(query, &scope).await.intent
    }

    fn mentions_table(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        lower
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .any(|w| self.table_words.iter().any(|t| t == w))
    }

    /// True when the only complex signal is an ORDER BY / SORT BY phrase.
    fn is_only_sorting(&self, query: &str) -> bool {
        if !SORT_BY_RE.is_match(query) {
            return false;
        }
        let stripped = SORT_BY_RE.replace_all(query, " ");
        !any_match(&INTENT_PATTERNS.complex, &stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::testing::{FixedIntent, Stalled};
    use crate::collaborator::Unavailable;

    const TABLES: [&str; 6] = ["users", "orders", "products", "categories", "sales", "analytics"];

    fn router_with(classifier: Arc<dyn IntentClassifier>) -> IntentRouter {
        IntentRouter::new(
            classifier,
            Duration::from_millis(50),
            TABLES.iter().map(|t| t.to_string()),
        )
    }

    fn router() -> IntentRouter {
        router_with(Arc::new(Unavailable))
    }

    fn pre(q: &str) -> Option<Intent> {
        router().pre_classify(q).map(|(i, _)| i)
    }

    // ---- Pre-pass ----

    #[test]
    fn test_write_keywords_require_write() {
        let r = router();
        assert_eq!(
            r.pre_classify("DROP TABLE users"),
            Some((Intent::SimpleQuery, Some(Operation::Write)))
        );
        assert_eq!(
            r.pre_classify("please delete all orders"),
            Some((Intent::SimpleQuery, Some(Operation::Write)))
        );
        assert_eq!(
            r.pre_classify("update users set city = 'Boston'"),
            Some((Intent::SimpleQuery, Some(Operation::Write)))
        );
    }

    #[test]
    fn test_create_chart_is_not_a_write() {
        assert_eq!(pre("Create a bar chart of users by city"), Some(Intent::Visualize));
    }

    #[test]
    fn test_visualize_keywords() {
        assert_eq!(pre("plot revenue over time"), Some(Intent::Visualize));
        assert_eq!(pre("visualize orders by status"), Some(Intent::Visualize));
        assert_eq!(pre("give me a pie of categories"), Some(Intent::Visualize));
    }

    #[test]
    fn test_complex_keywords() {
        assert_eq!(pre("total revenue by city"), Some(Intent::ComplexQuery));
        assert_eq!(pre("show orders with their users"), Some(Intent::ComplexQuery));
        assert_eq!(pre("who are the top customers"), Some(Intent::ComplexQuery));
        assert_eq!(pre("users grouped by city"), Some(Intent::ComplexQuery));
    }

    #[test]
    fn test_sort_by_is_not_complex() {
        assert_eq!(pre("list users sorted by city"), Some(Intent::SimpleQuery));
    }

    #[test]
    fn test_chit_chat() {
        assert_eq!(pre("Hello!"), Some(Intent::ChitChat));
        assert_eq!(pre("how are you today?"), Some(Intent::ChitChat));
        assert_eq!(pre("My name is Priya"), Some(Intent::ChitChat));
        assert_eq!(pre("What is my name?"), Some(Intent::ChitChat));
        assert_eq!(pre("thanks a lot"), Some(Intent::ChitChat));
    }

    #[test]
    fn test_greeting_with_data_request_is_simple() {
        assert_eq!(pre("hi, show me all users"), Some(Intent::SimpleQuery));
    }

    #[test]
    fn test_data_keywords_and_table_names() {
        assert_eq!(pre("Show me all users"), Some(Intent::SimpleQuery));
        assert_eq!(pre("products in stock?"), Some(Intent::SimpleQuery));
        assert_eq!(pre("every order placed"), Some(Intent::SimpleQuery));
    }

    #[test]
    fn test_unmatched_returns_none() {
        assert_eq!(pre("what's the weather like"), None);
    }

    // ---- Route ----

    #[tokio::test]
    async fn test_route_heuristic_source() {
        let scope = AccessPolicy.scope_for(Role::Analyst);
        let d = router().route("Show me all users", &scope).await;
        assert_eq!(d.intent, Intent::SimpleQuery);
        assert_eq!(d.source, ClassificationSource::Heuristic);
        assert!(!d.overridden);
    }

    #[tokio::test]
    async fn test_viewer_drop_is_unauthorized() {
        let scope = AccessPolicy.scope_for(Role::Viewer);
        let d = router().route("DROP TABLE users", &scope).await;
        assert_eq!(d.classified, Intent::SimpleQuery);
        assert_eq!(d.intent, Intent::Unauthorized);
        assert!(d.overridden);
        assert!(d.wants_write());
    }

    #[tokio::test]
    async fn test_admin_write_passes_router() {
        let scope = AccessPolicy.scope_for(Role::Admin);
        let d = router().route("delete all orders", &scope).await;
        assert_eq!(d.intent, Intent::SimpleQuery);
        assert!(d.wants_write());
        assert!(!d.overridden);
    }

    #[tokio::test]
    async fn test_visualize_without_permission_is_unauthorized() {
        for role in [Role::Viewer, Role::Readonly] {
            let scope = AccessPolicy.scope_for(role);
            let d = router().route("plot users by city", &scope).await;
            assert_eq!(d.intent, Intent::Unauthorized, "role {}", role);
        }
        let scope = AccessPolicy.scope_for(Role::Analyst);
        let d = router().route("plot users by city", &scope).await;
        assert_eq!(d.intent, Intent::Visualize);
    }

    #[tokio::test]
    async fn test_external_classifier_used_when_prepass_silent() {
        let r = router_with(Arc::new(FixedIntent(Intent::ChitChat)));
        let scope = AccessPolicy.scope_for(Role::Viewer);
        let d = r.route("what's the weather like", &scope).await;
        assert_eq!(d.intent, Intent::ChitChat);
        assert_eq!(d.source, ClassificationSource::External);
    }

    #[tokio::test]
    async fn test_external_classification_is_rechecked() {
        let r = router_with(Arc::new(FixedIntent(Intent::Visualize)));
        let scope = AccessPolicy.scope_for(Role::Readonly);
        let d = r.route("something vague", &scope).await;
        assert_eq!(d.classified, Intent::Visualize);
        assert_eq!(d.intent, Intent::Unauthorized);
    }

    #[tokio::test]
    async fn test_classifier_failure_falls_back_to_simple() {
        let scope = AccessPolicy.scope_for(Role::Readonly);
        let d = router().route("something vague", &scope).await;
        assert_eq!(d.intent, Intent::SimpleQuery);
        assert_eq!(d.source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn test_classifier_timeout_falls_back_to_simple() {
        let r = router_with(Arc::new(Stalled));
        let scope = AccessPolicy.scope_for(Role::Readonly);
        let d = r.route("something vague", &scope).await;
        assert_eq!(d.intent, Intent::SimpleQuery);
        assert_eq!(d.source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn test_classify_by_role() {
        assert_eq!(router().classify("DROP TABLE users", Role::Viewer).await, Intent::Unauthorized);
        assert_eq!(router().classify("hello", Role::Viewer).await, Intent::ChitChat);
    }
}
