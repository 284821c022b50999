//! Small talk, name recall, and help text. Never touches the database.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use querydesk_core::types::Operation;

use crate::error::ChatError;
use crate::handler::{HandlerContext, QueryHandler};
use crate::types::{HistoryEntry, Intent, PartialResult};

static NAME_STATEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:my name is|my name's|call me)\s+([a-z][a-z'\-]*)")
        .expect("Invalid name statement regex")
});

static INTRODUCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:i am|i'm)\s+([a-z][a-z'\-]*)\s*[.!]?\s*$")
        .expect("Invalid introduction regex")
});

static NAME_QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(what(?:'s| is) my name|do you (?:remember|know) my name|who am i)\b")
        .expect("Invalid name question regex")
});

static RECALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwhat (?:did|have) we (?:talk(?:ed)? about|discuss(?:ed)?)\b")
        .expect("Invalid recall regex")
});

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(hello|hi|hey|greetings|good (?:morning|afternoon|evening))\b")
        .expect("Invalid greeting regex")
});

static WELLBEING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bhow (?:are you|is it going|are things)\b").expect("Invalid wellbeing regex")
});

static THANKS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(thanks|thank you|cheers|appreciate it)\b").expect("Invalid thanks regex")
});

static FAREWELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bye|goodbye|see you|farewell)\b").expect("Invalid farewell regex")
});

static HELP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(help|what can you do|what can i ask)\b").expect("Invalid help regex")
});

/// Handler for `chit_chat`.
pub struct ConversationHandler;

#[async_trait]
impl QueryHandler for ConversationHandler {
    fn intent(&self) -> Intent {
        Intent::ChitChat
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<Vec<PartialResult>, ChatError> {
        Ok(vec![PartialResult::Text(reply_to(ctx))])
    }
}

fn reply_to(ctx: &HandlerContext<'_>) -> String {
    let query = ctx.query;

    if let Some(name) = stated_name(query) {
        return format!(
            "Nice to meet you, {}! I'll remember that. What would you like to know about your data?",
            name
        );
    }
    if NAME_QUESTION_RE.is_match(query) {
        return match recalled_name(ctx.history) {
            Some(name) => format!("Your name is {}.", name),
            None => "I don't know your name yet. You can tell me by saying \"My name is ...\"."
                .to_string(),
        };
    }
    if RECALL_RE.is_match(query) {
        return recap(ctx.history);
    }
    if HELP_RE.is_match(query) {
        return capabilities(ctx);
    }
    if THANKS_RE.is_match(query) {
        return "You're welcome! Let me know if there's anything else you'd like to look up."
            .to_string();
    }
    if FAREWELL_RE.is_match(query) {
        return "Goodbye! Come back any time you need to look something up.".to_string();
    }
    if WELLBEING_RE.is_match(query) {
        return "I'm doing well, thanks for asking! What would you like to explore today?"
            .to_string();
    }
    if GREETING_RE.is_match(query) {
        return match recalled_name(ctx.history) {
            Some(name) => format!("Hello again, {}! How can I help you with your data?", name),
            None => "Hello! I can help you explore your data. Try asking \"Show me all users\"."
                .to_string(),
        };
    }

    "I'm here to help you query your data. Try something like \"Show me all users\" or ask for help to see what you can do.".to_string()
}

fn stated_name(text: &str) -> Option<String> {
    NAME_STATEMENT_RE
        .captures(text)
        .or_else(|| INTRODUCTION_RE.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| capitalize(m.as_str()))
}

/// Most recently stated name in the history.
fn recalled_name(history: &[HistoryEntry]) -> Option<String> {
    history
        .iter()
        .rev()
        .filter(|entry| !entry.is_summary())
        .find_map(|entry| stated_name(&entry.query))
}

fn recap(history: &[HistoryEntry]) -> String {
    let mut parts = Vec::new();
    if let Some(digest) = history.iter().find_map(|e| e.digest.as_ref()) {
        if !digest.key_topics.is_empty() {
            parts.push(format!("Earlier we covered {}.", digest.key_topics.join(", ")));
        }
    }
    let recent: Vec<String> = history
        .iter()
        .rev()
        .filter(|e| !e.is_summary())
        .take(3)
        .map(|e| format!("\"{}\"", e.query))
        .collect();
    if !recent.is_empty() {
        parts.push(format!("Most recently you asked {}.", recent.join(", ")));
    }

    if parts.is_empty() {
        "We haven't talked about anything yet.".to_string()
    } else {
        parts.join(" ")
    }
}

/// Help text built from the caller's scope.
fn capabilities(ctx: &HandlerContext<'_>) -> String {
    let scope = ctx.scope;
    let tables: Vec<&str> = scope.table_names().collect();
    let mut text = format!(
        "With the {} role you can ask questions about {}.",
        ctx.role(),
        tables.join(", ")
    );
    if scope.allows(Operation::Visualize) {
        text.push_str(" You can also ask for charts, for example \"Create a bar chart of users by city\".");
    }
    text.push_str(" Try \"Show me all users\" to get started.");
    text
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
