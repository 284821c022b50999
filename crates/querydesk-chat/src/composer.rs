//! Response composer: merges partial results into one reply and records the
//! exchange in history.

use std::sync::Arc;

use tracing::{debug, warn};

use querydesk_core::types::{Role, TableData};

use crate::history::HistoryStore;
use crate::types::{
    ChartResult, HistoryEntry, InteractionType, PartialResult, Reply, ReplyData,
};

/// Longest response summary kept in history.
pub const SUMMARY_MAX_CHARS: usize = 200;

pub struct ResponseComposer {
    history: Arc<HistoryStore>,
    history_limit: usize,
}

impl ResponseComposer {
    pub fn new(history: Arc<HistoryStore>, history_limit: usize) -> Self {
        Self {
            history,
            history_limit,
        }
    }

    /// Merge `parts` (text, then table, then chart), append a history
    /// entry, and return the reply with the user's recent history. Only the
    /// first table and the first chart are kept.
    pub fn compose(
        &self,
        parts: Vec<PartialResult>,
        user_id: &str,
        role: Role,
        query: &str,
        interaction: InteractionType,
    ) -> Reply {
        let mut texts = Vec::new();
        let mut table: Option<TableData> = None;
        let mut chart: Option<ChartResult> = None;

        for part in parts {
            match part {
                PartialResult::Text(text) if !text.trim().is_empty() => texts.push(text),
                PartialResult::Text(_) => {}
                PartialResult::Table(t) => {
                    if table.is_some() {
                        warn!(user_id, rows = t.row_count, "Dropping extra table result");
                    } else {
                        table = Some(t);
                    }
                }
                PartialResult::Chart(c) => {
                    if chart.is_some() {
                        warn!(user_id, chart_type = c.chart_type.as_str(), "Dropping extra chart result");
                    } else {
                        chart = Some(c);
                    }
                }
            }
        }

        let message = if texts.is_empty() {
            derived_message(table.as_ref(), chart.as_ref())
        } else {
            texts.join("\n\n")
        };

        let summary = summarize(&message, table.as_ref());
        let stored = self
            .history
            .append(user_id, HistoryEntry::new(role, query, summary, interaction));
        debug!(user_id, stored, interaction = interaction.as_str(), "Recorded exchange");

        let data = (table.is_some() || chart.is_some()).then_some(ReplyData { table, chart });

        Reply {
            message,
            data,
            history: self.history.get(user_id, self.history_limit),
        }
    }
}

/// Text for replies whose handler produced only data.
fn derived_message(table: Option<&TableData>, chart: Option<&ChartResult>) -> String {
    match (table, chart) {
        (Some(t), _) if t.is_empty() => "No matching records found.".to_string(),
        (Some(t), Some(c)) => format!(
            "Here is a {} chart of {} {}.",
            c.chart_type,
            t.row_count,
            plural(t.row_count, "row", "rows")
        ),
        (Some(t), None) => format!(
            "Found {} {}.",
            t.row_count,
            plural(t.row_count, "result", "results")
        ),
        (None, Some(c)) => format!("Here is a {} chart.", c.chart_type),
        (None, None) => "I couldn't find anything to show for that.".to_string(),
    }
}

/// Short history summary: the message, plus the row count when a table
/// came back, cut to [`SUMMARY_MAX_CHARS`] characters.
fn summarize(message: &str, table: Option<&TableData>) -> String {
    let mut summary = message.replace('\n', " ");
    if let Some(t) = table {
        if !summary.contains(&t.row_count.to_string()) {
            summary = format!("{} ({} rows)", summary, t.row_count);
        }
    }
    truncate_chars(&summary, SUMMARY_MAX_CHARS)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChartType;
    use serde_json::json;

    fn composer() -> (ResponseComposer, Arc<HistoryStore>) {
        let history = Arc::new(HistoryStore::new());
        (ResponseComposer::new(Arc::clone(&history), 10), history)
    }

    fn users_table() -> TableData {
        TableData::new(
            vec!["id".to_string(), "name".to_string()],
            vec![vec![json!(1), json!("Alice")], vec![json!(2), json!("Bob")]],
        )
    }

    fn bar_chart() -> ChartResult {
        ChartResult {
            chart_type: ChartType::Bar,
            x: vec![json!("Alice"), json!("Bob")],
            y: vec![1.0, 2.0],
            label: "id by name".to_string(),
            x_label: None,
            y_label: None,
        }
    }

    #[test]
    fn test_text_only_reply() {
        let (composer, history) = composer();
        let reply = composer.compose(
            vec![PartialResult::Text("Hello!".to_string())],
            "u1",
            Role::Viewer,
            "hi",
            InteractionType::ChitChat,
        );
        assert_eq!(reply.message, "Hello!");
        assert!(reply.data.is_none());
        assert_eq!(reply.history.len(), 1);
        assert_eq!(history.len("u1"), 1);
        assert_eq!(reply.history[0].response_summary, "Hello!");
    }

    #[test]
    fn test_derives_text_for_table() {
        let (composer, _) = composer();
        let reply = composer.compose(
            vec![PartialResult::Table(users_table())],
            "u1",
            Role::Analyst,
            "Show me all users",
            InteractionType::SimpleQuery,
        );
        assert_eq!(reply.message, "Found 2 results.");
        let data = reply.data.unwrap();
        assert_eq!(data.table.unwrap().row_count, 2);
        assert!(data.chart.is_none());
    }

    #[test]
    fn test_merges_all_parts_regardless_of_order() {
        let (composer, _) = composer();
        let reply = composer.compose(
            vec![
                PartialResult::Chart(bar_chart()),
                PartialResult::Table(users_table()),
                PartialResult::Text("Radar charts are not supported.".to_string()),
            ],
            "u1",
            Role::Analyst,
            "radar chart of users",
            InteractionType::Visualize,
        );
        assert_eq!(reply.message, "Radar charts are not supported.");
        let data = reply.data.unwrap();
        assert!(data.table.is_some());
        assert_eq!(data.chart.unwrap().chart_type, ChartType::Bar);
    }

    #[test]
    fn test_empty_table_message() {
        let (composer, _) = composer();
        let reply = composer.compose(
            vec![PartialResult::Table(TableData::default())],
            "u1",
            Role::Readonly,
            "users from Atlantis",
            InteractionType::SimpleQuery,
        );
        assert_eq!(reply.message, "No matching records found.");
    }

    #[test]
    fn test_chart_message() {
        let (composer, _) = composer();
        let reply = composer.compose(
            vec![PartialResult::Table(users_table()), PartialResult::Chart(bar_chart())],
            "u1",
            Role::Analyst,
            "bar chart",
            InteractionType::Visualize,
        );
        assert_eq!(reply.message, "Here is a bar chart of 2 rows.");
    }

    #[test]
    fn test_summary_is_capped() {
        let (composer, history) = composer();
        let long = "word ".repeat(100);
        composer.compose(
            vec![PartialResult::Text(long)],
            "u1",
            Role::Viewer,
            "tell me something long",
            InteractionType::ChitChat,
        );
        let entry = &history.get("u1", 1)[0];
        assert_eq!(entry.response_summary.chars().count(), SUMMARY_MAX_CHARS);
        assert!(entry.response_summary.ends_with("..."));
    }

    #[test]
    fn test_reply_history_is_limited() {
        let history = Arc::new(HistoryStore::new());
        let composer = ResponseComposer::new(Arc::clone(&history), 3);
        let mut last = None;
        for i in 0..5 {
            last = Some(composer.compose(
                vec![PartialResult::Text(format!("reply {}", i))],
                "u1",
                Role::Viewer,
                &format!("query {}", i),
                InteractionType::ChitChat,
            ));
        }
        let reply = last.unwrap();
        assert_eq!(reply.history.len(), 3);
        assert_eq!(reply.history[2].query, "query 4");
    }

    #[test]
    fn test_first_table_and_chart_win() {
        let (composer, _) = composer();
        let mut pie = bar_chart();
        pie.chart_type = ChartType::Pie;
        let reply = composer.compose(
            vec![
                PartialResult::Table(users_table()),
                PartialResult::Chart(bar_chart()),
                PartialResult::Table(TableData::default()),
                PartialResult::Chart(pie),
            ],
            "u1",
            Role::Analyst,
            "chart of users",
            InteractionType::Visualize,
        );
        let data = reply.data.unwrap();
        assert_eq!(data.table.unwrap().row_count, 2);
        assert_eq!(data.chart.unwrap().chart_type, ChartType::Bar);
        assert_eq!(reply.message, "Here is a bar chart of 2 rows.");
    }

    #[test]
    fn test_summary_mentions_row_count() {
        assert_eq!(
            summarize("Here you go.", Some(&users_table())),
            "Here you go. (2 rows)"
        );
        assert_eq!(summarize("Found 2 results.", Some(&users_table())), "Found 2 results.");
    }
}
