//! Chart requests: run the grouped read, then attach a chart.
//!
//! The chart collaborator is asked first. When it fails, times out, or
//! returns a chart that does not fit the gated table, the chart is derived
//! from the table: labels from the first column, values from the first
//! numeric column after it.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use querydesk_core::types::TableData;

use crate::collaborator::{with_timeout, ChartGenerator};
use crate::error::ChatError;
use crate::handler::{HandlerContext, QueryHandler, ReadPath, ReadShape};
use crate::types::{ChartResult, ChartType, Intent, PartialResult};

static CHART_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([a-z]+)\s+(?:chart|graph|plot|diagram)\b").expect("Invalid chart name regex")
});

static STANDALONE_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(histogram|scatter|pie)\b").expect("Invalid chart type regex")
});

static DATE_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}(?:-\d{2})?(?:[ T]\d{2}:\d{2}(?::\d{2})?)?$").expect("Invalid date regex")
});

/// Words before "chart" that are not chart types.
const NON_TYPE_WORDS: &[&str] = &["a", "an", "the", "this", "that", "my", "simple", "nice", "new"];

/// Header fragments that mark a time axis.
const TIME_HEADERS: &[&str] = &["date", "time", "month", "year", "day", "quarter", "created_at"];

/// What the query asked for, if anything.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Requested {
    Supported(ChartType),
    Unsupported(String),
    Unspecified,
}

/// Handler for `visualize`.
pub struct VisualizationHandler {
    reads: Arc<ReadPath>,
    charts: Arc<dyn ChartGenerator>,
    chart_timeout: Duration,
}

impl VisualizationHandler {
    pub fn new(reads: Arc<ReadPath>, charts: Arc<dyn ChartGenerator>, chart_timeout: Duration) -> Self {
        Self {
            reads,
            charts,
            chart_timeout,
        }
    }
}

#[async_trait]
impl QueryHandler for VisualizationHandler {
    fn intent(&self) -> Intent {
        Intent::Visualize
    }

    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<Vec<PartialResult>, ChatError> {
        let table = self.reads.read(ctx, ReadShape::Multi).await?.table;

        if table.is_empty() {
            return Ok(vec![
                PartialResult::Text("There is no data to chart for that request.".to_string()),
                PartialResult::Table(table),
            ]);
        }

        let requested = requested_chart(ctx.query);
        let chart_type = match &requested {
            Requested::Supported(t) => *t,
            Requested::Unsupported(_) => ChartType::Bar,
            Requested::Unspecified => default_chart_type(&table),
        };

        let chart = match with_timeout(
            "chart generation",
            self.chart_timeout,
            self.charts.generate(ctx.query, &table),
        )
        .await
        {
            Ok(chart) => match check_chart(&chart, &table) {
                Ok(()) => Some(chart),
                Err(reason) => {
                    warn!(%reason, "Discarding generated chart, deriving chart from table");
                    derive_chart(&table, chart_type)
                }
            },
            Err(e) => {
                warn!(error = %e, "Chart generation failed, deriving chart from table");
                derive_chart(&table, chart_type)
            }
        };
        let chart = chart.map(|mut chart| {
            if !matches!(requested, Requested::Unspecified) {
                chart.chart_type = chart_type;
            }
            chart
        });

        let mut results = Vec::new();
        match (&requested, &chart) {
            (Requested::Unsupported(name), Some(chart)) => results.push(PartialResult::Text(format!(
                "{} charts are not supported, so here is a {} chart instead.",
                capitalize(name),
                chart.chart_type
            ))),
            (_, None) => results.push(PartialResult::Text(
                "I found the data but could not chart it. A chart needs a label column and a numeric column."
                    .to_string(),
            )),
            _ => {}
        }

        info!(
            user_id = ctx.user_id,
            rows = table.row_count,
            chart_type = chart.as_ref().map(|c| c.chart_type.as_str()),
            "Visualization answered"
        );

        results.push(PartialResult::Table(table));
        if let Some(chart) = chart {
            results.push(PartialResult::Chart(chart));
        }
        Ok(results)
    }
}

fn requested_chart(query: &str) -> Requested {
    for caps in CHART_NAME_RE.captures_iter(query) {
        let Some(word) = caps.get(1).map(|m| m.as_str().to_lowercase()) else {
            continue;
        };
        if NON_TYPE_WORDS.contains(&word.as_str()) {
            continue;
        }
        return match ChartType::from_name(&word) {
            Some(t) => Requested::Supported(t),
            None => Requested::Unsupported(word),
        };
    }
    STANDALONE_TYPE_RE
        .captures(query)
        .and_then(|c| c.get(1))
        .and_then(|m| ChartType::from_name(m.as_str()))
        .map_or(Requested::Unspecified, Requested::Supported)
}

/// `line` for a time-like first column, `bar` otherwise.
fn default_chart_type(table: &TableData) -> ChartType {
    let header = table
        .headers
        .first()
        .map(|h| h.to_lowercase())
        .unwrap_or_default();
    let time_header = TIME_HEADERS.iter().any(|t| header.contains(t));
    let time_values = !table.rows.is_empty()
        && table
            .rows
            .iter()
            .all(|row| row.first().and_then(Value::as_str).is_some_and(|s| DATE_VALUE_RE.is_match(s)));

    if time_header || time_values {
        ChartType::Line
    } else {
        ChartType::Bar
    }
}

/// A generated chart must plot exactly the gated rows and may only name
/// columns the table carries.
fn check_chart(chart: &ChartResult, table: &TableData) -> Result<(), String> {
    if chart.x.len() != table.row_count || chart.y.len() != table.row_count {
        return Err(format!(
            "series lengths x={} y={} do not match {} rows",
            chart.x.len(),
            chart.y.len(),
            table.row_count
        ));
    }
    if let Some(v) = chart.y.iter().find(|v| !v.is_finite()) {
        return Err(format!("non-finite value {} in series", v));
    }
    for label in [&chart.x_label, &chart.y_label].into_iter().flatten() {
        if !table.headers.iter().any(|h| h == label) {
            return Err(format!("axis label '{}' is not a result column", label));
        }
    }
    Ok(())
}

/// Build a chart from the first column and the first numeric column after it.
fn derive_chart(table: &TableData, chart_type: ChartType) -> Option<ChartResult> {
    if table.headers.len() < 2 {
        return None;
    }
    let value_col = (1..table.headers.len())
        .find(|&i| table.rows.iter().all(|row| row.get(i).and_then(as_number).is_some()))?;

    let x = table
        .rows
        .iter()
        .map(|row| row.first().cloned().unwrap_or(Value::Null))
        .collect();
    let y = table
        .rows
        .iter()
        .map(|row| row.get(value_col).and_then(as_number).unwrap_or(0.0))
        .collect();

    Some(ChartResult {
        chart_type,
        x,
        y,
        label: format!("{} by {}", table.headers[value_col], table.headers[0]),
        x_label: Some(table.headers[0].clone()),
        y_label: Some(table.headers[value_col].clone()),
    })
}

/// Numbers, numeric strings, and nulls (as zero) all count as numeric.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null => Some(0.0),
        _ => None,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::Unavailable;
    use crate::handler::test_support::*;
    use querydesk_core::types::Role;
    use serde_json::json;

    struct FixedChart;

    #[async_trait]
    impl ChartGenerator for FixedChart {
        async fn generate(&self, _q: &str, data: &TableData) -> Result<ChartResult, ChatError> {
            Ok(ChartResult {
                chart_type: ChartType::Pie,
                x: data.rows.iter().map(|r| r[0].clone()).collect(),
                y: vec![1.0; data.row_count],
                label: "scripted".to_string(),
                x_label: None,
                y_label: None,
            })
        }
    }

    /// Returns whatever chart it was built with, regardless of the data.
    struct CannedChart(ChartResult);

    #[async_trait]
    impl ChartGenerator for CannedChart {
        async fn generate(&self, _q: &str, _data: &TableData) -> Result<ChartResult, ChatError> {
            Ok(self.0.clone())
        }
    }

    fn canned(x: usize, y: usize, y_label: Option<&str>) -> ChartResult {
        ChartResult {
            chart_type: ChartType::Scatter,
            x: (0..x).map(|i| json!(i)).collect(),
            y: vec![1.0; y],
            label: "canned".to_string(),
            x_label: Some("city".to_string()),
            y_label: y_label.map(str::to_string),
        }
    }

    fn handler() -> VisualizationHandler {
        VisualizationHandler::new(
            reads(Arc::new(Unavailable)),
            Arc::new(Unavailable),
            Duration::from_millis(100),
        )
    }

    async fn run(handler: &VisualizationHandler, query: &str) -> Vec<PartialResult> {
        let scope = scope(Role::Analyst);
        let decision = decision(Intent::Visualize);
        let ctx = context(query, &scope, &[], &decision);
        handler.handle(&ctx).await.unwrap()
    }

    fn chart(results: &[PartialResult]) -> &ChartResult {
        results
            .iter()
            .find_map(|r| match r {
                PartialResult::Chart(c) => Some(c),
                _ => None,
            })
            .expect("chart result")
    }

    // ---- Requested types ----

    #[test]
    fn test_requested_chart_parsing() {
        assert_eq!(requested_chart("Create a bar chart of users"), Requested::Supported(ChartType::Bar));
        assert_eq!(requested_chart("pie chart of orders"), Requested::Supported(ChartType::Pie));
        assert_eq!(
            requested_chart("show a radar chart of sales"),
            Requested::Unsupported("radar".to_string())
        );
        assert_eq!(requested_chart("histogram of ages"), Requested::Supported(ChartType::Histogram));
        assert_eq!(requested_chart("Create a chart of users by city"), Requested::Unspecified);
    }

    #[test]
    fn test_default_chart_type() {
        let by_date = TableData::new(
            vec!["order_date".to_string(), "count".to_string()],
            vec![vec![json!("2024-01-05"), json!(2)]],
        );
        assert_eq!(default_chart_type(&by_date), ChartType::Line);

        let by_value = TableData::new(
            vec!["bucket".to_string(), "count".to_string()],
            vec![vec![json!("2024-01"), json!(2)], vec![json!("2024-02"), json!(3)]],
        );
        assert_eq!(default_chart_type(&by_value), ChartType::Line);

        let by_city = TableData::new(
            vec!["city".to_string(), "count".to_string()],
            vec![vec![json!("Boston"), json!(1)]],
        );
        assert_eq!(default_chart_type(&by_city), ChartType::Bar);
    }

    #[test]
    fn test_derive_chart_skips_non_numeric_columns() {
        let table = TableData::new(
            vec!["name".to_string(), "city".to_string(), "age".to_string()],
            vec![
                vec![json!("Alice"), json!("New York"), json!(34)],
                vec![json!("Bob"), json!("Los Angeles"), json!("28")],
            ],
        );
        let chart = derive_chart(&table, ChartType::Bar).unwrap();
        assert_eq!(chart.x, vec![json!("Alice"), json!("Bob")]);
        assert_eq!(chart.y, vec![34.0, 28.0]);
        assert_eq!(chart.y_label.as_deref(), Some("age"));
    }

    #[test]
    fn test_derive_chart_needs_two_columns() {
        let table = TableData::new(vec!["name".to_string()], vec![vec![json!("Alice")]]);
        assert!(derive_chart(&table, ChartType::Bar).is_none());
    }

    // ---- Handler ----

    #[tokio::test]
    async fn test_bar_chart_of_users_by_city() {
        let results = run(&handler(), "Create a bar chart of users by city").await;
        assert_eq!(results.len(), 2);
        let PartialResult::Table(table) = &results[0] else {
            panic!("expected table first");
        };
        assert_eq!(table.headers, vec!["city", "count"]);

        let chart = chart(&results);
        assert_eq!(chart.chart_type, ChartType::Bar);
        assert_eq!(chart.x.len(), table.row_count);
        assert_eq!(chart.y.iter().sum::<f64>(), 8.0);
    }

    #[tokio::test]
    async fn test_radar_falls_back_to_bar() {
        let results = run(&handler(), "Show a radar chart of users by city").await;
        assert_eq!(chart(&results).chart_type, ChartType::Bar);
        match &results[0] {
            PartialResult::Text(text) => assert!(text.starts_with("Radar charts are not supported")),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_collaborator_chart_used() {
        let handler = VisualizationHandler::new(
            reads(Arc::new(Unavailable)),
            Arc::new(FixedChart),
            Duration::from_millis(100),
        );
        let results = run(&handler, "Visualize users by city").await;
        let chart = chart(&results);
        assert_eq!(chart.label, "scripted");
        assert_eq!(chart.chart_type, ChartType::Pie);
    }

    #[test]
    fn test_check_chart() {
        let table = TableData::new(
            vec!["city".to_string(), "count".to_string()],
            vec![vec![json!("Boston"), json!(1)], vec![json!("Denver"), json!(2)]],
        );
        assert!(check_chart(&canned(2, 2, Some("count")), &table).is_ok());
        assert!(check_chart(&canned(2, 2, None), &table).is_ok());
        assert!(check_chart(&canned(2, 3, Some("count")), &table).is_err());
        assert!(check_chart(&canned(5, 5, Some("count")), &table).is_err());
        assert!(check_chart(&canned(2, 2, Some("age")), &table).is_err());

        let mut bad = canned(2, 2, None);
        bad.y[1] = f64::NAN;
        assert!(check_chart(&bad, &table).is_err());
    }

    #[tokio::test]
    async fn test_mismatched_collaborator_chart_is_replaced() {
        for bad in [canned(1, 3, None), canned(99, 99, Some("count")), canned(0, 0, None)] {
            let handler = VisualizationHandler::new(
                reads(Arc::new(Unavailable)),
                Arc::new(CannedChart(bad)),
                Duration::from_millis(100),
            );
            let results = run(&handler, "Visualize users by city").await;
            let chart = chart(&results);
            assert_eq!(chart.label, "count by city");
            assert_eq!(chart.chart_type, ChartType::Bar);
            assert_eq!(chart.y_label.as_deref(), Some("count"));
        }
    }

    #[tokio::test]
    async fn test_foreign_axis_label_is_replaced() {
        let rows = run(&handler(), "Visualize users by city").await;
        let PartialResult::Table(table) = &rows[0] else {
            panic!("expected table first");
        };
        let n = table.row_count;

        let handler = VisualizationHandler::new(
            reads(Arc::new(Unavailable)),
            Arc::new(CannedChart(canned(n, n, Some("age")))),
            Duration::from_millis(100),
        );
        let results = run(&handler, "Visualize users by city").await;
        let chart = chart(&results);
        assert_ne!(chart.label, "canned");
        assert_eq!(chart.y_label.as_deref(), Some("count"));
    }

    #[tokio::test]
    async fn test_requested_type_overrides_collaborator() {
        let handler = VisualizationHandler::new(
            reads(Arc::new(Unavailable)),
            Arc::new(FixedChart),
            Duration::from_millis(100),
        );
        let results = run(&handler, "line chart of users by city").await;
        assert_eq!(chart(&results).chart_type, ChartType::Line);
    }
}
