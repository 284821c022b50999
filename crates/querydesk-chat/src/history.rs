//! Per-user conversation history with automatic compaction.
//!
//! Each user owns an ordered log (most recent last). When an append pushes a
//! log past [`COMPACTION_THRESHOLD`] entries, everything except the last
//! [`KEEP_RECENT`] entries is folded into a single summary entry. The
//! append and its compaction happen under one write lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::types::{CompactionDigest, HistoryEntry, HistoryStats, InteractionType};

/// A log longer than this is compacted on append.
pub const COMPACTION_THRESHOLD: usize = 100;

/// Entries kept verbatim after compaction.
pub const KEEP_RECENT: usize = 20;

/// Maximum number of topics carried in a digest.
const MAX_TOPICS: usize = 5;

// =============================================================================
// Summarizer
// =============================================================================

/// Folds a prefix of a log into one summary entry.
pub trait HistorySummarizer: Send + Sync {
    fn summarize(&self, entries: &[HistoryEntry]) -> Result<HistoryEntry, ChatError>;
}

/// Topic buckets and the words that put a query in them.
const TOPICS: &[(&str, &[&str])] = &[
    ("database queries", &["user", "customer", "order", "product"]),
    ("data visualization", &["chart", "graph", "visual", "plot"]),
    ("personal interaction", &["name", "hello", "how are you"]),
    ("financial analysis", &["revenue", "sales", "total", "amount"]),
    ("geographic data", &["city", "location", "address"]),
];

const CATEGORIES: &[(&str, &[&str])] = &[
    ("data retrieval", &["show", "list", "get", "find"]),
    ("visualization", &["chart", "graph", "plot", "visual"]),
    ("aggregation", &["total", "sum", "count", "average"]),
    ("chit-chat", &["hello", "hi", "how are you", "name"]),
];

/// Keyword-based summarizer. Needs no external service.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordSummarizer;

impl HistorySummarizer for KeywordSummarizer {
    fn summarize(&self, entries: &[HistoryEntry]) -> Result<HistoryEntry, ChatError> {
        let first = entries
            .first()
            .ok_or_else(|| ChatError::HistoryCompaction("nothing to summarize".to_string()))?;
        let last = entries.last().unwrap_or(first);

        let mut digest = CompactionDigest::default();
        for entry in entries {
            match (&entry.digest, entry.is_summary()) {
                (Some(prior), true) => {
                    digest.original_count += prior.original_count;
                    merge_unique(&mut digest.key_topics, prior.key_topics.iter().cloned());
                    merge_unique(&mut digest.categories, prior.categories.iter().cloned());
                    for (tag, count) in &prior.interaction_counts {
                        *digest.interaction_counts.entry(tag.clone()).or_insert(0) += count;
                    }
                }
                _ => {
                    digest.original_count += 1;
                    let text = entry.query.to_lowercase();
                    merge_unique(&mut digest.key_topics, matching(&text, TOPICS));
                    merge_unique(&mut digest.categories, matching(&text, CATEGORIES));
                    *digest
                        .interaction_counts
                        .entry(entry.interaction_type.as_str().to_string())
                        .or_insert(0) += 1;
                }
            }
        }
        digest.key_topics.truncate(MAX_TOPICS);

        let topics = if digest.key_topics.is_empty() {
            "general conversation".to_string()
        } else {
            digest.key_topics.join(", ")
        };

        Ok(HistoryEntry {
            timestamp: first.timestamp,
            role: last.role,
            query: format!(
                "[CONVERSATION SUMMARY] {} previous conversations",
                digest.original_count
            ),
            response_summary: format!(
                "Previous conversation summary: user discussed topics including {}.",
                topics
            ),
            interaction_type: InteractionType::Summary,
            digest: Some(digest),
        })
    }
}

fn matching<'a>(text: &str, buckets: &'a [(&'a str, &'a [&'a str])]) -> impl Iterator<Item = String> + 'a {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let text = text.to_string();
    buckets
        .iter()
        .filter(move |(_, keywords)| keywords.iter().any(|kw| mentions(&text, &words, kw)))
        .map(|(name, _)| name.to_string())
}

/// Phrase keywords match as substrings; single words match whole words,
/// plurals, or (for longer stems) prefixes.
fn mentions(text: &str, words: &[String], keyword: &str) -> bool {
    if keyword.contains(' ') {
        return text.contains(keyword);
    }
    words.iter().any(|w| {
        w == keyword
            || w.strip_suffix('s') == Some(keyword)
            || (keyword.len() >= 4 && w.starts_with(keyword))
    })
}

fn merge_unique(into: &mut Vec<String>, items: impl Iterator<Item = String>) {
    for item in items {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

/// Render entries as `User:` / `Assistant:` lines; summaries become a
/// single `Previous conversations:` line.
pub fn render_context(entries: &[HistoryEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            if entry.is_summary() {
                format!("Previous conversations: {}", entry.response_summary)
            } else {
                format!("User: {}\nAssistant: {}", entry.query, entry.response_summary)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// Store
// =============================================================================

/// In-memory history for every user, living for the process lifetime.
pub struct HistoryStore {
    logs: RwLock<HashMap<String, Vec<HistoryEntry>>>,
    summarizer: Box<dyn HistorySummarizer>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::with_summarizer(Box::new(KeywordSummarizer))
    }

    pub fn with_summarizer(summarizer: Box<dyn HistorySummarizer>) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            summarizer,
        }
    }

    /// Append an entry, compacting the user's log if it grows past the
    /// threshold. Returns the stored length afterwards.
    ///
    /// A failed summarization keeps the raw entries; the append still
    /// succeeds.
    pub fn append(&self, user_id: &str, entry: HistoryEntry) -> usize {
        let mut logs = self.logs.write().unwrap_or_else(PoisonError::into_inner);
        let log = logs.entry(user_id.to_string()).or_default();
        log.push(entry);

        if log.len() > COMPACTION_THRESHOLD {
            let split = log.len() - KEEP_RECENT;
            match self.summarizer.summarize(&log[..split]) {
                Ok(summary) => {
                    let folded = split;
                    let recent = log.split_off(split);
                    log.clear();
                    log.push(summary);
                    log.extend(recent);
                    info!(user_id, folded, kept = log.len(), "Compacted conversation history");
                }
                Err(e) => {
                    warn!(user_id, error = %e, "History compaction failed, keeping raw entries");
                }
            }
        }

        log.len()
    }

    /// The most recent `limit` entries, oldest first.
    pub fn get(&self, user_id: &str, limit: usize) -> Vec<HistoryEntry> {
        let logs = self.logs.read().unwrap_or_else(PoisonError::into_inner);
        match logs.get(user_id) {
            Some(log) => log[log.len().saturating_sub(limit)..].to_vec(),
            None => Vec::new(),
        }
    }

    /// The user's whole stored log.
    pub fn get_all(&self, user_id: &str) -> Vec<HistoryEntry> {
        let logs = self.logs.read().unwrap_or_else(PoisonError::into_inner);
        logs.get(user_id).cloned().unwrap_or_default()
    }

    pub fn len(&self, user_id: &str) -> usize {
        let logs = self.logs.read().unwrap_or_else(PoisonError::into_inner);
        logs.get(user_id).map_or(0, Vec::len)
    }

    /// Drop a user's log. Returns whether anything was removed.
    pub fn clear(&self, user_id: &str) -> bool {
        let mut logs = self.logs.write().unwrap_or_else(PoisonError::into_inner);
        let removed = logs.remove(user_id).is_some();
        if removed {
            info!(user_id, "Cleared conversation history");
        }
        removed
    }

    /// User ids with a stored log, sorted.
    pub fn users(&self) -> Vec<String> {
        let logs = self.logs.read().unwrap_or_else(PoisonError::into_inner);
        let mut users: Vec<String> = logs.keys().cloned().collect();
        users.sort();
        users
    }

    pub fn stats(&self) -> HistoryStats {
        let logs = self.logs.read().unwrap_or_else(PoisonError::into_inner);
        HistoryStats {
            active_users: logs.len(),
            total_entries: logs.values().map(Vec::len).sum(),
        }
    }

    /// Render recent history as prompt context for generation.
    pub fn conversation_context(&self, user_id: &str, limit: usize) -> String {
        render_context(&self.get(user_id, limit))
    }

    /// Pretty JSON export of a user's log, or `None` when it is empty.
    pub fn export(&self, user_id: &str) -> Result<Option<String>, ChatError> {
        let history = self.get_all(user_id);
        if history.is_empty() {
            return Ok(None);
        }
        let doc = serde_json::json!({
            "user_id": user_id,
            "exported_at": Utc::now().to_rfc3339(),
            "conversation_count": history.len(),
            "history": history,
        });
        let text = serde_json::to_string_pretty(&doc)
            .map_err(|e| ChatError::Storage(format!("history export failed: {}", e)))?;
        debug!(user_id, entries = history.len(), "Exported history");
        Ok(Some(text))
    }

    /// Counts per interaction tag for one user's stored log.
    pub fn interaction_counts(&self, user_id: &str) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.get_all(user_id) {
            *counts
                .entry(entry.interaction_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        counts
    }
}
