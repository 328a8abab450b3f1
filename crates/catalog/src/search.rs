//! Keyword search over title and body.
//!
//! Scoring is plain token overlap: every occurrence of a query token counts once in the body
//! and twice in the title. Entries without any overlap are not returned.

use crate::entry::{Audience, InstructionEntry, Requirement};
use serde::Serialize;
use std::collections::BTreeSet;
use unicode_segmentation::UnicodeSegmentation;

const TITLE_WEIGHT: u32 = 2;
const BODY_WEIGHT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub score: u32,
}

/// Optional narrowing applied before scoring.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub category: Option<String>,
    pub audience: Option<Audience>,
    pub requirement: Option<Requirement>,
    pub limit: Option<usize>,
}

impl SearchFilter {
    pub fn matches(&self, entry: &InstructionEntry) -> bool {
        if let Some(category) = self.category.as_deref() {
            let wanted = category.trim().to_lowercase();
            if !entry.categories.iter().any(|c| *c == wanted) {
                return false;
            }
        }
        if self.audience.is_some_and(|a| a != entry.audience) {
            return false;
        }
        if self.requirement.is_some_and(|r| r != entry.requirement) {
            return false;
        }
        true
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

pub fn score_entry(query_tokens: &BTreeSet<String>, entry: &InstructionEntry) -> u32 {
    let count = |text: &str| -> u32 {
        tokenize(text)
            .iter()
            .filter(|token| query_tokens.contains(*token))
            .count() as u32
    };
    count(&entry.title) * TITLE_WEIGHT + count(&entry.body) * BODY_WEIGHT
}

/// Hits sorted by descending score, then id. An empty query matches nothing.
pub fn search<'a, I>(entries: I, query: &str, filter: &SearchFilter) -> Vec<SearchHit>
where
    I: IntoIterator<Item = &'a InstructionEntry>,
{
    let query_tokens: BTreeSet<String> = tokenize(query).into_iter().collect();
    if query_tokens.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = entries
        .into_iter()
        .filter(|entry| filter.matches(entry))
        .filter_map(|entry| {
            let score = score_entry(&query_tokens, entry);
            (score > 0).then(|| SearchHit {
                id: entry.id.clone(),
                title: entry.title.clone(),
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    if let Some(limit) = filter.limit {
        hits.truncate(limit);
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{normalize, NormalizeOptions};
    use crate::entry::RawInstruction;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn entry(id: &str, title: &str, body: &str, categories: &[&str]) -> InstructionEntry {
        let raw = RawInstruction {
            id: Some(id.to_string()),
            title: Some(title.to_string()),
            body: Some(body.to_string()),
            categories: Some(categories.iter().map(|c| c.to_string()).collect()),
            ..RawInstruction::default()
        };
        normalize(&raw, &NormalizeOptions::strict(Utc::now())).expect("normalize")
    }

    fn catalog() -> Vec<InstructionEntry> {
        vec![
            entry("errors", "Error handling", "Return errors, never panic.", &["rust"]),
            entry("logging", "Logging", "Log errors to stderr.", &["ops"]),
            entry("naming", "Naming", "Use descriptive names.", &["style"]),
        ]
    }

    #[test]
    fn title_matches_outrank_body_matches() {
        let hits = search(&catalog(), "errors", &SearchFilter::default());
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["errors", "logging"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn ties_break_by_id() {
        let hits = search(&catalog(), "use log", &SearchFilter::default());
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["logging", "naming"]);

        let entries = vec![
            entry("b", "Alpha", "x", &[]),
            entry("a", "Alpha", "y", &[]),
        ];
        let hits = search(&entries, "ALPHA", &SearchFilter::default());
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn filters_and_limit_apply() {
        let filter = SearchFilter {
            category: Some("OPS".into()),
            ..SearchFilter::default()
        };
        let hits = search(&catalog(), "errors", &filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "logging");

        let limited = SearchFilter {
            limit: Some(1),
            ..SearchFilter::default()
        };
        assert_eq!(search(&catalog(), "errors", &limited).len(), 1);
    }

    #[test]
    fn blank_query_matches_nothing() {
        assert!(search(&catalog(), "  ,. ", &SearchFilter::default()).is_empty());
    }
}
