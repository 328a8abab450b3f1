//! Whole-catalog maintenance pass: hash repair, category normalization, duplicate merging and
//! deprecated-entry removal. Running it twice without external edits is a no-op the second time.

use crate::classify::{normalize, NormalizeOptions};
use crate::entry::{InstructionEntry, Requirement};
use crate::governance::compute_catalog_hash;
use crate::store::{LoadError, RecordStore};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroomMode {
    pub dry_run: bool,
    pub merge_duplicates: bool,
    pub remove_deprecated: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroomResult {
    pub dry_run: bool,
    pub previous_hash: String,
    pub hash: String,
    pub scanned: usize,
    pub repaired_hashes: usize,
    pub normalized_categories: usize,
    pub duplicates_merged: usize,
    pub deprecated_removed: usize,
    pub files_rewritten: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LoadError>,
}

struct Candidate {
    entry: InstructionEntry,
    hash_stale: bool,
    categories_stale: bool,
    merged_categories: bool,
}

pub fn groom(store: &RecordStore, mode: GroomMode) -> Result<GroomResult> {
    let outcome = store.load()?;
    let mut result = GroomResult {
        dry_run: mode.dry_run,
        scanned: outcome.records.len(),
        errors: outcome.errors,
        ..GroomResult::default()
    };

    let mut candidates = Vec::with_capacity(outcome.records.len());
    for record in outcome.records {
        let entry = match normalize(&record.raw, &NormalizeOptions::lax(record.modified)) {
            Ok(entry) => entry,
            Err(err) => {
                result.errors.push(LoadError {
                    file: record.file_name,
                    message: err.to_string(),
                });
                continue;
            }
        };
        let stored_categories = record.raw.categories.clone().unwrap_or_default();
        candidates.push(Candidate {
            hash_stale: record.raw.source_hash.as_deref() != Some(entry.source_hash.as_str()),
            categories_stale: stored_categories != entry.categories,
            merged_categories: false,
            entry,
        });
    }
    candidates.sort_by(|a, b| a.entry.id.cmp(&b.entry.id));

    let all: Vec<InstructionEntry> = candidates.iter().map(|c| c.entry.clone()).collect();
    result.previous_hash = compute_catalog_hash(&all);

    let mut doomed: BTreeSet<String> = BTreeSet::new();

    if mode.remove_deprecated {
        for candidate in &candidates {
            if candidate.entry.requirement == Requirement::Deprecated {
                doomed.insert(candidate.entry.id.clone());
                result.deprecated_removed += 1;
            }
        }
    }

    if mode.merge_duplicates {
        let mut by_hash: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, candidate) in candidates.iter().enumerate() {
            if !doomed.contains(&candidate.entry.id) {
                by_hash
                    .entry(candidate.entry.source_hash.as_str())
                    .or_default()
                    .push(idx);
            }
        }

        let mut merges: Vec<(usize, Vec<usize>)> = Vec::new();
        for group in by_hash.into_values().filter(|group| group.len() > 1) {
            let survivor = pick_survivor(&candidates, &group);
            let losers = group.into_iter().filter(|idx| *idx != survivor).collect();
            merges.push((survivor, losers));
        }

        for (survivor, losers) in merges {
            let mut categories: BTreeSet<String> =
                candidates[survivor].entry.categories.iter().cloned().collect();
            for loser in &losers {
                categories.extend(candidates[*loser].entry.categories.iter().cloned());
                doomed.insert(candidates[*loser].entry.id.clone());
                result.duplicates_merged += 1;
            }
            let categories: Vec<String> = categories.into_iter().collect();
            if categories != candidates[survivor].entry.categories {
                candidates[survivor].entry.categories = categories;
                candidates[survivor].merged_categories = true;
            }
            log::info!(
                "Merging {} duplicate(s) into '{}'",
                losers.len(),
                candidates[survivor].entry.id
            );
        }
    }

    for id in &doomed {
        result.removed_ids.push(id.clone());
        if mode.dry_run {
            continue;
        }
        if let Err(err) = store.remove(id) {
            log::warn!("Groom failed to remove '{id}': {err}");
            result.errors.push(LoadError {
                file: format!("{id}.json"),
                message: err.to_string(),
            });
        }
    }

    let mut survivors = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if doomed.contains(&candidate.entry.id) {
            continue;
        }
        if candidate.hash_stale {
            result.repaired_hashes += 1;
        }
        if candidate.categories_stale {
            result.normalized_categories += 1;
        }
        if candidate.hash_stale || candidate.categories_stale || candidate.merged_categories {
            result.files_rewritten += 1;
            if !mode.dry_run {
                if let Err(err) = store.save(&candidate.entry) {
                    log::warn!("Groom failed to rewrite '{}': {err}", candidate.entry.id);
                    result.errors.push(LoadError {
                        file: format!("{}.json", candidate.entry.id),
                        message: err.to_string(),
                    });
                }
            }
        }
        survivors.push(candidate.entry);
    }

    result.hash = compute_catalog_hash(&survivors);
    log::info!(
        "Groom{}: scanned={} repaired={} categories={} merged={} deprecated={} rewritten={}",
        if mode.dry_run { " (dry run)" } else { "" },
        result.scanned,
        result.repaired_hashes,
        result.normalized_categories,
        result.duplicates_merged,
        result.deprecated_removed,
        result.files_rewritten
    );
    Ok(result)
}

/// Most recent `createdAt` wins; ties go to the lexicographically smallest id.
fn pick_survivor(candidates: &[Candidate], group: &[usize]) -> usize {
    let created = |idx: usize| -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&candidates[idx].entry.created_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    };
    let mut best = group[0];
    for &idx in &group[1..] {
        let newer = created(idx) > created(best);
        let tie = created(idx) == created(best)
            && candidates[idx].entry.id < candidates[best].entry.id;
        if newer || tie {
            best = idx;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::source_hash;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;

    fn write(dir: &Path, id: &str, value: serde_json::Value) {
        std::fs::write(
            dir.join(format!("{id}.json")),
            serde_json::to_vec_pretty(&value).expect("json"),
        )
        .expect("write");
    }

    fn snapshot_dir(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|item| item.ok())
            .map(|item| {
                let name = item.file_name().to_string_lossy().to_string();
                let bytes = std::fs::read(item.path()).expect("read");
                (name, bytes)
            })
            .collect();
        files.sort();
        files
    }

    fn messy_catalog(dir: &Path) {
        write(
            dir,
            "stale-hash",
            json!({ "id": "stale-hash", "body": "Keep tests green", "sourceHash": "bogus" }),
        );
        write(
            dir,
            "messy-cats",
            json!({
                "id": "messy-cats",
                "body": "Prefer small modules",
                "sourceHash": source_hash("Prefer small modules"),
                "categories": ["Style", "rust", "style"]
            }),
        );
        write(
            dir,
            "old-rule",
            json!({
                "id": "old-rule",
                "body": "Use tabs",
                "requirement": "deprecated",
                "sourceHash": source_hash("Use tabs")
            }),
        );
        write(
            dir,
            "dup-b",
            json!({
                "id": "dup-b",
                "body": "Write docs",
                "categories": ["docs"],
                "createdAt": "2026-01-01T00:00:00.000Z",
                "sourceHash": source_hash("Write docs")
            }),
        );
        write(
            dir,
            "dup-a",
            json!({
                "id": "dup-a",
                "body": "\nWrite docs\n",
                "categories": ["writing"],
                "createdAt": "2026-01-01T00:00:00.000Z",
                "sourceHash": source_hash("Write docs")
            }),
        );
    }

    fn full_mode() -> GroomMode {
        GroomMode {
            dry_run: false,
            merge_duplicates: true,
            remove_deprecated: true,
        }
    }

    #[test]
    fn groom_repairs_merges_and_removes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        messy_catalog(tmp.path());
        let store = RecordStore::new(tmp.path());

        let result = groom(&store, full_mode()).expect("groom");
        assert_eq!(result.scanned, 5);
        assert_eq!(result.repaired_hashes, 1);
        assert_eq!(result.normalized_categories, 1);
        assert_eq!(result.deprecated_removed, 1);
        assert_eq!(result.duplicates_merged, 1);
        assert_eq!(result.removed_ids, vec!["dup-b".to_string(), "old-rule".to_string()]);
        assert_ne!(result.previous_hash, result.hash);

        let files = store.list_files().expect("list");
        assert_eq!(files, vec!["dup-a.json", "messy-cats.json", "stale-hash.json"]);

        let survivor = store.load_one("dup-a").expect("load").expect("survivor");
        assert_eq!(
            survivor.raw.categories,
            Some(vec!["docs".to_string(), "writing".to_string()])
        );
        let repaired = store.load_one("stale-hash").expect("load").expect("repaired");
        assert_eq!(
            repaired.raw.source_hash.as_deref(),
            Some(source_hash("Keep tests green").as_str())
        );
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let tmp = tempfile::tempdir().expect("tempdir");
        messy_catalog(tmp.path());
        let store = RecordStore::new(tmp.path());

        let first = groom(&store, full_mode()).expect("first");
        let after_first = snapshot_dir(tmp.path());
        let second = groom(&store, full_mode()).expect("second");

        assert_eq!(second.repaired_hashes, 0);
        assert_eq!(second.normalized_categories, 0);
        assert_eq!(second.duplicates_merged, 0);
        assert_eq!(second.deprecated_removed, 0);
        assert_eq!(second.files_rewritten, 0);
        assert_eq!(second.previous_hash, first.hash);
        assert_eq!(second.hash, first.hash);
        assert_eq!(snapshot_dir(tmp.path()), after_first);
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        messy_catalog(tmp.path());
        let before = snapshot_dir(tmp.path());
        let store = RecordStore::new(tmp.path());

        let mode = GroomMode {
            dry_run: true,
            ..full_mode()
        };
        let dry = groom(&store, mode).expect("dry run");
        assert!(dry.dry_run);
        assert_eq!(snapshot_dir(tmp.path()), before);

        let real = groom(&store, full_mode()).expect("real");
        assert_eq!(dry.repaired_hashes, real.repaired_hashes);
        assert_eq!(dry.duplicates_merged, real.duplicates_merged);
        assert_eq!(dry.deprecated_removed, real.deprecated_removed);
        assert_eq!(dry.files_rewritten, real.files_rewritten);
        assert_eq!(dry.hash, real.hash);
    }

    #[test]
    fn most_recent_duplicate_survives() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write(
            tmp.path(),
            "aaa",
            json!({ "id": "aaa", "body": "same", "createdAt": "2025-01-01T00:00:00.000Z" }),
        );
        write(
            tmp.path(),
            "zzz",
            json!({ "id": "zzz", "body": "same", "createdAt": "2026-01-01T00:00:00.000Z" }),
        );
        let store = RecordStore::new(tmp.path());
        let mode = GroomMode {
            merge_duplicates: true,
            ..GroomMode::default()
        };
        let result = groom(&store, mode).expect("groom");
        assert_eq!(result.duplicates_merged, 1);
        assert_eq!(store.list_files().expect("list"), vec!["zzz.json"]);
    }

    #[test]
    fn flags_off_leave_duplicates_and_deprecated_alone() {
        let tmp = tempfile::tempdir().expect("tempdir");
        messy_catalog(tmp.path());
        let store = RecordStore::new(tmp.path());
        let result = groom(&store, GroomMode::default()).expect("groom");
        assert_eq!(result.duplicates_merged, 0);
        assert_eq!(result.deprecated_removed, 0);
        assert_eq!(store.list_files().expect("list").len(), 5);
    }
}
