//! Catalog-level hashes.
//!
//! The content hash moves when any body changes; the governance hash moves when ownership,
//! versioning or review metadata changes. Neither includes the other's inputs.

use crate::entry::{InstructionEntry, PriorityTier, Requirement};
use crate::hashing::sha256_hex;
use crate::{CatalogError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceProjection {
    pub id: String,
    pub version: String,
    pub owner: Option<String>,
    pub priority_tier: PriorityTier,
    pub next_review_due: String,
    pub change_log_length: usize,
    pub semantic_summary_sha256: String,
}

pub fn governance_projection(entry: &InstructionEntry) -> GovernanceProjection {
    GovernanceProjection {
        id: entry.id.clone(),
        version: entry.version.clone(),
        owner: entry.owner.clone(),
        priority_tier: entry.priority_tier,
        next_review_due: entry.next_review_due.clone(),
        change_log_length: entry.change_log.len(),
        semantic_summary_sha256: sha256_hex(entry.semantic_summary.as_bytes()),
    }
}

/// Governance prerequisites every stored entry must meet.
pub fn validate_governance(entry: &InstructionEntry) -> Result<()> {
    if entry.requirement == Requirement::Critical && entry.owner.is_none() {
        return Err(CatalogError::validation(format!(
            "instruction '{}' is critical but has no owner",
            entry.id
        )));
    }
    Ok(())
}

/// Projections ordered by id, the order both hashes are computed in.
pub fn governance_projections(entries: &[InstructionEntry]) -> Vec<GovernanceProjection> {
    let mut items: Vec<_> = entries.iter().map(governance_projection).collect();
    items.sort_by(|a, b| a.id.cmp(&b.id));
    items
}

pub fn compute_governance_hash(entries: &[InstructionEntry]) -> String {
    let mut hasher = Sha256::new();
    for item in governance_projections(entries) {
        // Struct field order is fixed, so the serialized form is canonical.
        let line = serde_json::to_string(&item).unwrap_or_default();
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    crate::hashing::hex_encode_lower(&hasher.finalize())
}

/// Aggregate content hash over `id:sourceHash` pairs sorted by id.
pub fn compute_catalog_hash(entries: &[InstructionEntry]) -> String {
    let mut pairs: Vec<(&str, &str)> = entries
        .iter()
        .map(|e| (e.id.as_str(), e.source_hash.as_str()))
        .collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    for (id, source_hash) in pairs {
        hasher.update(id.as_bytes());
        hasher.update(b":");
        hasher.update(source_hash.as_bytes());
        hasher.update(b"\n");
    }
    crate::hashing::hex_encode_lower(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{normalize, NormalizeOptions};
    use crate::entry::RawInstruction;
    use crate::hashing::source_hash;
    use chrono::{DateTime, Utc};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    fn catalog() -> Vec<InstructionEntry> {
        ["alpha", "beta", "gamma"]
            .iter()
            .map(|id| {
                let raw = RawInstruction {
                    id: Some(id.to_string()),
                    body: Some(format!("Body of {id}")),
                    owner: Some("platform".into()),
                    ..RawInstruction::default()
                };
                normalize(&raw, &NormalizeOptions::strict(now())).expect("normalize")
            })
            .collect()
    }

    #[test]
    fn hashes_are_order_independent() {
        let entries = catalog();
        let mut reversed = entries.clone();
        reversed.reverse();
        assert_eq!(compute_catalog_hash(&entries), compute_catalog_hash(&reversed));
        assert_eq!(
            compute_governance_hash(&entries),
            compute_governance_hash(&reversed)
        );
    }

    #[test]
    fn owner_change_moves_governance_hash_only() {
        let entries = catalog();
        let mut changed = entries.clone();
        changed[1].owner = Some("security".into());

        assert_eq!(compute_catalog_hash(&entries), compute_catalog_hash(&changed));
        assert_ne!(
            compute_governance_hash(&entries),
            compute_governance_hash(&changed)
        );
    }

    #[test]
    fn body_change_moves_content_hash_only() {
        let entries = catalog();
        let mut changed = entries.clone();
        changed[0].body = "A different body".into();
        changed[0].source_hash = source_hash(&changed[0].body);

        assert_ne!(compute_catalog_hash(&entries), compute_catalog_hash(&changed));
        assert_eq!(
            compute_governance_hash(&entries),
            compute_governance_hash(&changed)
        );
    }

    #[test]
    fn each_governance_field_is_covered() {
        let base = catalog();
        let base_hash = compute_governance_hash(&base);
        let mutations: Vec<Box<dyn Fn(&mut InstructionEntry)>> = vec![
            Box::new(|e| e.version = "1.0.1".into()),
            Box::new(|e| e.priority_tier = PriorityTier::P1),
            Box::new(|e| e.next_review_due = "2030-01-01T00:00:00.000Z".into()),
            Box::new(|e| e.change_log.push(e.change_log[0].clone())),
            Box::new(|e| e.semantic_summary = "reworded".into()),
            Box::new(|e| e.owner = None),
        ];
        for mutate in mutations {
            let mut changed = base.clone();
            mutate(&mut changed[2]);
            assert_ne!(compute_governance_hash(&changed), base_hash);
            assert_eq!(compute_catalog_hash(&changed), compute_catalog_hash(&base));
        }
    }

    #[test]
    fn empty_catalog_hashes_are_stable() {
        assert_eq!(compute_catalog_hash(&[]), sha256_hex(b""));
        assert_eq!(compute_governance_hash(&[]), sha256_hex(b""));
    }
}
