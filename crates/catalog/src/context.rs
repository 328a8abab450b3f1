//! Cached catalog view over a [`RecordStore`].
//!
//! `ensure_loaded` probes a cheap directory signature (file names, sizes and mtimes; no file
//! contents) and only re-reads the catalog when it differs from the signature the cache was
//! built from. That probe is also how writes made by other processes become visible: there are
//! no locks or watchers, a process notices changes the next time it asks.

use crate::classify::{normalize, timestamp, NormalizeOptions};
use crate::entry::InstructionEntry;
use crate::governance::{compute_catalog_hash, compute_governance_hash};
use crate::hashing::hex_encode_lower;
use crate::store::{is_record_file_name, LoadError, RecordStore};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirSignature {
    pub file_count: u64,
    pub total_bytes: u64,
    pub max_mtime_ms: u64,
    /// sha256 over sorted `name, size, mtime_ns` triples.
    pub listing_hash: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    /// Sorted by id.
    pub entries: Vec<InstructionEntry>,
    pub hash: String,
    pub governance_hash: String,
    pub signature: DirSignature,
    pub load_errors: Vec<LoadError>,
    pub loaded_at: String,
}

impl CatalogSnapshot {
    pub fn get(&self, id: &str) -> Option<&InstructionEntry> {
        self.entries
            .binary_search_by(|entry| entry.id.as_str().cmp(id))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-process catalog cache. Create one per store; call [`CatalogContext::invalidate`] after
/// writing through the store so the next read does not wait for an mtime change.
#[derive(Debug)]
pub struct CatalogContext {
    store: RecordStore,
    cached: Option<Arc<CatalogSnapshot>>,
    invalidated: bool,
    reloads: u64,
}

impl CatalogContext {
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            cached: None,
            invalidated: false,
            reloads: 0,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Number of full reloads performed so far.
    pub fn reload_count(&self) -> u64 {
        self.reloads
    }

    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub fn ensure_loaded(&mut self) -> Result<Arc<CatalogSnapshot>> {
        let signature = probe_signature(self.store.dir())?;
        if !self.invalidated {
            if let Some(cached) = self.cached.as_ref() {
                if cached.signature == signature {
                    log::debug!("Catalog cache hit ({} entries)", cached.entries.len());
                    return Ok(Arc::clone(cached));
                }
            }
        }

        let snapshot = Arc::new(self.rebuild(signature)?);
        self.cached = Some(Arc::clone(&snapshot));
        self.invalidated = false;
        self.reloads += 1;
        Ok(snapshot)
    }

    fn rebuild(&self, signature: DirSignature) -> Result<CatalogSnapshot> {
        let outcome = self.store.load()?;
        let mut load_errors = outcome.errors;
        let mut entries = Vec::with_capacity(outcome.records.len());

        for record in outcome.records {
            // Defaults derived from the file's own mtime keep reloads deterministic for records
            // that were written without timestamps.
            match normalize(&record.raw, &NormalizeOptions::lax(record.modified)) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    log::warn!("Skipping instruction file {}: {err}", record.file_name);
                    load_errors.push(LoadError {
                        file: record.file_name,
                        message: err.to_string(),
                    });
                }
            }
        }
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        log::debug!(
            "Catalog reloaded from {}: {} entries, {} skipped",
            self.store.dir().display(),
            entries.len(),
            load_errors.len()
        );

        Ok(CatalogSnapshot {
            hash: compute_catalog_hash(&entries),
            governance_hash: compute_governance_hash(&entries),
            entries,
            signature,
            load_errors,
            loaded_at: timestamp(Utc::now()),
        })
    }
}

/// Metadata-only fingerprint of the record files in `dir`.
pub fn probe_signature(dir: &Path) -> Result<DirSignature> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(DirSignature {
                file_count: 0,
                total_bytes: 0,
                max_mtime_ms: 0,
                listing_hash: hex_encode_lower(&Sha256::digest(b"")),
            })
        }
        Err(err) => return Err(err.into()),
    };

    let mut files = Vec::new();
    for item in read_dir {
        let item = item?;
        let Some(name) = item.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !is_record_file_name(&name) {
            continue;
        }
        let meta = match item.metadata() {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            // Deleted between listing and stat; the next probe will see the new state.
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        files.push((name, meta.len(), mtime_ns));
    }
    files.sort();

    let mut hasher = Sha256::new();
    let mut total_bytes = 0u64;
    let mut max_mtime_ns = 0u128;
    for (name, len, mtime_ns) in &files {
        hasher.update(name.as_bytes());
        hasher.update([0]);
        hasher.update(len.to_be_bytes());
        hasher.update(mtime_ns.to_be_bytes());
        total_bytes = total_bytes.saturating_add(*len);
        max_mtime_ns = max_mtime_ns.max(*mtime_ns);
    }

    Ok(DirSignature {
        file_count: files.len() as u64,
        total_bytes,
        max_mtime_ms: u64::try_from(max_mtime_ns / 1_000_000).unwrap_or(u64::MAX),
        listing_hash: hex_encode_lower(&hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::RawInstruction;
    use crate::hashing::source_hash;

    fn seed(store: &RecordStore, id: &str, body: &str) {
        let raw = RawInstruction {
            id: Some(id.to_string()),
            body: Some(body.to_string()),
            ..RawInstruction::default()
        };
        let entry = normalize(&raw, &NormalizeOptions::strict(Utc::now())).expect("normalize");
        store.save(&entry).expect("save");
    }

    #[test]
    fn unchanged_directory_is_served_from_cache() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(tmp.path());
        seed(&store, "one", "first");
        let mut ctx = CatalogContext::new(store);

        let first = ctx.ensure_loaded().expect("load");
        let second = ctx.ensure_loaded().expect("load");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(ctx.reload_count(), 1);
        assert_eq!(first.get("one").map(|e| e.body.as_str()), Some("first"));
    }

    #[test]
    fn directory_changes_trigger_a_reload() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(tmp.path());
        seed(&store, "one", "first");
        let mut ctx = CatalogContext::new(store.clone());
        let before = ctx.ensure_loaded().expect("load");

        seed(&store, "two", "second");
        let after = ctx.ensure_loaded().expect("reload");
        assert_eq!(ctx.reload_count(), 2);
        assert_eq!(after.len(), 2);
        assert_ne!(before.hash, after.hash);
        assert_ne!(before.signature, after.signature);
    }

    #[test]
    fn invalidate_forces_a_reload_even_without_changes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(tmp.path());
        seed(&store, "one", "first");
        let mut ctx = CatalogContext::new(store);
        ctx.ensure_loaded().expect("load");
        ctx.invalidate();
        ctx.ensure_loaded().expect("reload");
        assert_eq!(ctx.reload_count(), 2);
        ctx.ensure_loaded().expect("cached");
        assert_eq!(ctx.reload_count(), 2);
    }

    #[test]
    fn snapshot_renormalizes_hand_written_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            tmp.path().join("manual.json"),
            r#"{"body":"\n  Hand written  \n","categories":["B","a","b"],"sourceHash":"bogus"}"#,
        )
        .expect("write");
        std::fs::write(tmp.path().join("empty.json"), r#"{"body":"   "}"#).expect("write");

        let mut ctx = CatalogContext::new(RecordStore::new(tmp.path()));
        let snapshot = ctx.ensure_loaded().expect("load");
        let entry = snapshot.get("manual").expect("manual entry");
        assert_eq!(entry.body, "Hand written");
        assert_eq!(entry.categories, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(entry.source_hash, source_hash("Hand written"));
        assert_eq!(snapshot.load_errors.len(), 1);
        assert_eq!(snapshot.load_errors[0].file, "empty.json");

        // Reloading an untouched hand-written file yields identical hashes.
        let hash = snapshot.hash.clone();
        let governance_hash = snapshot.governance_hash.clone();
        ctx.invalidate();
        let again = ctx.ensure_loaded().expect("reload");
        assert_eq!(again.hash, hash);
        assert_eq!(again.governance_hash, governance_hash);
    }

    #[test]
    fn missing_directory_yields_empty_snapshot() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut ctx = CatalogContext::new(RecordStore::new(tmp.path().join("nope")));
        let snapshot = ctx.ensure_loaded().expect("load");
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.signature.file_count, 0);
    }
}
