use super::super::params::{DiffParams, ExportParams, FilterParams};
use super::super::{to_json, ActionKind, DispatchError, DispatchResult, Dispatcher};
use instructions_catalog::{search as search_entries, InstructionEntry};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub(in crate::dispatch) fn list(
    dispatcher: &mut Dispatcher,
    params: FilterParams,
) -> DispatchResult<Value> {
    let filter = params.filter()?;
    let snapshot = dispatcher.snapshot()?;
    let mut items: Vec<&InstructionEntry> = snapshot
        .entries
        .iter()
        .filter(|entry| filter.matches(entry))
        .collect();
    if let Some(limit) = filter.limit {
        items.truncate(limit);
    }
    Ok(json!({
        "count": items.len(),
        "hash": snapshot.hash,
        "items": to_json(&items)?,
    }))
}

/// Compares the caller's `{id, sourceHash}` view with the current snapshot.
pub(in crate::dispatch) fn diff(
    dispatcher: &mut Dispatcher,
    params: DiffParams,
) -> DispatchResult<Value> {
    let snapshot = dispatcher.snapshot()?;
    if params.client_hash.as_deref() == Some(snapshot.hash.as_str()) {
        return Ok(json!({ "upToDate": true, "hash": snapshot.hash }));
    }

    let known: HashMap<&str, Option<&str>> = params
        .known
        .iter()
        .map(|k| (k.id.as_str(), k.source_hash.as_deref()))
        .collect();

    let mut added = Vec::new();
    let mut updated = Vec::new();
    for entry in &snapshot.entries {
        match known.get(entry.id.as_str()) {
            None => added.push(entry),
            Some(hash) if *hash != Some(entry.source_hash.as_str()) => updated.push(entry),
            Some(_) => {}
        }
    }
    let removed: BTreeSet<&str> = known
        .keys()
        .copied()
        .filter(|id| snapshot.get(id).is_none())
        .collect();

    let up_to_date = added.is_empty() && updated.is_empty() && removed.is_empty();
    Ok(json!({
        "upToDate": up_to_date,
        "hash": snapshot.hash,
        "added": to_json(&added)?,
        "updated": to_json(&updated)?,
        "removed": removed,
    }))
}

pub(in crate::dispatch) fn export(
    dispatcher: &mut Dispatcher,
    params: ExportParams,
) -> DispatchResult<Value> {
    let snapshot = dispatcher.snapshot()?;
    let (items, missing): (Vec<&InstructionEntry>, Vec<String>) = match params.ids {
        None => (snapshot.entries.iter().collect(), Vec::new()),
        Some(ids) => {
            let wanted: BTreeSet<String> = ids.iter().map(|id| id.trim().to_string()).collect();
            let items = wanted.iter().filter_map(|id| snapshot.get(id)).collect();
            let missing = wanted
                .into_iter()
                .filter(|id| snapshot.get(id).is_none())
                .collect();
            (items, missing)
        }
    };

    let mut out = json!({
        "hash": snapshot.hash,
        "count": items.len(),
        "items": to_json(&items)?,
    });
    if !missing.is_empty() {
        out["missing"] = json!(missing);
    }
    Ok(out)
}

/// `search` ranks by text only; `query` also honors the filters and `limit`.
pub(in crate::dispatch) fn search(
    dispatcher: &mut Dispatcher,
    action: ActionKind,
    params: FilterParams,
) -> DispatchResult<Value> {
    let Some(query) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
        return Err(DispatchError::invalid_request(format!(
            "'{action}' requires a non-empty 'q'"
        )));
    };
    let filter = match action {
        ActionKind::Query => params.filter()?,
        _ => Default::default(),
    };

    let snapshot = dispatcher.snapshot()?;
    let hits = search_entries(&snapshot.entries, query, &filter);
    Ok(json!({
        "query": query,
        "count": hits.len(),
        "hash": snapshot.hash,
        "results": to_json(&hits)?,
    }))
}

pub(in crate::dispatch) fn categories(dispatcher: &mut Dispatcher) -> DispatchResult<Value> {
    let snapshot = dispatcher.snapshot()?;
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &snapshot.entries {
        for category in &entry.categories {
            *counts.entry(category.as_str()).or_default() += 1;
        }
    }
    let categories: Vec<Value> = counts
        .into_iter()
        .map(|(name, count)| json!({ "name": name, "count": count }))
        .collect();
    Ok(json!({ "count": categories.len(), "categories": categories }))
}
