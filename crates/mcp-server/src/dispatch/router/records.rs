use super::super::params::{parse_entry, AddParams, IdParams, ImportParams, UpdateParams};
use super::super::{to_json, DispatchError, DispatchResult, Dispatcher};
use chrono::Utc;
use instructions_catalog::{
    apply_replacement, commit_update, normalize, validate_governance, validate_id,
    NormalizeOptions, RawInstruction, UpdateOptions,
};
use serde_json::{json, Value};

pub(in crate::dispatch) fn add(
    dispatcher: &mut Dispatcher,
    mut params: AddParams,
) -> DispatchResult<Value> {
    let raw = params.take_entry()?;
    add_one(dispatcher, raw, params.overwrite, params.lax)
}

/// Create, skip or replace one entry. Every validation runs before the store is touched.
fn add_one(
    dispatcher: &mut Dispatcher,
    mut raw: RawInstruction,
    overwrite: bool,
    lax: bool,
) -> DispatchResult<Value> {
    let id = raw
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DispatchError::invalid_request("Instruction entry requires 'id'"))?
        .to_string();
    validate_id(&id)?;
    raw.id = Some(id.clone());

    let now = Utc::now();
    let snapshot = dispatcher.snapshot()?;
    let current = snapshot.get(&id).cloned();
    let exists = current.is_some() || dispatcher.store().path_for(&id)?.exists();

    if exists && !overwrite {
        return Ok(json!({
            "id": id,
            "skipped": true,
            "created": false,
            "overwritten": false,
            "reason": "exists",
        }));
    }

    let Some(current) = current else {
        let entry = normalize(&raw, &NormalizeOptions { lax, now })?;
        validate_governance(&entry)?;
        dispatcher.store().save(&entry)?;
        dispatcher.invalidate();
        log::info!("Created instruction '{id}' v{}", entry.version);
        return Ok(json!({
            "id": id,
            "created": !exists,
            "overwritten": exists,
            "skipped": false,
            "version": entry.version,
            "sourceHash": entry.source_hash,
        }));
    };

    let outcome = apply_replacement(&current, &raw, lax, now)?;
    if let Some(entry) = outcome.entry.as_ref() {
        dispatcher.store().save(entry)?;
        dispatcher.invalidate();
        log::info!(
            "Overwrote instruction '{id}' {} -> {}",
            outcome.previous_version,
            outcome.version
        );
    }
    Ok(json!({
        "id": id,
        "created": false,
        "overwritten": outcome.changed,
        "skipped": false,
        "changed": outcome.changed,
        "bumped": outcome.bumped,
        "version": outcome.version,
        "previousVersion": outcome.previous_version,
        "sourceHash": outcome.source_hash,
    }))
}

pub(in crate::dispatch) fn get(
    dispatcher: &mut Dispatcher,
    params: IdParams,
) -> DispatchResult<Value> {
    let snapshot = dispatcher.snapshot()?;
    match snapshot.get(params.id.trim()) {
        Some(item) => Ok(json!({ "item": to_json(item)? })),
        None => Ok(json!({ "id": params.id, "notFound": true })),
    }
}

pub(in crate::dispatch) fn remove(
    dispatcher: &mut Dispatcher,
    params: IdParams,
) -> DispatchResult<Value> {
    let id = params.id.trim();
    validate_id(id)?;
    let removed = dispatcher.store().remove(id)?;
    if removed {
        dispatcher.invalidate();
        log::info!("Removed instruction '{id}'");
    }
    Ok(json!({ "id": id, "removed": removed }))
}

pub(in crate::dispatch) fn update(
    dispatcher: &mut Dispatcher,
    mut params: UpdateParams,
) -> DispatchResult<Value> {
    let patch = params.take_patch()?;
    let id = params.id.trim();
    let snapshot = dispatcher.snapshot()?;
    let current = snapshot
        .get(id)
        .ok_or_else(|| DispatchError::not_found(id))?;

    let opts = UpdateOptions {
        expected_source_hash: params.expected_source_hash,
        bump: params.bump.unwrap_or_default(),
        change_summary: params.change_summary,
    };
    let outcome = commit_update(dispatcher.store(), current, &patch, &opts, Utc::now())?;
    if outcome.changed {
        dispatcher.invalidate();
    }
    to_json(&outcome)
}

/// Bulk `add`: each entry gets its own `{result}` or `{error}` slot.
pub(in crate::dispatch) fn import(
    dispatcher: &mut Dispatcher,
    params: ImportParams,
) -> DispatchResult<Value> {
    let mut results = Vec::with_capacity(params.entries.len());
    let (mut created, mut overwritten, mut skipped, mut failed) = (0usize, 0usize, 0usize, 0usize);

    for entry in params.entries {
        let outcome =
            parse_entry(entry).and_then(|raw| add_one(dispatcher, raw, params.overwrite, params.lax));
        match outcome {
            Ok(result) => {
                if result["created"] == json!(true) {
                    created += 1;
                } else if result["overwritten"] == json!(true) {
                    overwritten += 1;
                } else {
                    skipped += 1;
                }
                results.push(json!({ "result": result }));
            }
            Err(err) => {
                failed += 1;
                results.push(json!({ "error": err.into_envelope() }));
            }
        }
    }

    log::info!(
        "Import finished: created={created} overwritten={overwritten} skipped={skipped} failed={failed}"
    );
    Ok(json!({
        "count": results.len(),
        "created": created,
        "overwritten": overwritten,
        "skipped": skipped,
        "failed": failed,
        "results": results,
    }))
}
