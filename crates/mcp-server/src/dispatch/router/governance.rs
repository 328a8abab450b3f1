use super::super::params::GovernanceUpdateParams;
use super::super::{to_json, DispatchError, DispatchResult, Dispatcher};
use chrono::Utc;
use instructions_catalog::{commit_update, governance_projections, BumpLevel, UpdateOptions};
use serde_json::{json, Value};

pub(in crate::dispatch) fn governance_hash(dispatcher: &mut Dispatcher) -> DispatchResult<Value> {
    let snapshot = dispatcher.snapshot()?;
    let items = governance_projections(&snapshot.entries);
    Ok(json!({
        "governanceHash": snapshot.governance_hash,
        "count": items.len(),
        "items": to_json(&items)?,
    }))
}

/// Owner/status/tier patch with an explicit bump (default `patch`). Re-sending the same patch
/// finds no delta and reports `changed: false`.
pub(in crate::dispatch) fn governance_update(
    dispatcher: &mut Dispatcher,
    params: GovernanceUpdateParams,
) -> DispatchResult<Value> {
    let patch = params.instruction_patch();
    if patch.owner.is_none() && patch.status.is_none() && patch.priority_tier.is_none() {
        return Err(DispatchError::invalid_request(
            "governanceUpdate requires at least one of owner, status, priorityTier",
        ));
    }

    let id = params.id.trim();
    let snapshot = dispatcher.snapshot()?;
    let current = snapshot
        .get(id)
        .ok_or_else(|| DispatchError::not_found(id))?;

    let opts = UpdateOptions {
        expected_source_hash: None,
        bump: params.bump.unwrap_or(BumpLevel::Patch),
        change_summary: params.change_summary.clone(),
    };
    let outcome = commit_update(dispatcher.store(), current, &patch, &opts, Utc::now())?;
    if !outcome.changed {
        return to_json(&outcome);
    }

    dispatcher.invalidate();
    let refreshed = dispatcher.snapshot()?;
    let mut out = to_json(&outcome)?;
    out["governanceHash"] = json!(refreshed.governance_hash);
    Ok(out)
}
