use super::super::params::GroomParams;
use super::super::{to_json, ActionKind, DispatchResult, Dispatcher};
use instructions_catalog::{groom as groom_catalog, INSTRUCTION_SCHEMA_VERSION};
use instructions_protocol::{
    Capabilities, CapabilitiesServer, CapabilitiesStorage, CAPABILITIES_SCHEMA_VERSION,
};
use serde_json::{json, Value};

pub(in crate::dispatch) fn groom(
    dispatcher: &mut Dispatcher,
    params: GroomParams,
) -> DispatchResult<Value> {
    let mode = params.resolve();
    if !mode.dry_run {
        dispatcher.require_mutation(ActionKind::Groom)?;
    }
    let result = groom_catalog(dispatcher.store(), mode)?;
    if !mode.dry_run {
        dispatcher.invalidate();
    }
    to_json(&result)
}

pub(in crate::dispatch) fn reload(dispatcher: &mut Dispatcher) -> DispatchResult<Value> {
    dispatcher.invalidate();
    let snapshot = dispatcher.snapshot()?;
    Ok(json!({
        "reloaded": true,
        "count": snapshot.len(),
        "hash": snapshot.hash,
        "governanceHash": snapshot.governance_hash,
        "loadErrors": to_json(&snapshot.load_errors)?,
    }))
}

/// Raw directory listing, straight from the store and independent of the cache.
pub(in crate::dispatch) fn dir(dispatcher: &mut Dispatcher) -> DispatchResult<Value> {
    let store = dispatcher.store();
    let files = store.list_files()?;
    Ok(json!({
        "dir": store.dir().display().to_string(),
        "exists": store.dir().is_dir(),
        "count": files.len(),
        "files": files,
    }))
}

pub(in crate::dispatch) fn health(dispatcher: &mut Dispatcher) -> DispatchResult<Value> {
    let snapshot = dispatcher.snapshot()?;
    let status = if snapshot.load_errors.is_empty() {
        "ok"
    } else {
        "degraded"
    };
    Ok(json!({
        "status": status,
        "dir": dispatcher.store().dir().display().to_string(),
        "count": snapshot.len(),
        "hash": snapshot.hash,
        "governanceHash": snapshot.governance_hash,
        "signature": to_json(&snapshot.signature)?,
        "loadedAt": snapshot.loaded_at,
        "reloads": dispatcher.context().reload_count(),
        "loadErrors": to_json(&snapshot.load_errors)?,
        "mutationEnabled": dispatcher.config().mutation_enabled,
    }))
}

pub(in crate::dispatch) fn capabilities(dispatcher: &Dispatcher) -> Value {
    let retry = dispatcher.store().retry_policy();
    let capabilities = Capabilities {
        schema_version: CAPABILITIES_SCHEMA_VERSION,
        server: CapabilitiesServer {
            name: "instructions-mcp".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        actions: ActionKind::names(),
        mutating_actions: ActionKind::mutating_names(),
        mutation_enabled: dispatcher.config().mutation_enabled,
        storage: CapabilitiesStorage {
            dir: dispatcher.store().dir().display().to_string(),
            record_schema_version: INSTRUCTION_SCHEMA_VERSION,
            write_attempts: retry.attempts,
            write_backoff_ms: u64::try_from(retry.backoff.as_millis()).unwrap_or(u64::MAX),
        },
    };
    serde_json::to_value(capabilities).unwrap_or(Value::Null)
}
