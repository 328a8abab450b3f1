//! Single routing entry point for catalog actions.
//!
//! A request is `{"action": "<name>", ...params}` (or `{"action", "params": {...}}`). The action
//! name is resolved to an [`ActionKind`] up front; each variant has one handler under
//! [`router`]. Handlers return JSON on success and a [`DispatchError`] otherwise, which is
//! rendered as `{"error": ErrorEnvelope}`. Requests are processed one at a time.

mod action;
mod error;
mod params;
mod router;

pub use action::ActionKind;
pub use error::{DispatchError, DispatchResult};

use crate::runtime_env::RuntimeConfig;
use instructions_catalog::{CatalogContext, CatalogSnapshot, RecordStore};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct Dispatcher {
    context: CatalogContext,
    config: RuntimeConfig,
}

impl Dispatcher {
    pub fn new(config: RuntimeConfig) -> Self {
        let store = config.record_store();
        Self::with_store(config, store)
    }

    /// Uses `store` as is; its directory and retry policy win over `config`.
    pub fn with_store(config: RuntimeConfig, store: RecordStore) -> Self {
        Self {
            context: CatalogContext::new(store),
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn context(&self) -> &CatalogContext {
        &self.context
    }

    /// Runs one request. Never panics on caller input; failures come back as `{"error": ...}`.
    pub fn dispatch(&mut self, request: Value) -> Value {
        match self.route(request, false) {
            Ok(value) => value,
            Err(err) => {
                log::debug!("Dispatch failed: {err}");
                err.into_response()
            }
        }
    }

    fn route(&mut self, request: Value, nested: bool) -> DispatchResult<Value> {
        let (name, args) = split_request(request)?;
        let action = ActionKind::parse(&name).ok_or_else(|| DispatchError::unknown_action(&name))?;
        if nested && action == ActionKind::Batch {
            return Err(DispatchError::invalid_request(
                "Nested batch operations are not supported",
            ));
        }
        if action.is_mutating() {
            self.require_mutation(action)?;
        }
        log::debug!("Dispatching '{action}'");
        self.execute(action, args)
    }

    fn execute(&mut self, action: ActionKind, args: Map<String, Value>) -> DispatchResult<Value> {
        let name = action.as_str();
        match action {
            ActionKind::Add => router::records::add(self, params::parse_params(name, args)?),
            ActionKind::Get => router::records::get(self, params::parse_params(name, args)?),
            ActionKind::Remove => {
                router::records::remove(self, params::parse_params(name, args)?)
            }
            ActionKind::Update => {
                router::records::update(self, params::parse_params(name, args)?)
            }
            ActionKind::Import => {
                router::records::import(self, params::parse_params(name, args)?)
            }
            ActionKind::List => router::catalog::list(self, params::parse_params(name, args)?),
            ActionKind::Diff => router::catalog::diff(self, params::parse_params(name, args)?),
            ActionKind::Export => {
                router::catalog::export(self, params::parse_params(name, args)?)
            }
            ActionKind::Search | ActionKind::Query => {
                router::catalog::search(self, action, params::parse_params(name, args)?)
            }
            ActionKind::Categories => router::catalog::categories(self),
            ActionKind::Batch => router::batch::batch(self, params::parse_params(name, args)?),
            ActionKind::Groom => {
                router::maintenance::groom(self, params::parse_params(name, args)?)
            }
            ActionKind::GovernanceHash => router::governance::governance_hash(self),
            ActionKind::GovernanceUpdate => {
                router::governance::governance_update(self, params::parse_params(name, args)?)
            }
            ActionKind::Reload | ActionKind::Invalidate => router::maintenance::reload(self),
            ActionKind::Dir => router::maintenance::dir(self),
            ActionKind::Health => router::maintenance::health(self),
            ActionKind::Capabilities => Ok(router::maintenance::capabilities(self)),
        }
    }

    pub(crate) fn require_mutation(&self, action: ActionKind) -> DispatchResult<()> {
        if self.config.mutation_enabled {
            Ok(())
        } else {
            Err(DispatchError::mutation_disabled(action.as_str()))
        }
    }

    pub(crate) fn snapshot(&mut self) -> DispatchResult<Arc<CatalogSnapshot>> {
        Ok(self.context.ensure_loaded()?)
    }

    pub(crate) fn store(&self) -> &RecordStore {
        self.context.store()
    }

    pub(crate) fn invalidate(&mut self) {
        self.context.invalidate();
    }
}

fn split_request(request: Value) -> DispatchResult<(String, Map<String, Value>)> {
    let Value::Object(mut map) = request else {
        return Err(DispatchError::invalid_request(
            "Request must be a JSON object with an 'action' field",
        ));
    };
    let name = match map.remove("action") {
        Some(Value::String(name)) => name,
        Some(_) => return Err(DispatchError::invalid_request("'action' must be a string")),
        None => return Err(DispatchError::invalid_request("Missing 'action'")),
    };
    if map.len() == 1 {
        if let Some(Value::Object(inner)) = map.get("params") {
            return Ok((name, inner.clone()));
        }
    }
    Ok((name, map))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> DispatchResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| DispatchError::new("internal", format!("Failed to serialize result: {err}")))
}
