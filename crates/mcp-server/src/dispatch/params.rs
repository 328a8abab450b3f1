//! Typed parameters for each action. Parsing failures surface as `invalid_request`.

use super::error::{DispatchError, DispatchResult};
use instructions_catalog::{
    Audience, BumpLevel, GroomMode, InstructionPatch, RawInstruction, Requirement, SearchFilter,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

pub(super) fn parse_params<T: DeserializeOwned>(
    action: &str,
    params: Map<String, Value>,
) -> DispatchResult<T> {
    serde_json::from_value(Value::Object(params)).map_err(|err| {
        DispatchError::invalid_request(format!("Invalid parameters for '{action}': {err}"))
    })
}

pub(super) fn parse_entry(value: Value) -> DispatchResult<RawInstruction> {
    if !value.is_object() {
        return Err(DispatchError::invalid_request(
            "Instruction entry must be a JSON object",
        ));
    }
    serde_json::from_value(value)
        .map_err(|err| DispatchError::invalid_request(format!("Invalid instruction entry: {err}")))
}

#[derive(Debug, Deserialize)]
pub(super) struct IdParams {
    pub id: String,
}

/// `entry` may be given explicitly or its fields inlined next to `overwrite`/`lax`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AddParams {
    #[serde(default)]
    pub entry: Option<Value>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub lax: bool,
    #[serde(flatten)]
    pub inline: Map<String, Value>,
}

impl AddParams {
    pub fn take_entry(&mut self) -> DispatchResult<RawInstruction> {
        match self.entry.take() {
            Some(entry) => parse_entry(entry),
            None if !self.inline.is_empty() => {
                parse_entry(Value::Object(std::mem::take(&mut self.inline)))
            }
            None => Err(DispatchError::invalid_request("add requires 'entry'")),
        }
    }
}

/// Patch fields may be nested under `patch` or given inline; inline wins. Unknown inline keys
/// are rejected like unknown `patch` keys.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UpdateParams {
    pub id: String,
    #[serde(default)]
    pub patch: InstructionPatch,
    #[serde(default)]
    pub expected_source_hash: Option<String>,
    #[serde(default)]
    pub bump: Option<BumpLevel>,
    #[serde(default)]
    pub change_summary: Option<String>,
    #[serde(flatten)]
    pub inline: Map<String, Value>,
}

impl UpdateParams {
    pub fn take_patch(&mut self) -> DispatchResult<InstructionPatch> {
        let nested = std::mem::take(&mut self.patch);
        if self.inline.is_empty() {
            return Ok(nested);
        }
        let mut merged = match serde_json::to_value(&nested) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(err) => {
                return Err(DispatchError::invalid_request(format!(
                    "Invalid update patch: {err}"
                )))
            }
        };
        merged.extend(
            std::mem::take(&mut self.inline)
                .into_iter()
                .filter(|(_, value)| !value.is_null()),
        );
        parse_params("update", merged)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(super) struct ImportParams {
    pub entries: Vec<Value>,
    pub overwrite: bool,
    pub lax: bool,
}

/// Shared by `list` (filters only) and `search`/`query` (text plus filters).
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(super) struct FilterParams {
    #[serde(alias = "query", alias = "text")]
    pub q: Option<String>,
    pub category: Option<String>,
    pub audience: Option<String>,
    pub requirement: Option<String>,
    pub limit: Option<usize>,
}

impl FilterParams {
    pub fn filter(&self) -> DispatchResult<SearchFilter> {
        let audience = match self.audience.as_deref() {
            Some(raw) => Some(Audience::parse(raw).ok_or_else(|| {
                DispatchError::invalid_request(format!("Unknown audience '{raw}'"))
            })?),
            None => None,
        };
        let requirement = match self.requirement.as_deref() {
            Some(raw) => Some(Requirement::parse(raw).ok_or_else(|| {
                DispatchError::invalid_request(format!("Unknown requirement '{raw}'"))
            })?),
            None => None,
        };
        Ok(SearchFilter {
            category: self
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            audience,
            requirement,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(super) struct DiffParams {
    pub client_hash: Option<String>,
    pub known: Vec<KnownEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct KnownEntry {
    pub id: String,
    #[serde(default)]
    pub source_hash: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ExportParams {
    pub ids: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct BatchParams {
    #[serde(alias = "operations")]
    pub ops: Vec<Value>,
}

/// Flags may be nested under `mode` or given inline; inline wins.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(super) struct GroomParams {
    pub mode: Option<GroomMode>,
    pub dry_run: Option<bool>,
    pub merge_duplicates: Option<bool>,
    pub remove_deprecated: Option<bool>,
}

impl GroomParams {
    pub fn resolve(&self) -> GroomMode {
        let base = self.mode.unwrap_or_default();
        GroomMode {
            dry_run: self.dry_run.unwrap_or(base.dry_run),
            merge_duplicates: self.merge_duplicates.unwrap_or(base.merge_duplicates),
            remove_deprecated: self.remove_deprecated.unwrap_or(base.remove_deprecated),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub(super) struct GovernancePatch {
    pub owner: Option<String>,
    pub status: Option<String>,
    pub priority_tier: Option<String>,
}

/// Patch fields may be nested under `patch` or given inline; inline wins.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GovernanceUpdateParams {
    pub id: String,
    #[serde(default)]
    pub patch: GovernancePatch,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority_tier: Option<String>,
    #[serde(default)]
    pub bump: Option<BumpLevel>,
    #[serde(default)]
    pub change_summary: Option<String>,
}

impl GovernanceUpdateParams {
    pub fn instruction_patch(&self) -> InstructionPatch {
        InstructionPatch {
            owner: self.owner.clone().or_else(|| self.patch.owner.clone()),
            status: self.status.clone().or_else(|| self.patch.status.clone()),
            priority_tier: self
                .priority_tier
                .clone()
                .or_else(|| self.patch.priority_tier.clone()),
            ..InstructionPatch::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn add_accepts_inline_entry_fields() {
        let mut params: AddParams =
            parse_params("add", object(json!({ "id": "demo1", "body": "Hello", "lax": true })))
                .expect("parse");
        assert!(params.lax);
        let raw = params.take_entry().expect("entry");
        assert_eq!(raw.id.as_deref(), Some("demo1"));
        assert_eq!(raw.body.as_deref(), Some("Hello"));
    }

    #[test]
    fn add_without_entry_is_invalid() {
        let mut params: AddParams =
            parse_params("add", object(json!({ "overwrite": true }))).expect("parse");
        let err = params.take_entry().expect_err("missing entry");
        assert_eq!(err.code, "invalid_request");
    }

    #[test]
    fn groom_inline_flags_override_mode() {
        let params: GroomParams = parse_params(
            "groom",
            object(json!({ "mode": { "dryRun": true, "mergeDuplicates": true }, "dryRun": false })),
        )
        .expect("parse");
        let mode = params.resolve();
        assert!(!mode.dry_run);
        assert!(mode.merge_duplicates);
        assert!(!mode.remove_deprecated);
    }

    #[test]
    fn unknown_filter_values_are_rejected() {
        let params = FilterParams {
            audience: Some("everyone".into()),
            ..FilterParams::default()
        };
        assert_eq!(params.filter().expect_err("bad audience").code, "invalid_request");
    }

    #[test]
    fn update_accepts_inline_patch_fields() {
        let mut params: UpdateParams = parse_params(
            "update",
            object(json!({
                "id": "demo1",
                "patch": { "body": "nested", "owner": "docs" },
                "body": "inline",
                "expectedSourceHash": "abc",
            })),
        )
        .expect("parse");
        assert_eq!(params.expected_source_hash.as_deref(), Some("abc"));
        let patch = params.take_patch().expect("patch");
        assert_eq!(patch.body.as_deref(), Some("inline"));
        assert_eq!(patch.owner.as_deref(), Some("docs"));
    }

    #[test]
    fn update_rejects_unknown_inline_fields() {
        let mut params: UpdateParams =
            parse_params("update", object(json!({ "id": "demo1", "bdy": "typo" })))
                .expect("parse");
        let err = params.take_patch().expect_err("unknown field");
        assert_eq!(err.code, "invalid_request");
    }

    #[test]
    fn missing_id_is_invalid_request() {
        let err = parse_params::<IdParams>("get", Map::new()).expect_err("missing id");
        assert_eq!(err.code, "invalid_request");
    }
}
