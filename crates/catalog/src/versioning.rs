//! Version bumps, change-log entries and optimistic concurrency for instruction mutations.

use crate::classify::{
    derived_summary, derived_title, normalize, timestamp, NormalizeOptions,
};
use crate::entry::{ChangeLogEntry, InstructionEntry, RawInstruction};
use crate::governance::validate_governance;
use crate::store::RecordStore;
use crate::{CatalogError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpLevel {
    Patch,
    Minor,
    Major,
    None,
    /// `patch` when content changed, `none` when only governance metadata changed.
    #[default]
    Auto,
}

/// Partial update. Absent fields keep their current value; an empty `owner` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct InstructionPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub priority: Option<i64>,
    pub audience: Option<String>,
    pub requirement: Option<String>,
    pub categories: Option<Vec<String>>,
    pub owner: Option<String>,
    pub status: Option<String>,
    pub priority_tier: Option<String>,
    pub classification: Option<String>,
    pub semantic_summary: Option<String>,
    pub review_interval_days: Option<u32>,
    pub last_reviewed_at: Option<String>,
    pub next_review_due: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub expected_source_hash: Option<String>,
    pub bump: BumpLevel,
    pub change_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub id: String,
    pub changed: bool,
    pub conflict: bool,
    pub version: String,
    pub previous_version: String,
    pub source_hash: String,
    pub bumped: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<&'static str>,
    /// The entry to persist when `changed` is true.
    #[serde(skip)]
    pub entry: Option<InstructionEntry>,
}

impl UpdateOutcome {
    fn unchanged(current: &InstructionEntry, conflict: bool) -> Self {
        Self {
            id: current.id.clone(),
            changed: false,
            conflict,
            version: current.version.clone(),
            previous_version: current.version.clone(),
            source_hash: current.source_hash.clone(),
            bumped: false,
            changed_fields: Vec::new(),
            entry: None,
        }
    }
}

const CONTENT_FIELDS: &[&str] = &[
    "title",
    "body",
    "priority",
    "audience",
    "requirement",
    "categories",
    "workspaceId",
    "userId",
    "teamIds",
];

/// Bumps `version` by `level`, dropping pre-release and build metadata. An unparsable version
/// restarts from `1.0.0`; a component that would overflow is a validation error.
pub fn bump_version(version: &str, level: BumpLevel) -> Result<String> {
    let mut parsed =
        semver::Version::parse(version).unwrap_or_else(|_| semver::Version::new(1, 0, 0));
    let overflow = || CatalogError::validation(format!("version '{version}' cannot be bumped"));
    match level {
        BumpLevel::None | BumpLevel::Auto => return Ok(version.to_string()),
        BumpLevel::Patch => parsed.patch = parsed.patch.checked_add(1).ok_or_else(overflow)?,
        BumpLevel::Minor => {
            parsed.minor = parsed.minor.checked_add(1).ok_or_else(overflow)?;
            parsed.patch = 0;
        }
        BumpLevel::Major => {
            parsed.major = parsed.major.checked_add(1).ok_or_else(overflow)?;
            parsed.minor = 0;
            parsed.patch = 0;
        }
    }
    parsed.pre = semver::Prerelease::EMPTY;
    parsed.build = semver::BuildMetadata::EMPTY;
    Ok(parsed.to_string())
}

/// Names of the caller-visible fields that differ between two entries, in a fixed order.
pub fn changed_fields(before: &InstructionEntry, after: &InstructionEntry) -> Vec<&'static str> {
    let checks: [(&'static str, bool); 17] = [
        ("title", before.title != after.title),
        ("body", before.body != after.body),
        ("priority", before.priority != after.priority),
        ("audience", before.audience != after.audience),
        ("requirement", before.requirement != after.requirement),
        ("categories", before.categories != after.categories),
        ("workspaceId", before.workspace_id != after.workspace_id),
        ("userId", before.user_id != after.user_id),
        ("teamIds", before.team_ids != after.team_ids),
        ("owner", before.owner != after.owner),
        ("status", before.status != after.status),
        ("priorityTier", before.priority_tier != after.priority_tier),
        ("classification", before.classification != after.classification),
        ("semanticSummary", before.semantic_summary != after.semantic_summary),
        ("reviewIntervalDays", before.review_interval_days != after.review_interval_days),
        ("lastReviewedAt", before.last_reviewed_at != after.last_reviewed_at),
        ("nextReviewDue", before.next_review_due != after.next_review_due),
    ];
    checks
        .into_iter()
        .filter_map(|(name, differs)| differs.then_some(name))
        .collect()
}

/// Applies `patch` to `current` without touching the disk.
///
/// A stale `expected_source_hash` yields `conflict`; a patch with no observable delta yields
/// `changed: false` and no version bump.
pub fn apply_update(
    current: &InstructionEntry,
    patch: &InstructionPatch,
    opts: &UpdateOptions,
    now: DateTime<Utc>,
) -> Result<UpdateOutcome> {
    if let Some(expected) = opts
        .expected_source_hash
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
    {
        if expected != current.source_hash {
            log::info!(
                "Update of '{}' rejected: expected sourceHash {expected}, found {}",
                current.id,
                current.source_hash
            );
            return Ok(UpdateOutcome::unchanged(current, true));
        }
    }

    let mut raw = current.to_raw();
    merge_patch(&mut raw, patch);
    if patch.body.is_some() {
        release_derived_text(&mut raw, current, patch);
    }
    let candidate = normalize(&raw, &NormalizeOptions::strict(now))?;
    validate_governance(&candidate)?;

    if candidate.same_observable_fields(current) {
        return Ok(UpdateOutcome::unchanged(current, false));
    }
    finish_revision(
        current,
        candidate,
        Revision::Bump(opts.bump),
        opts.change_summary.as_deref(),
        now,
    )
}

/// Full replacement of `current` by `replacement` (an `add` with `overwrite`).
///
/// `createdAt`, `lastReviewedAt` and the change log carry over unless the replacement supplies
/// them. An explicit, different `version` is kept as given; otherwise the version is bumped as
/// [`BumpLevel::Auto`] would.
pub fn apply_replacement(
    current: &InstructionEntry,
    replacement: &RawInstruction,
    lax: bool,
    now: DateTime<Utc>,
) -> Result<UpdateOutcome> {
    let mut raw = replacement.clone();
    raw.id = Some(current.id.clone());
    raw.created_at = raw.created_at.or_else(|| Some(current.created_at.clone()));
    raw.last_reviewed_at = raw
        .last_reviewed_at
        .or_else(|| Some(current.last_reviewed_at.clone()));
    let supplied_log = raw.change_log.as_ref().is_some_and(|log| !log.is_empty());
    if !supplied_log {
        raw.change_log = Some(current.change_log.clone());
    }
    let explicit_version = raw
        .version
        .as_deref()
        .map(str::trim)
        .is_some_and(|v| !v.is_empty());
    if !explicit_version {
        raw.version = Some(current.version.clone());
    }

    let opts = NormalizeOptions { lax, now };
    let candidate = normalize(&raw, &opts)?;
    validate_governance(&candidate)?;

    let version_changed = candidate.version != current.version;
    if candidate.same_observable_fields(current) && !version_changed {
        return Ok(UpdateOutcome::unchanged(current, false));
    }

    let revision = if version_changed {
        Revision::Explicit {
            log_supplied: supplied_log,
        }
    } else {
        Revision::Bump(BumpLevel::Auto)
    };
    finish_revision(current, candidate, revision, None, now)
}

/// Applies a patch and persists the result through `store` when it changed anything.
pub fn commit_update(
    store: &RecordStore,
    current: &InstructionEntry,
    patch: &InstructionPatch,
    opts: &UpdateOptions,
    now: DateTime<Utc>,
) -> Result<UpdateOutcome> {
    let outcome = apply_update(current, patch, opts, now)?;
    if let Some(entry) = outcome.entry.as_ref() {
        store.save(entry)?;
        log::info!(
            "Updated instruction '{}' {} -> {}",
            entry.id,
            outcome.previous_version,
            outcome.version
        );
    }
    Ok(outcome)
}

enum Revision {
    Bump(BumpLevel),
    Explicit { log_supplied: bool },
}

fn finish_revision(
    current: &InstructionEntry,
    mut candidate: InstructionEntry,
    revision: Revision,
    change_summary: Option<&str>,
    now: DateTime<Utc>,
) -> Result<UpdateOutcome> {
    let fields = changed_fields(current, &candidate);
    let (bumped, append_log) = match revision {
        Revision::Bump(level) => {
            let level = match level {
                BumpLevel::Auto if fields.iter().any(|f| CONTENT_FIELDS.contains(f)) => {
                    BumpLevel::Patch
                }
                BumpLevel::Auto => BumpLevel::None,
                other => other,
            };
            candidate.version = bump_version(&current.version, level)?;
            candidate.change_log = current.change_log.clone();
            (level != BumpLevel::None, true)
        }
        Revision::Explicit { log_supplied } => {
            let already_logged = log_supplied
                && candidate
                    .change_log
                    .last()
                    .is_some_and(|last| last.version == candidate.version);
            (false, !already_logged)
        }
    };

    let changed_at = timestamp(now);
    candidate.updated_at = changed_at.clone();
    if append_log {
        let summary = change_summary
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_summary(&fields));
        candidate.change_log.push(ChangeLogEntry {
            version: candidate.version.clone(),
            changed_at,
            summary,
        });
    }

    Ok(UpdateOutcome {
        id: candidate.id.clone(),
        changed: true,
        conflict: false,
        version: candidate.version.clone(),
        previous_version: current.version.clone(),
        source_hash: candidate.source_hash.clone(),
        bumped,
        changed_fields: fields,
        entry: Some(candidate),
    })
}

fn default_summary(fields: &[&str]) -> String {
    if fields.is_empty() {
        "Version updated".to_string()
    } else {
        format!("Updated {}", fields.join(", "))
    }
}

/// Title and summary that still match what the old body derives are re-derived from the new one.
fn release_derived_text(
    raw: &mut RawInstruction,
    current: &InstructionEntry,
    patch: &InstructionPatch,
) {
    if patch.title.is_none() && current.title == derived_title(&current.body) {
        raw.title = None;
    }
    if patch.semantic_summary.is_none()
        && current.semantic_summary == derived_summary(&current.body)
    {
        raw.semantic_summary = None;
    }
}

fn merge_patch(raw: &mut RawInstruction, patch: &InstructionPatch) {
    fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
        if let Some(value) = value {
            *slot = Some(value.clone());
        }
    }

    set(&mut raw.title, &patch.title);
    set(&mut raw.body, &patch.body);
    set(&mut raw.priority, &patch.priority);
    set(&mut raw.audience, &patch.audience);
    set(&mut raw.requirement, &patch.requirement);
    set(&mut raw.owner, &patch.owner);
    set(&mut raw.status, &patch.status);
    set(&mut raw.classification, &patch.classification);
    set(&mut raw.semantic_summary, &patch.semantic_summary);
    set(&mut raw.review_interval_days, &patch.review_interval_days);
    set(&mut raw.last_reviewed_at, &patch.last_reviewed_at);
    set(&mut raw.next_review_due, &patch.next_review_due);

    if let Some(categories) = &patch.categories {
        // Scope fields are re-derived from the new category list.
        raw.categories = Some(categories.clone());
        raw.workspace_id = None;
        raw.user_id = None;
        raw.team_ids = None;
    }

    if patch.priority_tier.is_some() {
        set(&mut raw.priority_tier, &patch.priority_tier);
    } else if patch.priority.is_some() || patch.requirement.is_some() {
        raw.priority_tier = None;
    }
    if (patch.last_reviewed_at.is_some() || patch.review_interval_days.is_some())
        && patch.next_review_due.is_none()
    {
        raw.next_review_due = None;
    }
}
