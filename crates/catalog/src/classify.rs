//! Classification and normalization of raw instruction records.
//!
//! [`normalize`] is deterministic for a given [`NormalizeOptions`] (the clock is an input, not
//! a side effect) and idempotent: feeding its output back in yields the same entry.

use crate::entry::{
    validate_id, Audience, ChangeLogEntry, Classification, InstructionEntry, InstructionStatus,
    PriorityTier, RawInstruction, Requirement, DEFAULT_PRIORITY, DEFAULT_VERSION,
    INSTRUCTION_SCHEMA_VERSION,
};
use crate::hashing::source_hash;
use crate::{CatalogError, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::collections::BTreeSet;

const MAX_SUMMARY_CHARS: usize = 200;
const MAX_DERIVED_TITLE_CHARS: usize = 80;
/// Upper bound for `reviewIntervalDays`, ten years.
pub const MAX_REVIEW_INTERVAL_DAYS: u32 = 3650;
const INITIAL_CHANGE_SUMMARY: &str = "Initial version";

const WORKSPACE_SCOPE_PREFIX: &str = "scope:workspace:";
const USER_SCOPE_PREFIX: &str = "scope:user:";
const TEAM_SCOPE_PREFIX: &str = "scope:team:";

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Coerce invalid optional values to defaults instead of rejecting them.
    pub lax: bool,
    /// Clock used for any timestamp the record is missing.
    pub now: DateTime<Utc>,
}

impl NormalizeOptions {
    pub fn strict(now: DateTime<Utc>) -> Self {
        Self { lax: false, now }
    }

    pub fn lax(now: DateTime<Utc>) -> Self {
        Self { lax: true, now }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryScopes {
    pub categories: Vec<String>,
    pub workspace_id: Option<String>,
    pub user_id: Option<String>,
    pub team_ids: Vec<String>,
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn derive_priority_tier(priority: u8, requirement: Requirement) -> PriorityTier {
    if priority <= 20 || matches!(requirement, Requirement::Mandatory | Requirement::Critical) {
        PriorityTier::P1
    } else if priority <= 40 {
        PriorityTier::P2
    } else if priority <= 70 {
        PriorityTier::P3
    } else {
        PriorityTier::P4
    }
}

/// Higher `priority` numbers mean less urgent instructions, so for a fixed requirement the
/// score strictly decreases as priority grows.
pub fn risk_score(priority: u8, requirement: Requirement) -> u32 {
    let weight = match requirement {
        Requirement::Critical => 100,
        Requirement::Mandatory => 80,
        Requirement::Recommended => 50,
        Requirement::Optional => 20,
        Requirement::Deprecated => 0,
    };
    weight + (101 - u32::from(priority.clamp(1, 100)))
}

/// Lowercases, dedupes and sorts categories, lifting `scope:*` pseudo-categories into
/// dedicated fields.
pub fn normalize_categories(raw: &[String]) -> CategoryScopes {
    let mut categories = BTreeSet::new();
    let mut team_ids = BTreeSet::new();
    let mut scopes = CategoryScopes::default();

    for category in raw {
        let lowered = category.trim().to_lowercase();
        if lowered.is_empty() {
            continue;
        }
        if let Some(value) = lowered.strip_prefix(WORKSPACE_SCOPE_PREFIX) {
            if !value.trim().is_empty() {
                scopes.workspace_id = Some(value.trim().to_string());
            }
        } else if let Some(value) = lowered.strip_prefix(USER_SCOPE_PREFIX) {
            if !value.trim().is_empty() {
                scopes.user_id = Some(value.trim().to_string());
            }
        } else if let Some(value) = lowered.strip_prefix(TEAM_SCOPE_PREFIX) {
            if !value.trim().is_empty() {
                team_ids.insert(value.trim().to_string());
            }
        } else {
            categories.insert(lowered);
        }
    }

    scopes.categories = categories.into_iter().collect();
    scopes.team_ids = team_ids.into_iter().collect();
    scopes
}

pub fn normalize(raw: &RawInstruction, opts: &NormalizeOptions) -> Result<InstructionEntry> {
    let id = non_empty(raw.id.as_deref())
        .ok_or_else(|| CatalogError::validation("missing required field 'id'"))?
        .to_string();
    validate_id(&id)?;

    let body = non_empty(raw.body.as_deref())
        .ok_or_else(|| CatalogError::validation(format!("instruction '{id}' has an empty body")))?
        .to_string();

    let title = non_empty(raw.title.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| derived_title(&body));

    let priority = normalize_priority(raw.priority, opts.lax)?;
    let audience = parse_or_default(
        raw.audience.as_deref(),
        "audience",
        Audience::All,
        opts.lax,
        Audience::parse,
    )?;
    let requirement = parse_or_default(
        raw.requirement.as_deref(),
        "requirement",
        Requirement::Optional,
        opts.lax,
        Requirement::parse,
    )?;
    let status = parse_or_default(
        raw.status.as_deref(),
        "status",
        InstructionStatus::Approved,
        opts.lax,
        InstructionStatus::parse,
    )?;
    let classification = parse_or_default(
        raw.classification.as_deref(),
        "classification",
        Classification::Internal,
        opts.lax,
        Classification::parse,
    )?;

    let derived_tier = derive_priority_tier(priority, requirement);
    let priority_tier = match non_empty(raw.priority_tier.as_deref()) {
        None => derived_tier,
        Some(label) => match PriorityTier::parse(label) {
            Some(tier) => tier,
            None if opts.lax => derived_tier,
            None => {
                return Err(CatalogError::validation(format!(
                    "invalid priorityTier '{label}' (expected P1..P4)"
                )))
            }
        },
    };

    let scopes = normalize_categories(raw.categories.as_deref().unwrap_or_default());
    let workspace_id = scopes.workspace_id.or_else(|| lowered_non_empty(&raw.workspace_id));
    let user_id = scopes.user_id.or_else(|| lowered_non_empty(&raw.user_id));
    let team_ids: BTreeSet<String> = raw
        .team_ids
        .iter()
        .flatten()
        .filter_map(|team| non_empty(Some(team.as_str())).map(str::to_lowercase))
        .chain(scopes.team_ids)
        .collect();

    let version = normalize_version(raw.version.as_deref(), opts.lax)?;
    let owner = non_empty(raw.owner.as_deref()).map(str::to_string);

    let now = timestamp(opts.now);
    let created_at = non_empty(raw.created_at.as_deref())
        .map(str::to_string)
        .unwrap_or(now);
    let updated_at = non_empty(raw.updated_at.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| created_at.clone());
    let last_reviewed_at = non_empty(raw.last_reviewed_at.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| created_at.clone());
    let review_interval_days =
        normalize_review_interval(raw.review_interval_days, priority_tier, opts.lax)?;
    let next_review_due = match non_empty(raw.next_review_due.as_deref()) {
        Some(due) => due.to_string(),
        None => {
            let base = DateTime::parse_from_rfc3339(&last_reviewed_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(opts.now);
            let due = base
                .checked_add_signed(Duration::days(i64::from(review_interval_days)))
                .ok_or_else(|| {
                    CatalogError::validation(format!(
                        "review due date for '{id}' is out of range"
                    ))
                })?;
            timestamp(due)
        }
    };

    let semantic_summary = non_empty(raw.semantic_summary.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| derived_summary(&body));

    let change_log = match raw.change_log.as_ref().filter(|log| !log.is_empty()) {
        Some(log) => log.clone(),
        None => vec![ChangeLogEntry {
            version: version.clone(),
            changed_at: created_at.clone(),
            summary: INITIAL_CHANGE_SUMMARY.to_string(),
        }],
    };

    Ok(InstructionEntry {
        source_hash: source_hash(&body),
        risk_score: risk_score(priority, requirement),
        id,
        title,
        body,
        priority,
        audience,
        requirement,
        categories: scopes.categories,
        owner,
        version,
        status,
        priority_tier,
        classification,
        workspace_id,
        user_id,
        team_ids: team_ids.into_iter().collect(),
        last_reviewed_at,
        next_review_due,
        review_interval_days,
        semantic_summary,
        change_log,
        schema_version: INSTRUCTION_SCHEMA_VERSION,
        created_at,
        updated_at,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn lowered_non_empty(value: &Option<String>) -> Option<String> {
    non_empty(value.as_deref()).map(str::to_lowercase)
}

fn normalize_priority(raw: Option<i64>, lax: bool) -> Result<u8> {
    match raw {
        None => Ok(DEFAULT_PRIORITY),
        Some(value) if (1..=100).contains(&value) => Ok(value as u8),
        Some(value) if lax => Ok(value.clamp(1, 100) as u8),
        Some(value) => Err(CatalogError::validation(format!(
            "priority {value} is out of range (1..=100)"
        ))),
    }
}

fn normalize_review_interval(raw: Option<u32>, tier: PriorityTier, lax: bool) -> Result<u32> {
    match raw {
        None | Some(0) => Ok(tier.default_review_interval_days()),
        Some(days) if days <= MAX_REVIEW_INTERVAL_DAYS => Ok(days),
        Some(_) if lax => Ok(MAX_REVIEW_INTERVAL_DAYS),
        Some(days) => Err(CatalogError::validation(format!(
            "reviewIntervalDays {days} is out of range (1..={MAX_REVIEW_INTERVAL_DAYS})"
        ))),
    }
}

fn normalize_version(raw: Option<&str>, lax: bool) -> Result<String> {
    match non_empty(raw) {
        None => Ok(DEFAULT_VERSION.to_string()),
        Some(version) if semver::Version::parse(version).is_ok() => Ok(version.to_string()),
        Some(_) if lax => Ok(DEFAULT_VERSION.to_string()),
        Some(version) => Err(CatalogError::validation(format!(
            "version '{version}' is not a semantic version"
        ))),
    }
}

fn parse_or_default<T>(
    raw: Option<&str>,
    field: &str,
    default: T,
    lax: bool,
    parse: fn(&str) -> Option<T>,
) -> Result<T> {
    let Some(label) = non_empty(raw) else {
        return Ok(default);
    };
    match parse(label) {
        Some(value) => Ok(value),
        None if lax => Ok(default),
        None => Err(CatalogError::validation(format!(
            "invalid {field} '{label}'"
        ))),
    }
}

/// Title [`normalize`] derives when none is given.
pub fn derived_title(body: &str) -> String {
    first_line_summary(body, MAX_DERIVED_TITLE_CHARS)
}

/// Semantic summary [`normalize`] derives when none is given.
pub fn derived_summary(body: &str) -> String {
    first_line_summary(body, MAX_SUMMARY_CHARS)
}

fn first_line_summary(body: &str, max_chars: usize) -> String {
    let line = body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    line.chars().take(max_chars).collect::<String>().trim_end().to_string()
}
