use crate::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const INSTRUCTION_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_PRIORITY: u8 = 50;
pub const MAX_ID_LEN: usize = 120;

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Case-insensitive parse of the wire label.
            pub fn parse(raw: &str) -> Option<Self> {
                let raw = raw.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(raw))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Who an instruction is addressed to.
    Audience {
        Individual => "individual",
        Group => "group",
        All => "all",
    }
);

string_enum!(
    Requirement {
        Mandatory => "mandatory",
        Critical => "critical",
        Recommended => "recommended",
        Optional => "optional",
        Deprecated => "deprecated",
    }
);

string_enum!(
    InstructionStatus {
        Draft => "draft",
        Review => "review",
        Approved => "approved",
        Deprecated => "deprecated",
    }
);

string_enum!(
    Classification {
        Public => "public",
        Internal => "internal",
        Restricted => "restricted",
    }
);

string_enum!(
    /// Review urgency bucket; P1 is the most urgent.
    PriorityTier {
        P1 => "P1",
        P2 => "P2",
        P3 => "P3",
        P4 => "P4",
    }
);

impl PriorityTier {
    pub fn default_review_interval_days(self) -> u32 {
        match self {
            PriorityTier::P1 => 30,
            PriorityTier::P2 => 60,
            PriorityTier::P3 => 90,
            PriorityTier::P4 => 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub version: String,
    pub changed_at: String,
    pub summary: String,
}

/// Instruction record as found on disk or supplied by a caller.
///
/// Every field is optional and loosely typed; `classify::normalize` turns it into an
/// [`InstructionEntry`]. `sourceHash` and `riskScore` are accepted but never trusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawInstruction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reviewed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_review_due: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_interval_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_log: Option<Vec<ChangeLogEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Canonical instruction record. One JSON file per entry, named `<id>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionEntry {
    pub id: String,
    pub title: String,
    pub body: String,
    pub priority: u8,
    pub audience: Audience,
    pub requirement: Requirement,
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub version: String,
    pub status: InstructionStatus,
    pub priority_tier: PriorityTier,
    pub classification: Classification,
    pub risk_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub team_ids: Vec<String>,
    pub last_reviewed_at: String,
    pub next_review_due: String,
    pub review_interval_days: u32,
    pub semantic_summary: String,
    pub change_log: Vec<ChangeLogEntry>,
    pub source_hash: String,
    pub schema_version: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl InstructionEntry {
    pub fn to_raw(&self) -> RawInstruction {
        RawInstruction {
            id: Some(self.id.clone()),
            title: Some(self.title.clone()),
            body: Some(self.body.clone()),
            priority: Some(i64::from(self.priority)),
            audience: Some(self.audience.as_str().to_string()),
            requirement: Some(self.requirement.as_str().to_string()),
            categories: Some(self.categories.clone()),
            owner: self.owner.clone(),
            version: Some(self.version.clone()),
            status: Some(self.status.as_str().to_string()),
            priority_tier: Some(self.priority_tier.as_str().to_string()),
            classification: Some(self.classification.as_str().to_string()),
            risk_score: Some(self.risk_score),
            workspace_id: self.workspace_id.clone(),
            user_id: self.user_id.clone(),
            team_ids: (!self.team_ids.is_empty()).then(|| self.team_ids.clone()),
            last_reviewed_at: Some(self.last_reviewed_at.clone()),
            next_review_due: Some(self.next_review_due.clone()),
            review_interval_days: Some(self.review_interval_days),
            semantic_summary: Some(self.semantic_summary.clone()),
            change_log: Some(self.change_log.clone()),
            source_hash: Some(self.source_hash.clone()),
            schema_version: Some(self.schema_version),
            created_at: Some(self.created_at.clone()),
            updated_at: Some(self.updated_at.clone()),
        }
    }

    /// Compares every caller-observable field, ignoring bookkeeping that a write refreshes
    /// (`updatedAt`, `changeLog`, `version`).
    pub fn same_observable_fields(&self, other: &InstructionEntry) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        for entry in [&mut a, &mut b] {
            entry.updated_at.clear();
            entry.change_log.clear();
            entry.version.clear();
        }
        a == b
    }
}

/// Ids are slugs: ASCII lowercase letters, digits, `-`, `_` and `.`, starting with a letter or
/// digit. They double as file stems, so separators and `..` are rejected.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && id.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')
        })
        && !id.contains("..");
    if valid {
        Ok(())
    } else {
        Err(CatalogError::InvalidId(id.to_string()))
    }
}
