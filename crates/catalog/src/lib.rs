//! # Instructions Catalog
//!
//! File-backed catalog of governed instruction records.
//!
//! ## Layout
//!
//! ```text
//! INSTRUCTIONS_DIR/
//!     ├── <id>.json      one pretty-printed record per instruction
//!     └── .<id>.json.tmp-<pid>-<seq>   transient, only while a write is in flight
//! ```
//!
//! ## Flow
//!
//! ```text
//! RecordStore (raw JSON, atomic writes)
//!     │
//!     ├──> classify::normalize ──> InstructionEntry (canonical, hashed)
//!     │
//!     ├──> CatalogContext ──> CatalogSnapshot {entries, hash, governanceHash}
//!     │
//!     ├──> versioning (update / replacement, version bumps, change log)
//!     │
//!     └──> groom (repair, normalize, merge, prune)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use instructions_catalog::{CatalogContext, RecordStore};
//!
//! fn main() -> instructions_catalog::Result<()> {
//!     let mut ctx = CatalogContext::new(RecordStore::new("./instructions"));
//!     let snapshot = ctx.ensure_loaded()?;
//!     println!("{} instructions, hash {}", snapshot.len(), snapshot.hash);
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod context;
pub mod entry;
mod error;
pub mod governance;
pub mod groom;
pub mod hashing;
pub mod search;
pub mod store;
pub mod versioning;

pub use classify::{normalize, timestamp, NormalizeOptions};
pub use context::{probe_signature, CatalogContext, CatalogSnapshot, DirSignature};
pub use entry::{
    validate_id, Audience, ChangeLogEntry, Classification, InstructionEntry, InstructionStatus,
    PriorityTier, RawInstruction, Requirement, INSTRUCTION_SCHEMA_VERSION,
};
pub use error::{CatalogError, Result};
pub use governance::{
    compute_catalog_hash, compute_governance_hash, governance_projections, validate_governance,
    GovernanceProjection,
};
pub use groom::{groom, GroomMode, GroomResult};
pub use hashing::source_hash;
pub use search::{search, SearchFilter, SearchHit};
pub use store::{LoadError, OsFs, RecordStore, RetryPolicy, SaveReport, StoreFs};
pub use versioning::{
    apply_replacement, apply_update, commit_update, BumpLevel, InstructionPatch, UpdateOptions,
    UpdateOutcome,
};
