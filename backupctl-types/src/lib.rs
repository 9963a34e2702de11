//! Shared DTOs for the backupctl workspace.
//!
//! # Design constraints
//! - Targets, policies and selections are resolved once per run and never
//!   mutated afterwards.
//! - Snapshots belong to the backend; these types only describe what the last
//!   query returned.
//! - Everything here is plain data: no I/O, no process handling.

pub mod retention;
pub mod run;
pub mod selection;
pub mod snapshot;
pub mod target;

pub use retention::{ForgetSpec, KeepRule, RetentionPolicy};
pub use run::{Operation, RunResult, Stage};
pub use selection::FileSelection;
pub use snapshot::Snapshot;
pub use target::{CredentialsRef, RepositoryTarget, TargetKind};
