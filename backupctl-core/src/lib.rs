//! Embeddable core library for backupctl.
//!
//! Provides a clap-free entry point that can be linked into any host process
//! that schedules backups.
//!
//! # Port traits
//!
//! Engine access is abstracted behind the traits in [`ports`]:
//! - [`Backend`](ports::Backend): one method per engine invocation
//! - [`ProcessRunner`](ports::ProcessRunner): run a program and capture output
//!
//! The [`adapters`] module provides the restic implementation and an
//! in-memory engine.
//!
//! # Entry points
//!
//! - [`resolve_and_dispatch`](commands::resolve_and_dispatch): run one command
//! - [`Orchestrator`](lifecycle::Orchestrator): drive a backend directly

pub mod adapters;
pub mod commands;
pub mod error;
pub mod lifecycle;
pub mod locator;
pub mod ports;
pub mod selection;
pub mod settings;

pub use commands::{Command, CommandError, CommandOutcome, resolve_and_dispatch};
pub use error::{BackendError, ConfigurationError, LockError, PolicyError, RunError, StageFailure};
pub use lifecycle::{LifecycleReport, Orchestrator};
pub use settings::{RepositoryConfig, RunSettings};

// Re-export the shared types so embedders don't need backupctl-types directly.
pub use backupctl_types::{
    CredentialsRef, FileSelection, ForgetSpec, KeepRule, Operation, RepositoryTarget,
    RetentionPolicy, RunResult, Snapshot, Stage, TargetKind,
};
