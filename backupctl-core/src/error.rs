//! Error taxonomy for the backup lifecycle.
//!
//! - [`ConfigurationError`]: the run cannot start; no backend call is made.
//! - [`BackendError`]: an engine invocation failed.
//! - [`PolicyError`]: the retention policy is unsafe to prune with.
//! - [`LockError`]: the repository is held by another (possibly dead) process.
//!
//! Every variant maps to a process exit code via [`RunError::exit_code`].

use backupctl_types::{Operation, Stage};
use camino::Utf8PathBuf;
use thiserror::Error;

pub use backupctl_policy::PolicyError;

/// Restic: repository does not exist.
pub const EXIT_REPOSITORY_MISSING: i32 = 10;
/// Restic: failed to lock repository.
pub const EXIT_LOCKED: i32 = 11;

/// The run's inputs do not describe exactly one usable repository or file set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error(
        "no repository configured: set the sftp host, user and directory, or a mounted local directory"
    )]
    Unresolvable,

    #[error("incomplete sftp configuration: missing {}", .missing.join(", "))]
    IncompleteRemote { missing: Vec<&'static str> },

    #[error("mount point {path} is not an accessible directory")]
    MountPointUnavailable { path: Utf8PathBuf },

    #[error("invalid repository name {name:?}: {reason}")]
    InvalidRepositoryName { name: String, reason: &'static str },

    #[error("password file {path} does not exist")]
    PasswordFileMissing { path: Utf8PathBuf },

    #[error("no include list configured for backup")]
    MissingIncludeList,

    #[error("include list {path} does not name any path")]
    EmptyIncludeList { path: Utf8PathBuf },

    #[error("cannot read {what} {path}: {message}")]
    Unreadable {
        what: &'static str,
        path: Utf8PathBuf,
        message: String,
    },

    #[error("no restore target configured")]
    MissingRestoreTarget,
}

/// An engine invocation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The engine ran and reported failure (or died without an exit code).
    #[error("{operation} failed{}: {stderr_excerpt}", describe_exit(.exit_code))]
    Failed {
        operation: Operation,
        exit_code: Option<i32>,
        stderr_excerpt: String,
    },

    /// The engine could not be started at all.
    #[error("could not run {program} for {operation}: {message}")]
    Spawn {
        operation: Operation,
        program: String,
        message: String,
    },

    /// The engine succeeded but its structured output was unusable.
    #[error("{operation} produced unreadable output: {message}")]
    MalformedOutput { operation: Operation, message: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map(|c| format!(" with exit code {c}")).unwrap_or_default()
}

impl BackendError {
    pub fn operation(&self) -> Operation {
        match self {
            BackendError::Failed { operation, .. }
            | BackendError::Spawn { operation, .. }
            | BackendError::MalformedOutput { operation, .. } => *operation,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            BackendError::Failed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    pub fn is_lock(&self) -> bool {
        self.exit_code() == Some(EXIT_LOCKED)
    }

    pub fn is_repository_missing(&self) -> bool {
        self.exit_code() == Some(EXIT_REPOSITORY_MISSING)
    }
}

/// The repository is locked. Surfaced separately so an operator can decide to
/// run the explicit unlock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "repository is locked during {operation} (run --unlock if no other backup is active): {stderr_excerpt}"
)]
pub struct LockError {
    pub operation: Operation,
    pub stderr_excerpt: String,
}

/// Any reason a run or operation stops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("backend error: {0}")]
    Backend(BackendError),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("snapshot {reference:?} not found in repository")]
    SnapshotNotFound { reference: String },
}

impl From<BackendError> for RunError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Failed {
                operation,
                exit_code: Some(EXIT_LOCKED),
                stderr_excerpt,
            } => RunError::Lock(LockError {
                operation,
                stderr_excerpt,
            }),
            other => RunError::Backend(other),
        }
    }
}

impl RunError {
    /// Process exit code for this error. Engine exit codes pass through.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Configuration(_) => 1,
            RunError::SnapshotNotFound { .. } => 1,
            RunError::Policy(_) => 2,
            RunError::Lock(_) => EXIT_LOCKED as u8,
            RunError::Backend(err) => err
                .exit_code()
                .and_then(|code| u8::try_from(code).ok())
                .filter(|code| *code != 0)
                .unwrap_or(1),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, RunError::Configuration(_))
    }
}

/// A lifecycle stopped at `stage`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} stage failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: RunError,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(code: Option<i32>) -> BackendError {
        BackendError::Failed {
            operation: Operation::Backup,
            exit_code: code,
            stderr_excerpt: "boom".to_string(),
        }
    }

    #[test]
    fn backend_exit_code_passes_through() {
        let err = RunError::from(failed(Some(3)));
        assert!(matches!(err, RunError::Backend(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn missing_or_out_of_range_exit_code_maps_to_one() {
        assert_eq!(RunError::from(failed(None)).exit_code(), 1);
        assert_eq!(RunError::from(failed(Some(-9))).exit_code(), 1);
        assert_eq!(RunError::from(failed(Some(300))).exit_code(), 1);
    }

    #[test]
    fn exit_code_eleven_becomes_lock_error() {
        let err = RunError::from(failed(Some(EXIT_LOCKED)));
        assert!(matches!(err, RunError::Lock(_)));
        assert_eq!(err.exit_code(), 11);
        assert!(err.to_string().contains("--unlock"));
    }

    #[test]
    fn policy_and_configuration_codes() {
        assert_eq!(RunError::from(PolicyError::Degenerate).exit_code(), 2);
        let cfg = RunError::from(ConfigurationError::Unresolvable);
        assert!(cfg.is_configuration());
        assert_eq!(cfg.exit_code(), 1);
    }

    #[test]
    fn backend_display_includes_exit_code_and_excerpt() {
        let msg = failed(Some(3)).to_string();
        assert_eq!(msg, "backup failed with exit code 3: boom");
        assert_eq!(failed(None).to_string(), "backup failed: boom");
    }

    #[test]
    fn incomplete_remote_lists_missing_fields() {
        let err = ConfigurationError::IncompleteRemote {
            missing: vec!["user", "directory"],
        };
        assert_eq!(
            err.to_string(),
            "incomplete sftp configuration: missing user, directory"
        );
    }

    #[test]
    fn stage_failure_names_stage() {
        let failure = StageFailure {
            stage: Stage::Preparing,
            error: RunError::from(failed(Some(1))),
        };
        assert!(failure.to_string().starts_with("preparing stage failed"));
    }
}
