//! Port traits abstracting the backup engine and process execution away from
//! the lifecycle.

use crate::error::BackendError;
use backupctl_types::{FileSelection, ForgetSpec, RunResult, Snapshot};
use camino::Utf8Path;

/// Capabilities of a backup engine.
///
/// One method per engine invocation. Implementations translate typed inputs
/// into the engine's surface and its exit status plus structured output back
/// into typed results; any unsuccessful invocation is a [`BackendError`].
pub trait Backend {
    /// Create the repository. Calling this on an existing repository is a no-op.
    fn initialize(&self) -> Result<(), BackendError>;

    fn backup(&self, selection: &FileSelection) -> Result<Snapshot, BackendError>;

    fn check(&self, read_data: bool) -> Result<RunResult, BackendError>;

    fn stats(&self) -> Result<RunResult, BackendError>;

    fn list_files(&self, snapshot_ref: &str) -> Result<Vec<String>, BackendError>;

    /// All snapshots, oldest first, or `None` when the repository does not
    /// exist yet.
    fn list_snapshots(&self) -> Result<Option<Vec<Snapshot>>, BackendError>;

    fn prune(&self, spec: &ForgetSpec) -> Result<RunResult, BackendError>;

    fn restore(&self, snapshot_ref: &str, target: &Utf8Path) -> Result<RunResult, BackendError>;

    fn unlock(&self) -> Result<RunResult, BackendError>;

    fn repair(&self) -> Result<RunResult, BackendError>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn initialize(&self) -> Result<(), BackendError> {
        (**self).initialize()
    }

    fn backup(&self, selection: &FileSelection) -> Result<Snapshot, BackendError> {
        (**self).backup(selection)
    }

    fn check(&self, read_data: bool) -> Result<RunResult, BackendError> {
        (**self).check(read_data)
    }

    fn stats(&self) -> Result<RunResult, BackendError> {
        (**self).stats()
    }

    fn list_files(&self, snapshot_ref: &str) -> Result<Vec<String>, BackendError> {
        (**self).list_files(snapshot_ref)
    }

    fn list_snapshots(&self) -> Result<Option<Vec<Snapshot>>, BackendError> {
        (**self).list_snapshots()
    }

    fn prune(&self, spec: &ForgetSpec) -> Result<RunResult, BackendError> {
        (**self).prune(spec)
    }

    fn restore(&self, snapshot_ref: &str, target: &Utf8Path) -> Result<RunResult, BackendError> {
        (**self).restore(snapshot_ref, target)
    }

    fn unlock(&self) -> Result<RunResult, BackendError> {
        (**self).unlock()
    }

    fn repair(&self) -> Result<RunResult, BackendError> {
        (**self).repair()
    }
}

/// Captured result of one external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs a program to completion and captures its output.
pub trait ProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<ProcessOutput>;
}
