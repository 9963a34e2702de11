//! The backup lifecycle state machine and the standalone repository operations.
//!
//! The orchestrator executes the action of the current [`Stage`] and feeds its
//! success bit to [`Stage::next`]. Pruning is only reachable after a backup and
//! a verification that both succeeded in the same run; a failure anywhere moves
//! the machine to [`Stage::Failed`] and nothing after it is attempted.

use crate::error::{BackendError, RunError, StageFailure};
use crate::ports::Backend;
use backupctl_policy::compute_forget_args;
use backupctl_types::{
    FileSelection, ForgetSpec, Operation, RetentionPolicy, RunResult, Snapshot, Stage,
};
use camino::Utf8Path;
use tracing::{debug, info};

/// Outcome of a completed lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleReport {
    /// The snapshot written by the backing-up stage.
    pub snapshot: Option<Snapshot>,
    /// One result per executed stage, in order.
    pub history: Vec<RunResult>,
}

/// Drives one backend through the lifecycle or a standalone operation.
pub struct Orchestrator<'a, B: Backend + ?Sized> {
    backend: &'a B,
    stage: Stage,
    history: Vec<RunResult>,
}

impl<'a, B: Backend + ?Sized> Orchestrator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            stage: Stage::Idle,
            history: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Results recorded so far, failures included.
    pub fn history(&self) -> &[RunResult] {
        &self.history
    }

    /// Run `Idle -> ... -> Done`, stopping at the first failing stage.
    ///
    /// The retention policy is turned into forget rules while still `Idle`, so
    /// a policy that keeps nothing fails before the backend is touched.
    pub fn perform_backup(
        &mut self,
        selection: &FileSelection,
        policy: &RetentionPolicy,
    ) -> Result<LifecycleReport, StageFailure> {
        self.stage = Stage::Idle;
        self.history.clear();
        let mut snapshot = None;

        let forget = compute_forget_args(policy).map_err(|e| self.stop(Stage::Idle, e.into()))?;
        self.stage = Stage::Idle.next(true);

        while !self.stage.is_terminal() {
            let stage = self.stage;
            debug!(%stage, "entering stage");

            match self.run_stage(stage, selection, &forget, &mut snapshot) {
                Ok(Some(result)) => {
                    info!(%stage, "{}", result.diagnostics);
                    self.history.push(result.at(stage));
                }
                Ok(None) => {}
                Err(error) => return Err(self.stop(stage, error)),
            }
            self.stage = stage.next(true);
        }

        info!(stages = self.history.len(), "backup lifecycle complete");
        Ok(LifecycleReport {
            snapshot,
            history: self.history.clone(),
        })
    }

    /// Record `error` against `stage` and move to `Failed`.
    fn stop(&mut self, stage: Stage, error: RunError) -> StageFailure {
        self.history.push(RunResult::failure(
            stage,
            failed_operation(&error),
            error.to_string(),
        ));
        self.stage = stage.next(false);
        debug!(%stage, "lifecycle stopped: {}", error);
        StageFailure { stage, error }
    }

    fn run_stage(
        &self,
        stage: Stage,
        selection: &FileSelection,
        forget: &ForgetSpec,
        snapshot: &mut Option<Snapshot>,
    ) -> Result<Option<RunResult>, RunError> {
        let result = match stage {
            Stage::Idle | Stage::Done | Stage::Failed => return Ok(None),
            Stage::Preparing => self.prepare()?,
            Stage::BackingUp => {
                let saved = self.backend.backup(selection)?;
                let result = RunResult::success(
                    Operation::Backup,
                    format!("snapshot {} saved", saved.short_id),
                );
                *snapshot = Some(saved);
                result
            }
            Stage::Verifying | Stage::FinalVerify => self.backend.check(false)?,
            Stage::Pruning => self.backend.prune(forget)?,
        };
        Ok(Some(result))
    }

    /// A missing repository is initialized; an existing one, even with no
    /// snapshots yet, must pass a metadata check before anything is written.
    fn prepare(&self) -> Result<RunResult, BackendError> {
        match self.backend.list_snapshots()? {
            None => {
                self.backend.initialize()?;
                Ok(RunResult::success(Operation::Init, "repository initialized"))
            }
            Some(existing) => {
                debug!(snapshots = existing.len(), "repository exists; checking first");
                self.backend.check(false)
            }
        }
    }

    fn record(&mut self, result: RunResult) -> RunResult {
        info!(operation = ?result.operation, "{}", result.diagnostics);
        self.history.push(result.clone());
        result
    }

    /// Integrity check; `read_data` also verifies every pack.
    pub fn check(&mut self, read_data: bool) -> Result<RunResult, RunError> {
        let result = self.backend.check(read_data)?;
        Ok(self.record(result))
    }

    pub fn info(&mut self) -> Result<RunResult, RunError> {
        let result = self.backend.stats()?;
        Ok(self.record(result))
    }

    pub fn list(&mut self, snapshot_ref: &str) -> Result<Vec<String>, RunError> {
        Ok(self.backend.list_files(snapshot_ref)?)
    }

    /// Snapshots oldest first; a repository that does not exist has none.
    pub fn snapshots(&mut self) -> Result<Vec<Snapshot>, RunError> {
        Ok(self.backend.list_snapshots()?.unwrap_or_default())
    }

    /// Remove stale locks. Never called implicitly.
    pub fn unlock(&mut self) -> Result<RunResult, RunError> {
        let result = self.backend.unlock()?;
        Ok(self.record(result))
    }

    /// Rebuild the index, then check the metadata it describes.
    pub fn repair(&mut self) -> Result<RunResult, RunError> {
        let repaired = self.backend.repair()?;
        self.record(repaired);
        let result = self.backend.check(false)?;
        Ok(self.record(result))
    }

    /// Verified prune: check, forget with `policy`, check again.
    ///
    /// A degenerate policy is rejected before the backend is touched.
    pub fn prune(&mut self, policy: &RetentionPolicy) -> Result<RunResult, RunError> {
        let spec = compute_forget_args(policy)?;
        let checked = self.backend.check(false)?;
        self.record(checked);
        let pruned = self.backend.prune(&spec)?;
        self.record(pruned);
        let result = self.backend.check(false)?;
        Ok(self.record(result))
    }

    /// Restore `snapshot_ref` into `target` once the repository confirms the
    /// snapshot exists.
    pub fn restore(&mut self, snapshot_ref: &str, target: &Utf8Path) -> Result<RunResult, RunError> {
        let snapshots = self.backend.list_snapshots()?.unwrap_or_default();
        let confirmed = if snapshot_ref == crate::settings::LATEST_SNAPSHOT {
            !snapshots.is_empty()
        } else {
            snapshots.iter().any(|s| s.matches(snapshot_ref))
        };
        if !confirmed {
            return Err(RunError::SnapshotNotFound {
                reference: snapshot_ref.to_string(),
            });
        }
        let result = self.backend.restore(snapshot_ref, target)?;
        Ok(self.record(result))
    }
}

fn failed_operation(error: &RunError) -> Option<Operation> {
    match error {
        RunError::Backend(err) => Some(err.operation()),
        RunError::Lock(err) => Some(err.operation),
        RunError::Policy(_) => Some(Operation::Forget),
        RunError::Configuration(_) | RunError::SnapshotNotFound { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryBackend;
    use camino::Utf8PathBuf;
    use pretty_assertions::assert_eq;

    fn selection() -> FileSelection {
        FileSelection {
            include_from: Utf8PathBuf::from("/etc/backupctl/include.txt"),
            exclude_from: None,
            include: vec!["/home".to_string()],
            exclude: Vec::new(),
        }
    }

    #[test]
    fn history_records_every_executed_stage() {
        let backend = InMemoryBackend::new();
        let mut orchestrator = Orchestrator::new(&backend);
        let report = orchestrator
            .perform_backup(&selection(), &RetentionPolicy::default())
            .unwrap();

        let stages: Vec<Stage> = report.history.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Preparing,
                Stage::BackingUp,
                Stage::Verifying,
                Stage::Pruning,
                Stage::FinalVerify,
            ]
        );
        assert!(report.history.iter().all(|r| r.succeeded));
        assert_eq!(orchestrator.stage(), Stage::Done);
        assert_eq!(report.snapshot.map(|s| s.paths), Some(vec!["/home".to_string()]));
    }

    #[test]
    fn failure_is_recorded_with_its_stage() {
        let backend = InMemoryBackend::with_snapshot_count(1).fail_call(Operation::Check, 1, 1);
        let mut orchestrator = Orchestrator::new(&backend);
        let failure = orchestrator
            .perform_backup(&selection(), &RetentionPolicy::default())
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Verifying);
        assert_eq!(orchestrator.stage(), Stage::Failed);
        let last = orchestrator.history().last().unwrap();
        assert_eq!(last.stage, Stage::Verifying);
        assert_eq!(last.operation, Some(Operation::Check));
        assert!(!last.succeeded);
    }

    #[test]
    fn repair_checks_after_rebuilding_index() {
        let backend = InMemoryBackend::with_snapshot_count(1);
        let mut orchestrator = Orchestrator::new(&backend);
        orchestrator.repair().unwrap();
        assert_eq!(backend.calls(), vec![Operation::Repair, Operation::Check]);
    }

    #[test]
    fn repair_failure_skips_check() {
        let backend = InMemoryBackend::with_snapshot_count(1).fail_call(Operation::Repair, 0, 1);
        let mut orchestrator = Orchestrator::new(&backend);
        assert!(orchestrator.repair().is_err());
        assert_eq!(backend.call_count(Operation::Check), 0);
    }

    #[test]
    fn restore_by_short_id_prefix() {
        let backend = InMemoryBackend::with_snapshot_count(2);
        let wanted = backend.snapshots()[0].clone();
        let mut orchestrator = Orchestrator::new(&backend);
        orchestrator
            .restore(&wanted.short_id[..6], Utf8Path::new("/srv/restore"))
            .unwrap();
        assert_eq!(
            backend.restored(),
            vec![(wanted.id, Utf8PathBuf::from("/srv/restore"))]
        );
    }
}
