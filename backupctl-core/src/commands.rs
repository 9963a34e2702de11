//! Command surface: one action per invocation, mapped onto the orchestrator.
//!
//! [`resolve_and_dispatch`] is the embedding entry point. It validates every
//! input the command needs, resolves the repository, and only then asks the
//! caller to connect a backend; a configuration error therefore never reaches
//! the engine.

use crate::error::{ConfigurationError, RunError};
use crate::lifecycle::{LifecycleReport, Orchestrator};
use crate::locator::locate;
use crate::ports::Backend;
use crate::selection::load_selection;
use crate::settings::RunSettings;
use backupctl_policy::compute_forget_args;
use backupctl_types::{FileSelection, RepositoryTarget, RunResult, Snapshot, Stage};
use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// The selectable actions. Absent a token, [`Command::Backup`] runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Command {
    Help,
    #[default]
    Backup,
    Check,
    Info,
    List,
    Prune,
    Restore,
    Repair,
    Unlock,
    Snapshots,
}

impl Command {
    pub const ALL: [Command; 10] = [
        Command::Help,
        Command::Backup,
        Command::Check,
        Command::Info,
        Command::List,
        Command::Prune,
        Command::Restore,
        Command::Repair,
        Command::Unlock,
        Command::Snapshots,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Command::Help => "--help",
            Command::Backup => "--backup",
            Command::Check => "--check",
            Command::Info => "--info",
            Command::List => "--list",
            Command::Prune => "--prune",
            Command::Restore => "--restore",
            Command::Repair => "--repair",
            Command::Unlock => "--unlock",
            Command::Snapshots => "--snapshots",
        }
    }

    pub fn from_token(token: &str) -> Option<Command> {
        Command::ALL.into_iter().find(|c| c.token() == token)
    }

    /// One-line description for usage output.
    pub fn summary(self) -> &'static str {
        match self {
            Command::Help => "print this help and exit",
            Command::Backup => "back up, verify, prune and verify again (default)",
            Command::Check => "verify repository structure and all pack data",
            Command::Info => "show repository statistics",
            Command::List => "list files in the configured snapshot (default: latest)",
            Command::Prune => "check, apply the retention policy, check again",
            Command::Restore => "restore the configured snapshot into the restore target",
            Command::Repair => "rebuild the repository index, then check",
            Command::Unlock => "remove stale repository locks",
            Command::Snapshots => "list snapshots",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token().trim_start_matches('-'))
    }
}

/// What a successful command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Help,
    Lifecycle(LifecycleReport),
    /// Results of each engine call the command made, in order.
    Report(Vec<RunResult>),
    Files(Vec<String>),
    Snapshots(Vec<Snapshot>),
}

/// A command that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CommandError {
    pub command: Command,
    /// Lifecycle stage that failed; `None` outside the backup lifecycle.
    pub stage: Option<Stage>,
    #[source]
    pub error: RunError,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(
                f,
                "{} failed in {} stage: {}",
                self.command, stage, self.error
            ),
            None => write!(f, "{} failed: {}", self.command, self.error),
        }
    }
}

impl CommandError {
    fn new(command: Command, error: impl Into<RunError>) -> Self {
        Self {
            command,
            stage: None,
            error: error.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

/// Everything a command needs that can be checked without the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub target: RepositoryTarget,
    /// Loaded for the backup lifecycle only.
    pub selection: Option<FileSelection>,
    /// Required for restore only.
    pub restore_target: Option<Utf8PathBuf>,
}

/// Validate the inputs `command` needs and resolve its repository.
///
/// Commands that prune also validate the retention policy here, so a policy
/// that keeps nothing is refused before any backend exists.
pub fn preflight(command: Command, settings: &RunSettings) -> Result<Preflight, CommandError> {
    let target = locate(&settings.repository).map_err(|e| CommandError::new(command, e))?;

    if matches!(command, Command::Backup | Command::Prune) {
        let spec = compute_forget_args(&settings.retention)
            .map_err(|e| CommandError::new(command, e))?;
        debug!(rules = spec.rules.len(), "retention policy accepted");
    }

    let selection = match command {
        Command::Backup => Some(
            load_selection(
                settings.include_file.as_deref(),
                settings.exclude_file.as_deref(),
            )
            .map_err(|e| CommandError::new(command, e))?,
        ),
        _ => None,
    };

    let restore_target = match command {
        Command::Restore => Some(settings.restore_target.clone().ok_or_else(|| {
            CommandError::new(command, ConfigurationError::MissingRestoreTarget)
        })?),
        _ => None,
    };

    Ok(Preflight {
        target,
        selection,
        restore_target,
    })
}

/// Run `command` against an already connected backend.
pub fn dispatch<B: Backend + ?Sized>(
    command: Command,
    settings: &RunSettings,
    preflight: &Preflight,
    backend: &B,
) -> Result<CommandOutcome, CommandError> {
    let mut orchestrator = Orchestrator::new(backend);
    let fail = |error: RunError| CommandError::new(command, error);

    let outcome = match command {
        Command::Help => CommandOutcome::Help,
        Command::Backup => {
            let selection = preflight.selection.as_ref().ok_or_else(|| {
                CommandError::new(command, ConfigurationError::MissingIncludeList)
            })?;
            let report = orchestrator
                .perform_backup(selection, &settings.retention)
                .map_err(|failure| CommandError {
                    command,
                    stage: Some(failure.stage),
                    error: failure.error,
                })?;
            CommandOutcome::Lifecycle(report)
        }
        Command::Check => {
            orchestrator.check(true).map_err(fail)?;
            CommandOutcome::Report(orchestrator.history().to_vec())
        }
        Command::Info => {
            orchestrator.info().map_err(fail)?;
            CommandOutcome::Report(orchestrator.history().to_vec())
        }
        Command::List => {
            CommandOutcome::Files(orchestrator.list(&settings.snapshot_ref).map_err(fail)?)
        }
        Command::Prune => {
            orchestrator.prune(&settings.retention).map_err(fail)?;
            CommandOutcome::Report(orchestrator.history().to_vec())
        }
        Command::Restore => {
            let target = preflight.restore_target.as_deref().ok_or_else(|| {
                CommandError::new(command, ConfigurationError::MissingRestoreTarget)
            })?;
            orchestrator
                .restore(&settings.snapshot_ref, target)
                .map_err(fail)?;
            CommandOutcome::Report(orchestrator.history().to_vec())
        }
        Command::Repair => {
            orchestrator.repair().map_err(fail)?;
            CommandOutcome::Report(orchestrator.history().to_vec())
        }
        Command::Unlock => {
            orchestrator.unlock().map_err(fail)?;
            CommandOutcome::Report(orchestrator.history().to_vec())
        }
        Command::Snapshots => CommandOutcome::Snapshots(orchestrator.snapshots().map_err(fail)?),
    };

    info!(%command, "command complete");
    Ok(outcome)
}

/// Preflight, then `connect` to the resolved repository, then dispatch.
///
/// `connect` is not called when the command is `help` or any preflight check
/// fails.
pub fn resolve_and_dispatch<B, F>(
    command: Command,
    settings: &RunSettings,
    connect: F,
) -> Result<CommandOutcome, CommandError>
where
    B: Backend,
    F: FnOnce(&RepositoryTarget) -> B,
{
    if command == Command::Help {
        return Ok(CommandOutcome::Help);
    }
    let preflight = preflight(command, settings)?;
    debug!(%command, target = %preflight.target, "connecting backend");
    let backend = connect(&preflight.target);
    dispatch(command, settings, &preflight, &backend)
}
