use serde::{Deserialize, Serialize};
use std::fmt;

/// One engine sub-command. Each backend call maps to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Init,
    Backup,
    Check,
    Stats,
    Ls,
    Snapshots,
    Forget,
    Restore,
    Unlock,
    Repair,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Init => "init",
            Operation::Backup => "backup",
            Operation::Check => "check",
            Operation::Stats => "stats",
            Operation::Ls => "ls",
            Operation::Snapshots => "snapshots",
            Operation::Forget => "forget",
            Operation::Restore => "restore",
            Operation::Unlock => "unlock",
            Operation::Repair => "repair",
        }
    }

    /// Read-only queries never change repository state.
    pub fn is_query(self) -> bool {
        matches!(self, Operation::Snapshots | Operation::Ls | Operation::Stats)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state.
///
/// ```text
/// Idle -> Preparing -> BackingUp -> Verifying -> Pruning -> FinalVerify -> Done
///   \________\____________\___________\___________\____________\-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Preparing,
    BackingUp,
    Verifying,
    Pruning,
    FinalVerify,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Transition table. The only way forward is a successful stage; terminal
    /// states absorb.
    pub fn next(self, succeeded: bool) -> Stage {
        if self.is_terminal() {
            return self;
        }
        if !succeeded {
            return Stage::Failed;
        }
        match self {
            Stage::Idle => Stage::Preparing,
            Stage::Preparing => Stage::BackingUp,
            Stage::BackingUp => Stage::Verifying,
            Stage::Verifying => Stage::Pruning,
            Stage::Pruning => Stage::FinalVerify,
            Stage::FinalVerify => Stage::Done,
            Stage::Done | Stage::Failed => self,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Preparing => "preparing",
            Stage::BackingUp => "backing-up",
            Stage::Verifying => "verifying",
            Stage::Pruning => "pruning",
            Stage::FinalVerify => "final-verify",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage or one standalone operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub stage: Stage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,

    pub succeeded: bool,

    #[serde(default)]
    pub diagnostics: String,
}

impl RunResult {
    pub fn success(operation: Operation, diagnostics: impl Into<String>) -> Self {
        Self {
            stage: Stage::Idle,
            operation: Some(operation),
            succeeded: true,
            diagnostics: diagnostics.into(),
        }
    }

    pub fn failure(
        stage: Stage,
        operation: Option<Operation>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            operation,
            succeeded: false,
            diagnostics: diagnostics.into(),
        }
    }

    /// Attribute this result to a lifecycle stage.
    pub fn at(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}
