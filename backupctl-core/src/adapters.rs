//! Default port implementations: the restic engine over a real process, and an
//! in-memory engine for embedding and testing.

use crate::error::{BackendError, EXIT_LOCKED, EXIT_REPOSITORY_MISSING};
use crate::ports::{Backend, ProcessOutput, ProcessRunner};
use crate::settings::LATEST_SNAPSHOT;
use backupctl_types::{
    CredentialsRef, FileSelection, ForgetSpec, Operation, RepositoryTarget, RunResult, Snapshot,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

const EXCERPT_LINES: usize = 5;
const EXCERPT_CHARS: usize = 400;

/// Runs programs with `std::process::Command`, stdin closed.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<ProcessOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The restic engine.
///
/// Every invocation has the shape
/// `restic --repo <address> [--password-file <path>] <flags...> <sub-command...>`.
#[derive(Debug, Clone)]
pub struct ResticBackend<R = SystemRunner> {
    program: String,
    target: RepositoryTarget,
    flags: Vec<String>,
    runner: R,
}

impl ResticBackend<SystemRunner> {
    pub fn new(program: impl Into<String>, target: RepositoryTarget, flags: Vec<String>) -> Self {
        Self::with_runner(program, target, flags, SystemRunner)
    }
}

impl<R: ProcessRunner> ResticBackend<R> {
    pub fn with_runner(
        program: impl Into<String>,
        target: RepositoryTarget,
        flags: Vec<String>,
        runner: R,
    ) -> Self {
        Self {
            program: program.into(),
            target,
            flags,
            runner,
        }
    }

    pub fn target(&self) -> &RepositoryTarget {
        &self.target
    }

    /// Full argument vector for `sub`.
    pub fn command_args(&self, sub: &[&str]) -> Vec<String> {
        let mut args = vec!["--repo".to_string(), self.target.address.clone()];
        if let CredentialsRef::PasswordFile { path } = &self.target.credentials {
            args.push("--password-file".to_string());
            args.push(path.to_string());
        }
        args.extend(self.flags.iter().cloned());
        args.extend(sub.iter().map(|s| s.to_string()));
        args
    }

    fn invoke(&self, operation: Operation, sub: &[&str]) -> Result<ProcessOutput, BackendError> {
        let args = self.command_args(sub);
        debug!(program = %self.program, %operation, ?args, "invoking engine");

        let output = self
            .runner
            .run(&self.program, &args)
            .map_err(|e| BackendError::Spawn {
                operation,
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        if output.success() {
            Ok(output)
        } else {
            debug!(%operation, status = ?output.status, "engine reported failure");
            Err(BackendError::Failed {
                operation,
                exit_code: output.status,
                stderr_excerpt: stderr_excerpt(&output.stderr),
            })
        }
    }

    fn simple(&self, operation: Operation, sub: &[&str]) -> Result<RunResult, BackendError> {
        let output = self.invoke(operation, sub)?;
        let diagnostics = last_line(&output.stdout).unwrap_or_else(|| format!("{operation} ok"));
        Ok(RunResult::success(operation, diagnostics))
    }
}

impl<R: ProcessRunner> Backend for ResticBackend<R> {
    fn initialize(&self) -> Result<(), BackendError> {
        match self.invoke(Operation::Init, &["cat", "config"]) {
            Ok(_) => {
                debug!(repository = %self.target.address, "repository already initialized");
                Ok(())
            }
            Err(err) if err.is_repository_missing() => {
                self.invoke(Operation::Init, &["init"])?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn backup(&self, selection: &FileSelection) -> Result<Snapshot, BackendError> {
        let mut sub = vec!["backup", "--json", "--files-from", selection.include_from.as_str()];
        if let Some(exclude) = &selection.exclude_from {
            sub.push("--exclude-file");
            sub.push(exclude.as_str());
        }
        let output = self.invoke(Operation::Backup, &sub)?;

        let summary = parse_backup_summary(&output.stdout).ok_or_else(|| {
            BackendError::MalformedOutput {
                operation: Operation::Backup,
                message: "no summary with a snapshot id".to_string(),
            }
        })?;

        Ok(Snapshot {
            short_id: short_id(&summary.id),
            id: summary.id,
            time: Utc::now(),
            hostname: None,
            paths: selection.include.clone(),
            size_bytes: summary.bytes,
        })
    }

    fn check(&self, read_data: bool) -> Result<RunResult, BackendError> {
        let mut sub = vec!["check"];
        if read_data {
            sub.push("--read-data");
        }
        self.simple(Operation::Check, &sub)
    }

    fn stats(&self) -> Result<RunResult, BackendError> {
        let output = self.invoke(Operation::Stats, &["stats", "--json"])?;
        let stats: ResticStats = serde_json::from_str(output.stdout.trim()).map_err(|e| {
            BackendError::MalformedOutput {
                operation: Operation::Stats,
                message: e.to_string(),
            }
        })?;
        Ok(RunResult::success(Operation::Stats, stats.describe()))
    }

    fn list_files(&self, snapshot_ref: &str) -> Result<Vec<String>, BackendError> {
        let output = self.invoke(Operation::Ls, &["ls", "--json", snapshot_ref])?;
        Ok(parse_ls_nodes(&output.stdout))
    }

    fn list_snapshots(&self) -> Result<Option<Vec<Snapshot>>, BackendError> {
        let output = match self.invoke(Operation::Snapshots, &["snapshots", "--json"]) {
            Ok(output) => output,
            Err(err) if err.is_repository_missing() => {
                debug!(repository = %self.target.address, "repository does not exist yet");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        parse_snapshots(&output.stdout)
            .map(Some)
            .map_err(|message| BackendError::MalformedOutput {
                operation: Operation::Snapshots,
                message,
            })
    }

    fn prune(&self, spec: &ForgetSpec) -> Result<RunResult, BackendError> {
        let args = spec.to_args();
        let mut sub = vec!["forget"];
        sub.extend(args.iter().map(String::as_str));
        sub.push("--prune");
        self.simple(Operation::Forget, &sub)
    }

    fn restore(&self, snapshot_ref: &str, target: &Utf8Path) -> Result<RunResult, BackendError> {
        self.simple(
            Operation::Restore,
            &["restore", snapshot_ref, "--target", target.as_str()],
        )
    }

    fn unlock(&self) -> Result<RunResult, BackendError> {
        self.simple(Operation::Unlock, &["unlock"])
    }

    fn repair(&self) -> Result<RunResult, BackendError> {
        self.simple(Operation::Repair, &["repair", "index"])
    }
}

// ── restic JSON shapes ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ResticSnapshot {
    id: String,
    #[serde(default)]
    short_id: Option<String>,
    time: DateTime<Utc>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    summary: Option<ResticSnapshotSummary>,
}

#[derive(Debug, Deserialize)]
struct ResticSnapshotSummary {
    #[serde(default)]
    total_bytes_processed: Option<u64>,
}

impl From<ResticSnapshot> for Snapshot {
    fn from(s: ResticSnapshot) -> Self {
        Snapshot {
            short_id: s.short_id.unwrap_or_else(|| short_id(&s.id)),
            id: s.id,
            time: s.time,
            hostname: s.hostname,
            paths: s.paths,
            size_bytes: s.summary.and_then(|sum| sum.total_bytes_processed),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BackupMessage {
    message_type: String,
    #[serde(default)]
    snapshot_id: Option<String>,
    #[serde(default)]
    total_bytes_processed: Option<u64>,
}

#[derive(Debug, PartialEq, Eq)]
struct BackupSummary {
    id: String,
    bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ResticStats {
    #[serde(default)]
    total_size: u64,
    #[serde(default)]
    total_file_count: u64,
    #[serde(default)]
    snapshots_count: Option<u64>,
}

impl ResticStats {
    fn describe(&self) -> String {
        match self.snapshots_count {
            Some(n) => format!(
                "{n} snapshots, {} files, {} bytes",
                self.total_file_count, self.total_size
            ),
            None => format!("{} files, {} bytes", self.total_file_count, self.total_size),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LsLine {
    #[serde(default)]
    struct_type: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

fn parse_snapshots(stdout: &str) -> Result<Vec<Snapshot>, String> {
    let body = stdout.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let raw: Vec<ResticSnapshot> = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let mut snapshots: Vec<Snapshot> = raw.into_iter().map(Snapshot::from).collect();
    snapshots.sort_by(|a, b| a.time.cmp(&b.time));
    Ok(snapshots)
}

/// The last `summary` message of a `backup --json` stream.
fn parse_backup_summary(stdout: &str) -> Option<BackupSummary> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<BackupMessage>(line.trim()).ok())
        .filter(|msg| msg.message_type == "summary")
        .last()
        .and_then(|msg| {
            msg.snapshot_id.map(|id| BackupSummary {
                id,
                bytes: msg.total_bytes_processed,
            })
        })
}

fn parse_ls_nodes(stdout: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<LsLine>(line) {
            Ok(LsLine {
                struct_type: Some(kind),
                path: Some(path),
            }) if kind == "node" => paths.push(path),
            Ok(_) => {}
            Err(err) => warn!("skipping unreadable ls line: {}", err),
        }
    }
    paths
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn last_line(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(str::to_string)
}

/// Tail of the engine's stderr: last few non-empty lines, bounded in length.
pub(crate) fn stderr_excerpt(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return "no error output".to_string();
    }
    let tail = lines[lines.len().saturating_sub(EXCERPT_LINES)..].join("; ");
    let count = tail.chars().count();
    if count <= EXCERPT_CHARS {
        tail
    } else {
        let kept: String = tail.chars().skip(count - EXCERPT_CHARS).collect();
        format!("...{kept}")
    }
}

// ── in-memory engine ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryState {
    initialized: bool,
    locked: bool,
    snapshots: Vec<Snapshot>,
    calls: Vec<Operation>,
    counts: HashMap<Operation, usize>,
    scripted: HashMap<(Operation, usize), i32>,
    pruned_with: Vec<ForgetSpec>,
    restored: Vec<(String, Utf8PathBuf)>,
    next_id: u64,
}

/// In-memory engine for embedding and testing.
///
/// Records every call in order, keeps snapshots in memory, and can be scripted
/// to fail the n-th call of an operation with a chosen exit code. Retention is
/// approximated by keeping the newest `sum of keep counts` snapshots.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RefCell<MemoryState>,
}

impl InMemoryBackend {
    /// An engine with no repository yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// An initialized repository holding `snapshots`.
    pub fn with_snapshots(snapshots: Vec<Snapshot>) -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state.borrow_mut();
            state.initialized = true;
            state.next_id = snapshots.len() as u64;
            state.snapshots = snapshots;
        }
        backend
    }

    /// An initialized repository with `count` snapshots, one hour apart.
    pub fn with_snapshot_count(count: usize) -> Self {
        let base = DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_000);
        let snapshots = (0..count)
            .map(|n| memory_snapshot(n as u64, base + Duration::hours(n as i64), Vec::new()))
            .collect();
        Self::with_snapshots(snapshots)
    }

    /// Fail the `nth` (0-based) call of `operation` with `exit_code`.
    pub fn fail_call(self, operation: Operation, nth: usize, exit_code: i32) -> Self {
        self.state
            .borrow_mut()
            .scripted
            .insert((operation, nth), exit_code);
        self
    }

    /// Hold the repository lock: everything except unlock fails until unlocked.
    pub fn locked(self) -> Self {
        self.state.borrow_mut().locked = true;
        self
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.state.borrow().calls.clone()
    }

    /// Calls that can change repository state, in order.
    pub fn mutating_calls(&self) -> Vec<Operation> {
        self.calls().into_iter().filter(|op| !op.is_query()).collect()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.state
            .borrow()
            .counts
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.state.borrow().snapshots.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    pub fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }

    pub fn pruned_with(&self) -> Vec<ForgetSpec> {
        self.state.borrow().pruned_with.clone()
    }

    pub fn restored(&self) -> Vec<(String, Utf8PathBuf)> {
        self.state.borrow().restored.clone()
    }

    /// Record a call and apply scripted failures and the lock.
    fn enter(&self, operation: Operation) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(operation);
        let count = state.counts.entry(operation).or_insert(0);
        let nth = *count;
        *count += 1;

        if let Some(code) = state.scripted.get(&(operation, nth)).copied() {
            return Err(BackendError::Failed {
                operation,
                exit_code: Some(code),
                stderr_excerpt: format!("scripted failure of {operation} call #{nth}"),
            });
        }
        if state.locked && operation != Operation::Unlock {
            return Err(BackendError::Failed {
                operation,
                exit_code: Some(EXIT_LOCKED),
                stderr_excerpt: "repository is already locked".to_string(),
            });
        }
        if !state.initialized && !matches!(operation, Operation::Init | Operation::Snapshots) {
            return Err(BackendError::Failed {
                operation,
                exit_code: Some(EXIT_REPOSITORY_MISSING),
                stderr_excerpt: "repository does not exist".to_string(),
            });
        }
        Ok(())
    }

    fn resolve(&self, operation: Operation, snapshot_ref: &str) -> Result<Snapshot, BackendError> {
        let state = self.state.borrow();
        let found = if snapshot_ref == LATEST_SNAPSHOT {
            state.snapshots.last()
        } else {
            state.snapshots.iter().find(|s| s.matches(snapshot_ref))
        };
        found.cloned().ok_or_else(|| BackendError::Failed {
            operation,
            exit_code: Some(1),
            stderr_excerpt: format!("no matching ID found for prefix {snapshot_ref:?}"),
        })
    }
}

fn memory_snapshot(n: u64, time: DateTime<Utc>, paths: Vec<String>) -> Snapshot {
    let seq = n + 1;
    let id = format!("{:08x}{seq:056x}", (seq as u32).wrapping_mul(0x9e37_79b1));
    Snapshot {
        short_id: short_id(&id),
        id,
        time,
        hostname: Some("localhost".to_string()),
        paths,
        size_bytes: Some(0),
    }
}

impl Backend for InMemoryBackend {
    fn initialize(&self) -> Result<(), BackendError> {
        self.enter(Operation::Init)?;
        self.state.borrow_mut().initialized = true;
        Ok(())
    }

    fn backup(&self, selection: &FileSelection) -> Result<Snapshot, BackendError> {
        self.enter(Operation::Backup)?;
        let mut state = self.state.borrow_mut();
        let time = state
            .snapshots
            .last()
            .map(|s| s.time + Duration::hours(1))
            .unwrap_or_else(Utc::now);
        let snapshot = memory_snapshot(state.next_id, time, selection.include.clone());
        state.next_id += 1;
        state.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    fn check(&self, read_data: bool) -> Result<RunResult, BackendError> {
        self.enter(Operation::Check)?;
        let scope = if read_data { "data and metadata" } else { "metadata" };
        Ok(RunResult::success(
            Operation::Check,
            format!("no errors were found ({scope})"),
        ))
    }

    fn stats(&self) -> Result<RunResult, BackendError> {
        self.enter(Operation::Stats)?;
        let count = self.state.borrow().snapshots.len();
        Ok(RunResult::success(Operation::Stats, format!("{count} snapshots")))
    }

    fn list_files(&self, snapshot_ref: &str) -> Result<Vec<String>, BackendError> {
        self.enter(Operation::Ls)?;
        Ok(self.resolve(Operation::Ls, snapshot_ref)?.paths)
    }

    fn list_snapshots(&self) -> Result<Option<Vec<Snapshot>>, BackendError> {
        self.enter(Operation::Snapshots)?;
        let state = self.state.borrow();
        Ok(state.initialized.then(|| state.snapshots.clone()))
    }

    fn prune(&self, spec: &ForgetSpec) -> Result<RunResult, BackendError> {
        self.enter(Operation::Forget)?;
        let keep: usize = spec.rules.iter().map(|r| r.count() as usize).sum();
        let mut state = self.state.borrow_mut();
        state.pruned_with.push(spec.clone());
        let excess = state.snapshots.len().saturating_sub(keep);
        state.snapshots = state.snapshots.split_off(excess);
        Ok(RunResult::success(
            Operation::Forget,
            format!("removed {excess} snapshots"),
        ))
    }

    fn restore(&self, snapshot_ref: &str, target: &Utf8Path) -> Result<RunResult, BackendError> {
        self.enter(Operation::Restore)?;
        let snapshot = self.resolve(Operation::Restore, snapshot_ref)?;
        self.state
            .borrow_mut()
            .restored
            .push((snapshot.id.clone(), target.to_path_buf()));
        Ok(RunResult::success(
            Operation::Restore,
            format!("restored snapshot {} to {target}", snapshot.short_id),
        ))
    }

    fn unlock(&self) -> Result<RunResult, BackendError> {
        self.enter(Operation::Unlock)?;
        self.state.borrow_mut().locked = false;
        Ok(RunResult::success(Operation::Unlock, "successfully removed locks"))
    }

    fn repair(&self) -> Result<RunResult, BackendError> {
        self.enter(Operation::Repair)?;
        Ok(RunResult::success(Operation::Repair, "index rebuilt"))
    }
}
