//! Clap-free settings for the backup lifecycle and standalone commands.
//!
//! Built once by the host (the CLI merges defaults, a config file and the
//! environment) and then passed by reference. Nothing below reads the
//! environment on its own.

use backupctl_types::RetentionPolicy;
use camino::Utf8PathBuf;

/// Default repository directory name under the base dir or mount point.
pub const DEFAULT_REPOSITORY_NAME: &str = "backup";
/// Default engine executable, looked up on `PATH`.
pub const DEFAULT_RESTIC_PROGRAM: &str = "restic";
/// Snapshot reference used when none is configured.
pub const LATEST_SNAPSHOT: &str = "latest";

/// Where the repository may live. Resolved into exactly one target by
/// [`locate`](crate::locator::locate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    // Remote (sftp)
    pub sftp_host: Option<String>,
    pub sftp_user: Option<String>,
    pub sftp_base_dir: Option<String>,

    // Local
    pub mount_point: Option<Utf8PathBuf>,

    pub name: String,
    pub password_file: Option<Utf8PathBuf>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            sftp_host: None,
            sftp_user: None,
            sftp_base_dir: None,
            mount_point: None,
            name: DEFAULT_REPOSITORY_NAME.to_string(),
            password_file: None,
        }
    }
}

/// Settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub repository: RepositoryConfig,

    // Selection
    pub include_file: Option<Utf8PathBuf>,
    pub exclude_file: Option<Utf8PathBuf>,

    pub retention: RetentionPolicy,

    // Engine
    pub restic_program: String,
    pub pass_through_flags: Vec<String>,

    // Snapshot commands
    pub snapshot_ref: String,
    pub restore_target: Option<Utf8PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            include_file: None,
            exclude_file: None,
            retention: RetentionPolicy::default(),
            restic_program: DEFAULT_RESTIC_PROGRAM.to_string(),
            pass_through_flags: Vec::new(),
            snapshot_ref: LATEST_SNAPSHOT.to_string(),
            restore_target: None,
        }
    }
}
