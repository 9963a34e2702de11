//! Configuration file loading for backupctl.
//!
//! Loads `backupctl.toml` (or the file named by `--config`) and merges it with
//! environment / command-line overrides into the core's [`RunSettings`].
//! Overrides take precedence over the file, the file over built-in defaults.

use anyhow::{Context, bail};
use backupctl_core::settings::RunSettings;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for in the working directory.
pub const CONFIG_FILE_NAME: &str = "backupctl.toml";

/// Top-level configuration from backupctl.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupctlConfig {
    pub repository: RepositorySection,
    pub selection: SelectionSection,
    pub retention: RetentionSection,
    pub restic: ResticSection,
    pub restore: RestoreSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositorySection {
    pub sftp_host: Option<String>,
    pub sftp_user: Option<String>,
    pub sftp_dir: Option<String>,
    pub mount_point: Option<Utf8PathBuf>,
    /// Directory name of the repository (default: "backup").
    pub name: Option<String>,
    pub password_file: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionSection {
    pub include_file: Option<Utf8PathBuf>,
    pub exclude_file: Option<Utf8PathBuf>,
}

/// Keep counts; unset counts keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionSection {
    pub keep_daily: Option<u32>,
    pub keep_weekly: Option<u32>,
    pub keep_monthly: Option<u32>,
    pub keep_yearly: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResticSection {
    /// Engine executable (default: "restic" on PATH).
    pub program: Option<String>,
    /// Extra flags placed before every sub-command.
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestoreSection {
    /// Snapshot id, id prefix or "latest".
    pub snapshot: Option<String>,
    pub target: Option<Utf8PathBuf>,
}

/// Where the configuration for this run came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named by `--config` or `BACKUPCTL_CONFIG`.
    Explicit(Utf8PathBuf),
    /// `backupctl.toml` found in the working directory.
    WorkingDir(Utf8PathBuf),
    /// No file; built-in defaults plus overrides only.
    Defaults,
}

/// Pick the config file: an explicit path must exist, otherwise
/// `backupctl.toml` in `dir` is used when it is a regular file.
pub fn locate_config(
    explicit: Option<&Utf8Path>,
    dir: &Utf8Path,
) -> anyhow::Result<ConfigSource> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("config file {} does not exist", path);
        }
        return Ok(ConfigSource::Explicit(path.to_path_buf()));
    }
    let candidate = dir.join(CONFIG_FILE_NAME);
    Ok(if candidate.is_file() {
        ConfigSource::WorkingDir(candidate)
    } else {
        ConfigSource::Defaults
    })
}

fn read_config(path: &Utf8Path) -> anyhow::Result<BackupctlConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

/// Parse `backupctl.toml` contents. Unknown keys are errors, and so are
/// values restic could never accept: a blank program or a blank flag.
pub fn parse_config(contents: &str) -> anyhow::Result<BackupctlConfig> {
    let config: BackupctlConfig = toml::from_str(contents).context("invalid TOML")?;
    if config
        .restic
        .program
        .as_deref()
        .is_some_and(|p| p.trim().is_empty())
    {
        bail!("[restic] program must not be blank");
    }
    if let Some(n) = config.restic.flags.iter().position(|f| f.trim().is_empty()) {
        bail!("[restic] flags entry {} is blank", n);
    }
    Ok(config)
}

/// Load the configuration for this run; defaults when no file applies.
pub fn load(explicit: Option<&Utf8Path>, dir: &Utf8Path) -> anyhow::Result<BackupctlConfig> {
    let source = locate_config(explicit, dir)?;
    debug!(?source, "configuration source");
    match source {
        ConfigSource::Explicit(path) | ConfigSource::WorkingDir(path) => read_config(&path),
        ConfigSource::Defaults => Ok(BackupctlConfig::default()),
    }
}

/// Values from the environment or the command line. Empty strings count as
/// unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub sftp_host: Option<String>,
    pub sftp_user: Option<String>,
    pub sftp_dir: Option<String>,
    pub mount_point: Option<String>,
    pub repo_name: Option<String>,
    pub password_file: Option<String>,
    pub include_file: Option<String>,
    pub exclude_file: Option<String>,
    /// Whitespace-separated engine flags; replaces the file's list.
    pub flags: Option<String>,
    pub restic_bin: Option<String>,
    pub keep_daily: Option<u32>,
    pub keep_weekly: Option<u32>,
    pub keep_monthly: Option<u32>,
    pub keep_yearly: Option<u32>,
    pub snapshot: Option<String>,
    pub restore_target: Option<String>,
}

/// Builder for merging the config file with overrides.
pub struct ConfigMerger {
    config: BackupctlConfig,
}

impl ConfigMerger {
    pub fn new(config: BackupctlConfig) -> Self {
        Self { config }
    }

    /// Produce the settings for this run. Overrides win over the file, the file
    /// over [`RunSettings::default`].
    pub fn merge(self, overrides: &Overrides) -> RunSettings {
        let BackupctlConfig {
            repository,
            selection,
            retention,
            restic,
            restore,
        } = self.config;
        let mut settings = RunSettings::default();

        let repo = &mut settings.repository;
        repo.sftp_host = text(&overrides.sftp_host).or(repository.sftp_host);
        repo.sftp_user = text(&overrides.sftp_user).or(repository.sftp_user);
        repo.sftp_base_dir = text(&overrides.sftp_dir).or(repository.sftp_dir);
        repo.mount_point = path(&overrides.mount_point).or(repository.mount_point);
        if let Some(name) = text(&overrides.repo_name).or(repository.name) {
            repo.name = name;
        }
        repo.password_file = path(&overrides.password_file).or(repository.password_file);

        settings.include_file = path(&overrides.include_file).or(selection.include_file);
        settings.exclude_file = path(&overrides.exclude_file).or(selection.exclude_file);

        let keep = &mut settings.retention;
        if let Some(n) = overrides.keep_daily.or(retention.keep_daily) {
            keep.keep_daily = n;
        }
        if let Some(n) = overrides.keep_weekly.or(retention.keep_weekly) {
            keep.keep_weekly = n;
        }
        if let Some(n) = overrides.keep_monthly.or(retention.keep_monthly) {
            keep.keep_monthly = n;
        }
        if let Some(n) = overrides.keep_yearly.or(retention.keep_yearly) {
            keep.keep_yearly = n;
        }

        if let Some(program) = text(&overrides.restic_bin).or(restic.program) {
            settings.restic_program = program;
        }
        settings.pass_through_flags = match &overrides.flags {
            Some(flags) => flags.split_whitespace().map(str::to_string).collect(),
            None => restic.flags,
        };

        if let Some(snapshot) = text(&overrides.snapshot).or(restore.snapshot) {
            settings.snapshot_ref = snapshot;
        }
        settings.restore_target = path(&overrides.restore_target).or(restore.target);

        settings
    }
}

fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn path(value: &Option<String>) -> Option<Utf8PathBuf> {
    text(value).map(Utf8PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backupctl_core::RetentionPolicy;
    use pretty_assertions::assert_eq;

    const FULL: &str = r#"
[repository]
sftp_host = "nas.lan"
sftp_user = "backup"
sftp_dir = "/srv/restic"
mount_point = "/mnt/usb"
name = "laptop"
password_file = "/root/.restic-pass"

[selection]
include_file = "/etc/backupctl/include.txt"
exclude_file = "/etc/backupctl/exclude.txt"

[retention]
keep_daily = 14
keep_yearly = 0

[restic]
program = "/usr/local/bin/restic"
flags = ["--limit-upload", "2048"]

[restore]
snapshot = "4bba301e"
target = "/srv/restore"
"#;

    #[test]
    fn full_file_populates_settings() {
        let settings = ConfigMerger::new(parse_config(FULL).unwrap()).merge(&Overrides::default());

        assert_eq!(settings.repository.sftp_host.as_deref(), Some("nas.lan"));
        assert_eq!(settings.repository.sftp_base_dir.as_deref(), Some("/srv/restic"));
        assert_eq!(settings.repository.name, "laptop");
        assert_eq!(
            settings.retention,
            RetentionPolicy {
                keep_daily: 14,
                keep_weekly: 4,
                keep_monthly: 12,
                keep_yearly: 0,
            }
        );
        assert_eq!(settings.restic_program, "/usr/local/bin/restic");
        assert_eq!(settings.pass_through_flags, vec!["--limit-upload", "2048"]);
        assert_eq!(settings.snapshot_ref, "4bba301e");
        assert_eq!(
            settings.restore_target,
            Some(Utf8PathBuf::from("/srv/restore"))
        );
    }

    #[test]
    fn empty_file_gives_defaults() {
        let settings = ConfigMerger::new(parse_config("").unwrap()).merge(&Overrides::default());
        assert_eq!(settings, RunSettings::default());
    }

    #[test]
    fn overrides_win_over_file() {
        let overrides = Overrides {
            sftp_host: Some("backup.example.net".into()),
            repo_name: Some("server".into()),
            keep_daily: Some(3),
            flags: Some("  --verbose   --no-cache ".into()),
            snapshot: Some("latest".into()),
            ..Overrides::default()
        };
        let settings = ConfigMerger::new(parse_config(FULL).unwrap()).merge(&overrides);

        assert_eq!(
            settings.repository.sftp_host.as_deref(),
            Some("backup.example.net")
        );
        assert_eq!(settings.repository.sftp_user.as_deref(), Some("backup"));
        assert_eq!(settings.repository.name, "server");
        assert_eq!(settings.retention.keep_daily, 3);
        assert_eq!(settings.pass_through_flags, vec!["--verbose", "--no-cache"]);
        assert_eq!(settings.snapshot_ref, "latest");
    }

    #[test]
    fn empty_overrides_count_as_unset() {
        let overrides = Overrides {
            sftp_host: Some(String::new()),
            mount_point: Some("   ".into()),
            ..Overrides::default()
        };
        let settings = ConfigMerger::new(parse_config(FULL).unwrap()).merge(&overrides);
        assert_eq!(settings.repository.sftp_host.as_deref(), Some("nas.lan"));
        assert_eq!(
            settings.repository.mount_point,
            Some(Utf8PathBuf::from("/mnt/usb"))
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_config("[retention]\nkeep_hourly = 24\n").unwrap_err();
        assert!(format!("{err:#}").contains("keep_hourly"));
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let missing = root.join("nope.toml");
        let err = load(Some(&missing), &root).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn blank_restic_values_are_rejected() {
        let err = parse_config("[restic]\nprogram = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("program must not be blank"));

        let err = parse_config("[restic]\nflags = [\"--no-cache\", \"\"]\n").unwrap_err();
        assert!(err.to_string().contains("flags entry 1 is blank"));
    }

    #[test]
    fn explicit_config_wins_over_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::write(root.join(CONFIG_FILE_NAME), "").unwrap();
        let other = root.join("other.toml");
        std::fs::write(&other, "").unwrap();

        assert_eq!(
            locate_config(Some(&other), &root).unwrap(),
            ConfigSource::Explicit(other.clone())
        );
        assert_eq!(
            locate_config(None, &root).unwrap(),
            ConfigSource::WorkingDir(root.join(CONFIG_FILE_NAME))
        );
    }

    #[test]
    fn directory_named_like_config_is_not_used() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir(root.join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(locate_config(None, &root).unwrap(), ConfigSource::Defaults);
    }

    #[test]
    fn discovers_config_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        assert!(load(None, &root).unwrap().repository.name.is_none());

        std::fs::write(root.join(CONFIG_FILE_NAME), "[repository]\nname = \"nas\"\n").unwrap();
        let config = load(None, &root).unwrap();
        assert_eq!(config.repository.name.as_deref(), Some("nas"));
    }
}
