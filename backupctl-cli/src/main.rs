mod config;

use anyhow::Context;
use backupctl_core::adapters::ResticBackend;
use backupctl_core::commands::{Command, CommandError, CommandOutcome, resolve_and_dispatch};
use backupctl_core::{LifecycleReport, RunResult, Snapshot};
use camino::{Utf8Path, Utf8PathBuf};
use clap::error::ErrorKind;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Args, CommandFactory, FromArgMatches, Parser};
use config::{ConfigMerger, Overrides};
use std::ffi::OsString;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "backupctl",
    version,
    about = "Fail-closed backup lifecycle for restic repositories.",
    disable_help_flag = true
)]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,
}

/// Argument id of an action token, e.g. `check` for `--check`.
fn action_id(action: Command) -> &'static str {
    action.token().trim_start_matches("--")
}

/// The clap command: settings from [`Cli`] plus one flag per action token.
fn cli() -> clap::Command {
    Command::ALL.into_iter().fold(Cli::command(), |cli, action| {
        cli.arg(
            Arg::new(action_id(action))
                .long(action_id(action))
                .action(ArgAction::SetTrue)
                .help(action.summary()),
        )
    })
}

/// The action whose token comes first on the command line; later action
/// tokens are ignored. No token means `--backup`.
fn first_action(matches: &ArgMatches) -> Command {
    Command::ALL
        .into_iter()
        .filter(|action| {
            matches.value_source(action_id(*action)) == Some(ValueSource::CommandLine)
        })
        .filter_map(|action| {
            matches
                .index_of(action_id(action))
                .map(|index| (index, action))
        })
        .min_by_key(|(index, _)| *index)
        .map(|(_, action)| action)
        .unwrap_or_default()
}

fn parse<I, T>(args: I) -> Result<(Command, SettingsArgs), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = cli().try_get_matches_from(args)?;
    let parsed = Cli::from_arg_matches(&matches)?;
    Ok((first_action(&matches), parsed.settings))
}

#[derive(Debug, Args)]
struct SettingsArgs {
    #[arg(long, env = "BACKUPCTL_CONFIG")]
    config: Option<Utf8PathBuf>,

    #[arg(long, env = "BACKUPCTL_SFTP_HOST")]
    sftp_host: Option<String>,
    #[arg(long, env = "BACKUPCTL_SFTP_USER")]
    sftp_user: Option<String>,
    #[arg(long, env = "BACKUPCTL_SFTP_DIR")]
    sftp_dir: Option<String>,
    #[arg(long, env = "BACKUPCTL_MOUNT_POINT")]
    mount_point: Option<String>,
    #[arg(long, env = "BACKUPCTL_REPO_NAME")]
    repo_name: Option<String>,
    #[arg(long, env = "BACKUPCTL_PASSWORD_FILE")]
    password_file: Option<String>,

    #[arg(long, env = "BACKUPCTL_INCLUDE_FILE")]
    include_file: Option<String>,
    #[arg(long, env = "BACKUPCTL_EXCLUDE_FILE")]
    exclude_file: Option<String>,

    #[arg(long, env = "BACKUPCTL_FLAGS", allow_hyphen_values = true)]
    flags: Option<String>,
    #[arg(long, env = "BACKUPCTL_RESTIC_BIN")]
    restic_bin: Option<String>,

    #[arg(long, env = "BACKUPCTL_KEEP_DAILY")]
    keep_daily: Option<u32>,
    #[arg(long, env = "BACKUPCTL_KEEP_WEEKLY")]
    keep_weekly: Option<u32>,
    #[arg(long, env = "BACKUPCTL_KEEP_MONTHLY")]
    keep_monthly: Option<u32>,
    #[arg(long, env = "BACKUPCTL_KEEP_YEARLY")]
    keep_yearly: Option<u32>,

    #[arg(long, env = "BACKUPCTL_SNAPSHOT")]
    snapshot: Option<String>,
    #[arg(long, env = "BACKUPCTL_RESTORE_TARGET")]
    restore_target: Option<String>,
}

impl SettingsArgs {
    fn overrides(self) -> Overrides {
        Overrides {
            sftp_host: self.sftp_host,
            sftp_user: self.sftp_user,
            sftp_dir: self.sftp_dir,
            mount_point: self.mount_point,
            repo_name: self.repo_name,
            password_file: self.password_file,
            include_file: self.include_file,
            exclude_file: self.exclude_file,
            flags: self.flags,
            restic_bin: self.restic_bin,
            keep_daily: self.keep_daily,
            keep_weekly: self.keep_weekly,
            keep_monthly: self.keep_monthly,
            keep_yearly: self.keep_yearly,
            snapshot: self.snapshot,
            restore_target: self.restore_target,
        }
    }
}

fn usage() -> String {
    let mut out = String::from(
        "Usage: backupctl [COMMAND] [OPTIONS]\n\n\
         Commands (the first one given runs, default --backup):\n",
    );
    for command in Command::ALL {
        out.push_str(&format!("  {:<13} {}\n", command.token(), command.summary()));
    }
    out.push_str(
        "\nOptions (each also read from the environment variable shown):\n\
         \x20 --config PATH          BACKUPCTL_CONFIG         config file (default: ./backupctl.toml)\n\
         \x20 --sftp-host HOST       BACKUPCTL_SFTP_HOST      sftp server\n\
         \x20 --sftp-user USER       BACKUPCTL_SFTP_USER      sftp login\n\
         \x20 --sftp-dir DIR         BACKUPCTL_SFTP_DIR       base directory on the server\n\
         \x20 --mount-point DIR      BACKUPCTL_MOUNT_POINT    local mount used when sftp is unset\n\
         \x20 --repo-name NAME       BACKUPCTL_REPO_NAME      repository directory name (default: backup)\n\
         \x20 --password-file PATH   BACKUPCTL_PASSWORD_FILE  repository password file\n\
         \x20 --include-file PATH    BACKUPCTL_INCLUDE_FILE   paths to back up, one per line\n\
         \x20 --exclude-file PATH    BACKUPCTL_EXCLUDE_FILE   patterns to exclude, one per line\n\
         \x20 --flags FLAGS          BACKUPCTL_FLAGS          extra restic flags\n\
         \x20 --restic-bin PATH      BACKUPCTL_RESTIC_BIN     restic executable (default: restic)\n\
         \x20 --keep-daily N         BACKUPCTL_KEEP_DAILY     daily snapshots to keep (default: 7)\n\
         \x20 --keep-weekly N        BACKUPCTL_KEEP_WEEKLY    weekly snapshots to keep (default: 4)\n\
         \x20 --keep-monthly N       BACKUPCTL_KEEP_MONTHLY   monthly snapshots to keep (default: 12)\n\
         \x20 --keep-yearly N        BACKUPCTL_KEEP_YEARLY    yearly snapshots to keep (default: 3)\n\
         \x20 --snapshot REF         BACKUPCTL_SNAPSHOT       snapshot for --list/--restore (default: latest)\n\
         \x20 --restore-target DIR   BACKUPCTL_RESTORE_TARGET directory --restore writes into\n",
    );
    out
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (command, settings) = match parse(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(e) if e.kind() == ErrorKind::DisplayVersion => {
            print!("{e}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let message = e.to_string();
            let first = message.lines().next().unwrap_or_default();
            error!("{}", first.trim_start_matches("error: "));
            print!("{}", usage());
            return ExitCode::from(1);
        }
    };

    if command == Command::Help {
        print!("{}", usage());
        return ExitCode::SUCCESS;
    }

    match real_main(command, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<CommandError>() {
            Some(failure) => {
                error!("{}", failure);
                ExitCode::from(failure.exit_code())
            }
            None => {
                error!("{:#}", e);
                ExitCode::from(1)
            }
        },
    }
}

fn real_main(command: Command, args: SettingsArgs) -> anyhow::Result<()> {
    let explicit = args.config.clone();
    let file_config = config::load(explicit.as_deref(), Utf8Path::new("."))
        .context("load backupctl configuration")?;
    let settings = ConfigMerger::new(file_config).merge(&args.overrides());
    debug!(?command, ?settings, "merged settings");

    let outcome = resolve_and_dispatch(command, &settings, |target| {
        ResticBackend::new(
            settings.restic_program.clone(),
            target.clone(),
            settings.pass_through_flags.clone(),
        )
    })?;

    render(&outcome);
    Ok(())
}

fn render(outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::Help => print!("{}", usage()),
        CommandOutcome::Lifecycle(report) => render_lifecycle(report),
        CommandOutcome::Report(results) => results.iter().for_each(render_result),
        CommandOutcome::Files(files) => files.iter().for_each(|f| println!("{f}")),
        CommandOutcome::Snapshots(snapshots) => render_snapshots(snapshots),
    }
}

fn render_lifecycle(report: &LifecycleReport) {
    for result in &report.history {
        println!("{:<13} {}", result.stage, result.diagnostics);
    }
    if let Some(snapshot) = &report.snapshot {
        println!("backup complete: snapshot {}", snapshot.short_id);
    }
}

fn render_result(result: &RunResult) {
    match result.operation {
        Some(operation) => println!("{:<10} {}", operation, result.diagnostics),
        None => println!("{}", result.diagnostics),
    }
}

fn render_snapshots(snapshots: &[Snapshot]) {
    if snapshots.is_empty() {
        println!("no snapshots");
        return;
    }
    println!("{:<10} {:<20} {:<16} PATHS", "ID", "TIME", "HOST");
    for s in snapshots {
        println!(
            "{:<10} {:<20} {:<16} {}",
            s.short_id,
            s.time.format("%Y-%m-%d %H:%M:%S").to_string(),
            s.hostname.as_deref().unwrap_or("-"),
            s.paths.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(args: &[&str]) -> Command {
        let argv = std::iter::once("backupctl").chain(args.iter().copied());
        parse(argv).unwrap().0
    }

    #[test]
    fn no_action_means_backup() {
        assert_eq!(action(&[]), Command::Backup);
    }

    #[test]
    fn each_token_selects_its_command() {
        for command in Command::ALL {
            assert_eq!(action(&[command.token()]), command);
        }
    }

    #[test]
    fn first_action_token_wins() {
        assert_eq!(action(&["--check", "--prune"]), Command::Check);
        assert_eq!(action(&["--prune", "--check"]), Command::Prune);
        assert_eq!(action(&["--snapshots", "--help"]), Command::Snapshots);
    }

    #[test]
    fn options_before_the_action_do_not_count() {
        assert_eq!(
            action(&["--repo-name", "laptop", "--unlock", "--backup"]),
            Command::Unlock
        );
    }

    #[test]
    fn flags_value_may_start_with_dashes() {
        let (_, settings) = parse(["backupctl", "--flags", "--limit-upload 2048"]).unwrap();
        assert_eq!(settings.flags.as_deref(), Some("--limit-upload 2048"));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let err = parse(["backupctl", "--frobnicate"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn usage_lists_every_token() {
        let text = usage();
        for command in Command::ALL {
            assert!(text.contains(command.token()), "{} missing", command.token());
        }
    }
}
