//! Repository Locator: decide which single repository a run talks to.
//!
//! Fail-closed. A complete sftp triple wins, then an accessible mount point;
//! anything else is a [`ConfigurationError`] and no backend is ever built.

use crate::error::ConfigurationError;
use crate::settings::RepositoryConfig;
use backupctl_types::{CredentialsRef, RepositoryTarget};
use tracing::debug;

pub fn locate(config: &RepositoryConfig) -> Result<RepositoryTarget, ConfigurationError> {
    validate_name(&config.name)?;

    let host = present(&config.sftp_host);
    let user = present(&config.sftp_user);
    let base_dir = present(&config.sftp_base_dir);

    let target = match (host, user, base_dir) {
        (Some(host), Some(user), Some(base_dir)) => {
            RepositoryTarget::remote(user, host, base_dir, &config.name)
        }
        (None, None, None) => match &config.mount_point {
            Some(mount) if mount.is_dir() => RepositoryTarget::local(mount, &config.name),
            Some(mount) => {
                return Err(ConfigurationError::MountPointUnavailable {
                    path: mount.clone(),
                });
            }
            None => return Err(ConfigurationError::Unresolvable),
        },
        (host, user, base_dir) => {
            let missing = [("host", host), ("user", user), ("directory", base_dir)]
                .into_iter()
                .filter(|(_, value)| value.is_none())
                .map(|(field, _)| field)
                .collect();
            return Err(ConfigurationError::IncompleteRemote { missing });
        }
    };

    let credentials = match &config.password_file {
        Some(path) if path.is_file() => CredentialsRef::PasswordFile { path: path.clone() },
        Some(path) => {
            return Err(ConfigurationError::PasswordFileMissing { path: path.clone() });
        }
        None => CredentialsRef::Ambient,
    };

    let target = target.with_credentials(credentials);
    debug!(kind = %target.kind, address = %target.address, "resolved repository");
    Ok(target)
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn validate_name(name: &str) -> Result<(), ConfigurationError> {
    let reason = if name.trim().is_empty() {
        "name is blank"
    } else if name.contains('/') || name.contains('\\') {
        "name contains a path separator"
    } else if name.contains("..") {
        "name contains '..'"
    } else {
        return Ok(());
    };
    Err(ConfigurationError::InvalidRepositoryName {
        name: name.to_string(),
        reason,
    })
}
