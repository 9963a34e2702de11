use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a repository lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Remote,
    Local,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Remote => f.write_str("remote"),
            TargetKind::Local => f.write_str("local"),
        }
    }
}

/// Opaque handle to the repository secret.
///
/// Only the backend adapter looks inside; everything else passes it along.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsRef {
    /// A file holding the repository password.
    PasswordFile { path: Utf8PathBuf },
    /// The engine resolves credentials from its own environment.
    Ambient,
}

/// The single repository a run talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryTarget {
    pub kind: TargetKind,
    pub address: String,
    pub credentials: CredentialsRef,
}

impl RepositoryTarget {
    pub fn remote(user: &str, host: &str, base_dir: &str, name: &str) -> Self {
        let base_dir = base_dir.trim_end_matches('/');
        Self {
            kind: TargetKind::Remote,
            address: format!("sftp:{user}@{host}:{base_dir}/{name}"),
            credentials: CredentialsRef::Ambient,
        }
    }

    pub fn local(mount_point: &camino::Utf8Path, name: &str) -> Self {
        Self {
            kind: TargetKind::Local,
            address: mount_point.join(name).into_string(),
            credentials: CredentialsRef::Ambient,
        }
    }

    pub fn with_credentials(mut self, credentials: CredentialsRef) -> Self {
        self.credentials = credentials;
        self
    }
}

impl fmt::Display for RepositoryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} repository {}", self.kind, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    #[test]
    fn remote_address_trims_trailing_slash() {
        let target = RepositoryTarget::remote("backup", "nas.lan", "/srv/restic/", "laptop");
        assert_eq!(target.address, "sftp:backup@nas.lan:/srv/restic/laptop");
        assert_eq!(target.kind, TargetKind::Remote);
    }

    #[test]
    fn local_address_joins_name() {
        let target = RepositoryTarget::local(Utf8Path::new("/mnt/usb"), "laptop");
        assert_eq!(target.address, "/mnt/usb/laptop");
        assert_eq!(target.kind, TargetKind::Local);
        assert_eq!(target.credentials, CredentialsRef::Ambient);
    }

    #[test]
    fn display_names_kind_and_address() {
        let target = RepositoryTarget::local(Utf8Path::new("/mnt/usb"), "laptop");
        assert_eq!(target.to_string(), "local repository /mnt/usb/laptop");
    }
}
