//! Load the file set a backup covers from its include and exclude lists.

use crate::error::ConfigurationError;
use backupctl_types::FileSelection;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use tracing::debug;

/// Read the include list (required, at least one pattern) and the optional
/// exclude list. The patterns are fixed for the rest of the run.
pub fn load_selection(
    include_file: Option<&Utf8Path>,
    exclude_file: Option<&Utf8Path>,
) -> Result<FileSelection, ConfigurationError> {
    let include_from = include_file.ok_or(ConfigurationError::MissingIncludeList)?;
    let include = FileSelection::parse_patterns(&read_list("include list", include_from)?);
    if include.is_empty() {
        return Err(ConfigurationError::EmptyIncludeList {
            path: include_from.to_path_buf(),
        });
    }

    let exclude = match exclude_file {
        Some(path) => FileSelection::parse_patterns(&read_list("exclude list", path)?),
        None => Vec::new(),
    };

    debug!(
        include = include.len(),
        exclude = exclude.len(),
        "loaded file selection"
    );
    Ok(FileSelection {
        include_from: include_from.to_path_buf(),
        exclude_from: exclude_file.map(Utf8PathBuf::from),
        include,
        exclude,
    })
}

fn read_list(what: &'static str, path: &Utf8Path) -> Result<String, ConfigurationError> {
    fs::read_to_string(path).map_err(|e| ConfigurationError::Unreadable {
        what,
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("utf-8 path");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_include_and_exclude_patterns() {
        let dir = TempDir::new().unwrap();
        let include = write(&dir, "include.txt", "/home\n# cache is excluded below\n/etc\n");
        let exclude = write(&dir, "exclude.txt", "*.tmp\n\n/home/*/.cache\n");

        let selection = load_selection(Some(&include), Some(&exclude)).unwrap();
        assert_eq!(selection.include, vec!["/home", "/etc"]);
        assert_eq!(selection.exclude, vec!["*.tmp", "/home/*/.cache"]);
        assert_eq!(selection.include_from, include);
        assert_eq!(selection.exclude_from, Some(exclude));
    }

    #[test]
    fn include_list_is_required() {
        assert_eq!(
            load_selection(None, None),
            Err(ConfigurationError::MissingIncludeList)
        );
    }

    #[test]
    fn include_list_with_only_comments_is_empty() {
        let dir = TempDir::new().unwrap();
        let include = write(&dir, "include.txt", "# nothing yet\n\n");
        assert_eq!(
            load_selection(Some(&include), None),
            Err(ConfigurationError::EmptyIncludeList { path: include })
        );
    }

    #[test]
    fn unreadable_exclude_list_names_the_file() {
        let dir = TempDir::new().unwrap();
        let include = write(&dir, "include.txt", "/home\n");
        let missing = include.with_file_name("exclude.txt");
        let err = load_selection(Some(&include), Some(&missing)).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::Unreadable { what: "exclude list", .. }
        ));
        assert!(err.to_string().contains("exclude.txt"));
    }
}
