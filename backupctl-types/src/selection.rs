use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// The file set a backup covers.
///
/// `include_from` / `exclude_from` are the list files handed to the engine;
/// `include` / `exclude` are the ordered patterns read from them when the run
/// started. Both views are fixed for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSelection {
    pub include_from: Utf8PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_from: Option<Utf8PathBuf>,

    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FileSelection {
    /// Parse a list file body: one pattern per line, blank lines and `#`
    /// comments skipped, order preserved.
    pub fn parse_patterns(contents: &str) -> Vec<String> {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }
}
