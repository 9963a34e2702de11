use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point-in-time backup set, as last reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub short_id: String,
    pub time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl Snapshot {
    /// True when `reference` names this snapshot by full id or id prefix.
    pub fn matches(&self, reference: &str) -> bool {
        !reference.is_empty()
            && (self.id.starts_with(reference) || self.short_id.starts_with(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            id: "4bba301e2f6f0b0d3c2b4a8e1f4d6c7e8a9b0c1d2e3f4a5b6c7d8e9f0a1b2c3d".into(),
            short_id: "4bba301e".into(),
            time: "2025-03-01T02:00:00Z".parse().unwrap(),
            hostname: Some("laptop".into()),
            paths: vec!["/home".into()],
            size_bytes: Some(1024),
        }
    }

    #[test]
    fn matches_by_prefix() {
        let snap = snapshot();
        assert!(snap.matches("4bba"));
        assert!(snap.matches("4bba301e"));
        assert!(snap.matches(&snap.id.clone()));
        assert!(!snap.matches("ffff"));
    }

    #[test]
    fn empty_reference_matches_nothing() {
        assert!(!snapshot().matches(""));
    }
}
