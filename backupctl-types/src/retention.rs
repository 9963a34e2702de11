use serde::{Deserialize, Serialize};
use std::fmt;

/// How many snapshots to keep per time bucket.
///
/// A policy with every count at zero is *degenerate*: it would ask the engine
/// to forget everything, so the policy engine refuses to turn it into a
/// forget specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub keep_daily: u32,
    pub keep_weekly: u32,
    pub keep_monthly: u32,
    pub keep_yearly: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_daily: 7,
            keep_weekly: 4,
            keep_monthly: 12,
            keep_yearly: 3,
        }
    }
}

impl RetentionPolicy {
    pub fn is_degenerate(&self) -> bool {
        self.keep_daily == 0
            && self.keep_weekly == 0
            && self.keep_monthly == 0
            && self.keep_yearly == 0
    }
}

/// One `--keep-*` rule of a forget invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "bucket", content = "count", rename_all = "snake_case")]
pub enum KeepRule {
    Daily(u32),
    Weekly(u32),
    Monthly(u32),
    Yearly(u32),
}

impl KeepRule {
    pub fn flag(&self) -> &'static str {
        match self {
            KeepRule::Daily(_) => "--keep-daily",
            KeepRule::Weekly(_) => "--keep-weekly",
            KeepRule::Monthly(_) => "--keep-monthly",
            KeepRule::Yearly(_) => "--keep-yearly",
        }
    }

    pub fn count(&self) -> u32 {
        match *self {
            KeepRule::Daily(n)
            | KeepRule::Weekly(n)
            | KeepRule::Monthly(n)
            | KeepRule::Yearly(n) => n,
        }
    }
}

impl fmt::Display for KeepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.flag(), self.count())
    }
}

/// Validated retention specification handed to the backend's prune.
///
/// Only produced by the policy engine; never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgetSpec {
    pub rules: Vec<KeepRule>,
}

impl ForgetSpec {
    /// Render the rules as engine arguments, e.g. `--keep-daily 7`.
    pub fn to_args(&self) -> Vec<String> {
        self.rules
            .iter()
            .flat_map(|rule| [rule.flag().to_string(), rule.count().to_string()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_policy_keeps_something() {
        let policy = RetentionPolicy::default();
        assert!(!policy.is_degenerate());
        assert_eq!(policy.keep_daily, 7);
        assert_eq!(policy.keep_yearly, 3);
    }

    #[test]
    fn all_zero_policy_is_degenerate() {
        let policy = RetentionPolicy {
            keep_daily: 0,
            keep_weekly: 0,
            keep_monthly: 0,
            keep_yearly: 0,
        };
        assert!(policy.is_degenerate());
    }

    #[test]
    fn forget_spec_renders_flag_pairs() {
        let spec = ForgetSpec {
            rules: vec![KeepRule::Daily(7), KeepRule::Yearly(2)],
        };
        assert_eq!(
            spec.to_args(),
            vec!["--keep-daily", "7", "--keep-yearly", "2"]
        );
    }

    #[test]
    fn partial_policy_deserializes_with_defaults() {
        let policy: RetentionPolicy = serde_json::from_str(r#"{"keep_daily": 14}"#).unwrap();
        assert_eq!(policy.keep_daily, 14);
        assert_eq!(policy.keep_weekly, 4);
    }
}
