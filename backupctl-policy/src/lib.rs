//! Retention policy engine.
//!
//! Pure translation from a [`RetentionPolicy`] to the [`ForgetSpec`] the
//! backend prunes with. No I/O happens here; the only decision is whether a
//! policy is safe to hand to a destructive operation at all.

use backupctl_types::{ForgetSpec, KeepRule, RetentionPolicy};
use thiserror::Error;
use tracing::debug;

/// A policy that must not reach the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Every keep-count is zero, which reads as "forget everything".
    #[error("retention policy keeps nothing (all keep counts are zero); refusing to prune")]
    Degenerate,
}

/// Compute the forget specification for `policy`.
///
/// Zero counts are left out of the specification; an all-zero policy is
/// rejected with [`PolicyError::Degenerate`].
pub fn compute_forget_args(policy: &RetentionPolicy) -> Result<ForgetSpec, PolicyError> {
    if policy.is_degenerate() {
        return Err(PolicyError::Degenerate);
    }

    let rules: Vec<KeepRule> = [
        KeepRule::Daily(policy.keep_daily),
        KeepRule::Weekly(policy.keep_weekly),
        KeepRule::Monthly(policy.keep_monthly),
        KeepRule::Yearly(policy.keep_yearly),
    ]
    .into_iter()
    .filter(|rule| rule.count() > 0)
    .collect();

    debug!(rules = rules.len(), "computed forget specification");
    Ok(ForgetSpec { rules })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn policy(daily: u32, weekly: u32, monthly: u32, yearly: u32) -> RetentionPolicy {
        RetentionPolicy {
            keep_daily: daily,
            keep_weekly: weekly,
            keep_monthly: monthly,
            keep_yearly: yearly,
        }
    }

    #[test]
    fn default_policy_yields_all_four_rules() {
        let spec = compute_forget_args(&RetentionPolicy::default()).unwrap();
        assert_eq!(
            spec.to_args(),
            vec![
                "--keep-daily",
                "7",
                "--keep-weekly",
                "4",
                "--keep-monthly",
                "12",
                "--keep-yearly",
                "3",
            ]
        );
    }

    #[test]
    fn zero_counts_are_omitted() {
        let spec = compute_forget_args(&policy(0, 4, 0, 1)).unwrap();
        assert_eq!(spec.rules, vec![KeepRule::Weekly(4), KeepRule::Yearly(1)]);
    }

    #[test]
    fn all_zero_policy_is_rejected() {
        assert_eq!(
            compute_forget_args(&policy(0, 0, 0, 0)),
            Err(PolicyError::Degenerate)
        );
    }

    #[test]
    fn degenerate_error_mentions_refusal() {
        let msg = PolicyError::Degenerate.to_string();
        assert!(msg.contains("refusing to prune"));
    }
}
