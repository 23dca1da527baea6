//! Per-operation deadline policy.

use std::collections::HashMap;
use std::time::Duration;

/// Deadline applied to operations when the embedder does not configure one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Request deadline policy: one duration for every operation, a
/// per-operation-name table with a fallback, or disabled entirely.
///
/// A policy is resolved once per operation name when handlers are
/// synthesized; the resolved value never changes for the lifetime of a
/// mount. A zero duration — globally or for a single name — disables
/// supervision for the affected operations.
#[derive(Debug, Clone)]
pub enum TimeoutPolicy {
    Disabled,
    Global(Duration),
    PerOp {
        by_name: HashMap<String, Duration>,
        default: Duration,
    },
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        TimeoutPolicy::Global(DEFAULT_TIMEOUT)
    }
}

impl TimeoutPolicy {
    /// A per-operation table with the standard fallback.
    #[must_use]
    pub fn per_op(by_name: HashMap<String, Duration>) -> TimeoutPolicy {
        TimeoutPolicy::PerOp {
            by_name,
            default: DEFAULT_TIMEOUT,
        }
    }

    /// The watchdog duration for an operation name, or `None` when
    /// supervision is disabled for it.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Duration> {
        let duration = match self {
            TimeoutPolicy::Disabled => return None,
            TimeoutPolicy::Global(d) => *d,
            TimeoutPolicy::PerOp { by_name, default } => {
                by_name.get(name).copied().unwrap_or(*default)
            }
        };
        (!duration.is_zero()).then_some(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_policy_applies_to_every_name() {
        let policy = TimeoutPolicy::Global(Duration::from_millis(10));
        assert_eq!(policy.resolve("read"), Some(Duration::from_millis(10)));
        assert_eq!(policy.resolve("rmdir"), Some(Duration::from_millis(10)));
    }

    #[test]
    fn disabled_and_zero_mean_no_watchdog() {
        assert_eq!(TimeoutPolicy::Disabled.resolve("read"), None);
        assert_eq!(TimeoutPolicy::Global(Duration::ZERO).resolve("read"), None);
    }

    #[test]
    fn per_op_uses_name_then_fallback() {
        let mut by_name = HashMap::new();
        by_name.insert("read".to_owned(), Duration::from_millis(5));
        by_name.insert("write".to_owned(), Duration::ZERO);
        let policy = TimeoutPolicy::per_op(by_name);

        assert_eq!(policy.resolve("read"), Some(Duration::from_millis(5)));
        // Explicit zero disables supervision for that one operation.
        assert_eq!(policy.resolve("write"), None);
        assert_eq!(policy.resolve("getattr"), Some(DEFAULT_TIMEOUT));
    }

    #[test]
    fn default_policy_is_the_standard_global_deadline() {
        assert_eq!(
            TimeoutPolicy::default().resolve("open"),
            Some(DEFAULT_TIMEOUT)
        );
    }
}
