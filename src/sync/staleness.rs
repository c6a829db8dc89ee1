// SPDX-License-Identifier: GPL-3.0-only
use chrono::{DateTime, Utc};
use std::time::Duration;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60 * 60);

/// Time-based freshness check for the cached snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    threshold: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

impl StalenessPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// A cache that never synced is always outdated. A sync time in the
    /// future (clock skew) counts as fresh.
    pub fn is_outdated(&self, last_synced_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last) = last_synced_at else {
            return true;
        };

        match (now - last).to_std() {
            Ok(elapsed) => elapsed > self.threshold,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_threshold_boundaries() {
        let policy = StalenessPolicy::default();
        let now = Utc::now();

        assert!(policy.is_outdated(Some(now - TimeDelta::minutes(61)), now));
        assert!(!policy.is_outdated(Some(now - TimeDelta::minutes(30)), now));
        assert!(!policy.is_outdated(Some(now - TimeDelta::minutes(60)), now));
        assert!(policy.is_outdated(None, now));
    }

    #[test]
    fn test_future_sync_time_is_fresh() {
        let policy = StalenessPolicy::new(Duration::from_secs(1));
        let now = Utc::now();
        assert!(!policy.is_outdated(Some(now + TimeDelta::minutes(5)), now));
    }
}
