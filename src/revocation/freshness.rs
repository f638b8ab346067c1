use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Unit in which the freshness tolerance is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessUnit {
    Seconds,
    Minutes,
    Hours,
    #[default]
    Days,
}

impl FreshnessUnit {
    /// Number of whole units in `delta`, truncated toward zero.
    pub fn whole_units(self, delta: TimeDelta) -> i64 {
        match self {
            FreshnessUnit::Seconds => delta.num_seconds(),
            FreshnessUnit::Minutes => delta.num_minutes(),
            FreshnessUnit::Hours => delta.num_hours(),
            FreshnessUnit::Days => delta.num_days(),
        }
    }
}

/// How old a revocation artifact may be before it has to be fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessPolicy {
    pub tolerance: i64,
    pub unit: FreshnessUnit,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            tolerance: 1,
            unit: FreshnessUnit::Days,
        }
    }
}

impl FreshnessPolicy {
    pub fn new(tolerance: i64, unit: FreshnessUnit) -> Self {
        Self { tolerance, unit }
    }

    pub fn is_fresh(&self, next_update: Option<DateTime<Utc>>, issuing_time: DateTime<Utc>) -> bool {
        self.is_fresh_at(next_update, issuing_time, Utc::now())
    }

    /// Fresh iff `next_update` lies strictly after `now` and no more than
    /// `tolerance` whole units have elapsed since `issuing_time`.
    pub fn is_fresh_at(
        &self,
        next_update: Option<DateTime<Utc>>,
        issuing_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(next_update) = next_update else {
            return false;
        };
        if next_update <= now {
            return false;
        }
        self.unit.whole_units(now - issuing_time) <= self.tolerance
    }
}

/// Validity window of the last artifact fetched from a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessRecord {
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

/// URL-keyed freshness records shared by concurrent lookups.
#[derive(Debug, Default)]
pub struct FreshnessCache {
    policy: FreshnessPolicy,
    records: DashMap<String, FreshnessRecord>,
}

impl FreshnessCache {
    pub fn new(policy: FreshnessPolicy) -> Self {
        Self {
            policy,
            records: DashMap::new(),
        }
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    pub fn should_refresh(&self, url: &str) -> bool {
        self.should_refresh_at(url, Utc::now())
    }

    /// A URL without a record always needs a refresh.
    pub fn should_refresh_at(&self, url: &str, now: DateTime<Utc>) -> bool {
        let Some(record) = self.records.get(url).map(|r| *r.value()) else {
            debug!("No freshness record for {}, refresh required", url);
            return true;
        };
        !self
            .policy
            .is_fresh_at(record.next_update, record.this_update, now)
    }

    /// Replace the record for `url`.
    pub fn record(&self, url: &str, record: FreshnessRecord) {
        self.records.insert(url.to_string(), record);
    }

    pub fn get(&self, url: &str) -> Option<FreshnessRecord> {
        self.records.get(url).map(|r| *r.value())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_within_tolerance() {
        let policy = FreshnessPolicy::default();
        let now = at(12);
        let next_update = Some(now + TimeDelta::days(7));

        assert!(policy.is_fresh_at(next_update, now - TimeDelta::hours(30), now));
        assert!(policy.is_fresh_at(next_update, now - TimeDelta::hours(47), now));
        assert!(!policy.is_fresh_at(next_update, now - TimeDelta::days(2), now));
    }

    #[test]
    fn test_past_next_update_is_stale() {
        let policy = FreshnessPolicy::new(1000, FreshnessUnit::Days);
        let now = at(12);
        assert!(!policy.is_fresh_at(Some(at(11)), now, now));
        assert!(!policy.is_fresh_at(Some(now), now, now));
        assert!(!policy.is_fresh_at(None, now, now));
    }

    #[test]
    fn test_units() {
        let now = at(12);
        let issued = now - TimeDelta::minutes(90);
        let next_update = Some(now + TimeDelta::hours(1));

        assert!(FreshnessPolicy::new(1, FreshnessUnit::Hours).is_fresh_at(next_update, issued, now));
        assert!(!FreshnessPolicy::new(60, FreshnessUnit::Minutes).is_fresh_at(next_update, issued, now));
        assert!(FreshnessPolicy::new(5400, FreshnessUnit::Seconds).is_fresh_at(next_update, issued, now));
    }

    #[test]
    fn test_missing_record_requires_refresh() {
        let cache = FreshnessCache::new(FreshnessPolicy::default());
        assert!(cache.should_refresh("http://crl.example.com/ca.crl"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_drives_refresh_decision() {
        let cache = FreshnessCache::new(FreshnessPolicy::default());
        let url = "http://crl.example.com/ca.crl";
        let now = at(12);

        cache.record(
            url,
            FreshnessRecord {
                this_update: now - TimeDelta::hours(2),
                next_update: Some(now + TimeDelta::days(1)),
            },
        );
        assert!(!cache.should_refresh_at(url, now));
        assert!(cache.should_refresh_at(url, now + TimeDelta::days(2)));
        assert!(cache.should_refresh("http://crl.example.com/other.crl"));
    }
}
