use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rustc_hash::FxHashMap;

use crate::{aggregator::ScoreEntry, config::Config};

#[derive(Debug, Clone)]
struct CachedReport {
    computed_at: DateTime<Utc>,
    entries: Arc<[ScoreEntry]>,
}

/// Time-bounded cache of computed reports, keyed by window length in days.
#[derive(Debug)]
pub struct ReportCache {
    /// `None` disables caching.
    ttl: Option<Duration>,
    reports: FxHashMap<u32, CachedReport>,
}

impl ReportCache {
    pub fn new(config: &Config) -> Self {
        let ttl = config
            .caching_enabled()
            .then(|| Duration::minutes(i64::from(config.cache_ttl_minutes)));
        Self {
            ttl,
            reports: FxHashMap::default(),
        }
    }

    fn is_fresh(&self, report: &CachedReport, now: DateTime<Utc>) -> bool {
        self.ttl
            .is_some_and(|ttl| now < report.computed_at + ttl)
    }

    pub fn get(&self, days: u32, now: DateTime<Utc>) -> Option<Arc<[ScoreEntry]>> {
        self.reports
            .get(&days)
            .filter(|report| self.is_fresh(report, now))
            .map(|report| report.entries.clone())
    }

    /// Return the cached report for `days`, or run `compute` and cache its result.
    pub fn get_or_compute<E>(
        &mut self,
        days: u32,
        now: DateTime<Utc>,
        compute: impl FnOnce() -> Result<Vec<ScoreEntry>, E>,
    ) -> Result<Arc<[ScoreEntry]>, E> {
        if let Some(entries) = self.get(days, now) {
            tracing::debug!(days, "report cache hit");
            return Ok(entries);
        }

        let entries: Arc<[ScoreEntry]> = compute()?.into();
        if self.ttl.is_some() {
            tracing::debug!(days, entries = entries.len(), "caching report");
            self.reports.insert(
                days,
                CachedReport {
                    computed_at: now,
                    entries: entries.clone(),
                },
            );
        }
        Ok(entries)
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.reports
            .retain(|_, report| ttl.is_some_and(|ttl| now < report.computed_at + ttl));
    }

    pub fn clear(&mut self) {
        self.reports.clear();
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn entry(score: f64) -> ScoreEntry {
        ScoreEntry {
            user_id: 1,
            user_name: "A".into(),
            user_real_name: None,
            unique_pages: 0,
            change_count: 0,
            abs_diff: 0,
            score,
        }
    }

    #[test]
    fn serves_cached_report_within_ttl() {
        let mut cache = ReportCache::new(&Config::default().with_cache_ttl_minutes(10));
        let mut calls = 0;
        let mut compute = |score| {
            calls += 1;
            Ok::<_, Infallible>(vec![entry(score)])
        };

        let first = cache.get_or_compute(7, now(), || compute(1.0)).unwrap();
        let second = cache
            .get_or_compute(7, now() + Duration::minutes(9), || compute(2.0))
            .unwrap();
        assert_eq!(first, second);

        let expired = cache
            .get_or_compute(7, now() + Duration::minutes(10), || compute(3.0))
            .unwrap();
        assert_eq!(expired[0].score, 3.0);
        assert_eq!(calls, 2);
    }

    #[test]
    fn windows_are_cached_separately() {
        let mut cache = ReportCache::new(&Config::default());
        cache
            .get_or_compute(7, now(), || Ok::<_, Infallible>(vec![entry(1.0)]))
            .unwrap();
        cache
            .get_or_compute(30, now(), || Ok::<_, Infallible>(vec![entry(2.0)]))
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(30, now()).unwrap()[0].score, 2.0);
        assert!(cache.get(0, now()).is_none());
    }

    #[test]
    fn disabled_cache_always_recomputes() {
        let mut cache = ReportCache::new(&Config::default().with_disable_cache(true));
        cache
            .get_or_compute(7, now(), || Ok::<_, Infallible>(vec![entry(1.0)]))
            .unwrap();

        assert!(cache.is_empty());
        assert!(cache.get(7, now()).is_none());
    }

    #[test]
    fn errors_are_not_cached() {
        let mut cache = ReportCache::new(&Config::default());
        let result = cache.get_or_compute(7, now(), || Err("store down"));
        assert_eq!(result.unwrap_err(), "store down");
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_drops_expired_reports() {
        let mut cache = ReportCache::new(&Config::default().with_cache_ttl_minutes(5));
        cache
            .get_or_compute(7, now(), || Ok::<_, Infallible>(vec![]))
            .unwrap();
        cache
            .get_or_compute(30, now() + Duration::minutes(3), || Ok::<_, Infallible>(vec![]))
            .unwrap();

        cache.purge_expired(now() + Duration::minutes(6));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(30, now() + Duration::minutes(6)).is_some());
    }
}
