//! Turns users and their revisions into a ranked leaderboard.
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use compact_str::CompactString;
use tracing::instrument;

use crate::{
    config::Config,
    eligibility::EligibilityFilter,
    metrics::{Metric, MetricContext, UserMetrics},
    store::{RevisionStore, StoreError, User, UserDirectory, UserId},
    top_k::{Scored, TopK},
    utils::format_number,
};

/// One row of a leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub user_id: UserId,
    pub user_name: CompactString,
    pub user_real_name: Option<CompactString>,
    pub unique_pages: u64,
    pub change_count: u64,
    pub abs_diff: u64,
    /// Always `unique_pages * 2 + abs_diff / 100`.
    pub score: f64,
}

impl ScoreEntry {
    pub fn new(user: &User, metrics: &UserMetrics) -> Self {
        Self {
            user_id: user.id,
            user_name: user.name.clone(),
            user_real_name: user.real_name.clone(),
            unique_pages: metrics.unique_pages,
            change_count: metrics.change_count,
            abs_diff: metrics.abs_diff,
            score: metrics.score(),
        }
    }

    /// The score rounded half away from zero, as shown to readers.
    pub fn display_score(&self) -> i64 {
        self.score.round() as i64
    }
}

impl Scored for ScoreEntry {
    fn score(&self) -> f64 {
        self.score
    }
}

/// Result of the inline metric accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricOutput {
    /// The formatted metric value.
    Value(String),
    InvalidUsername,
    InvalidMetric,
}

impl fmt::Display for MetricOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricOutput::Value(value) => f.write_str(value),
            MetricOutput::InvalidUsername => f.write_str("Invalid username"),
            MetricOutput::InvalidMetric => f.write_str("Invalid metric"),
        }
    }
}

/// First instant of a window of `days` days ending at `now`, `None` for all time.
///
/// Windows reaching back past the earliest representable date cover all time as well.
pub fn window_start(days: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if days == 0 {
        return None;
    }
    TimeDelta::try_days(i64::from(days)).and_then(|window| now.checked_sub_signed(window))
}

pub struct ScoreAggregator<'a, S: ?Sized> {
    store: &'a S,
    config: &'a Config,
}

impl<'a, S> ScoreAggregator<'a, S>
where
    S: RevisionStore + UserDirectory + ?Sized,
{
    pub fn new(store: &'a S, config: &'a Config) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    /// The `limit` highest-scoring eligible users over the last `window_days` days
    /// (`0` for all time), highest score first.
    #[instrument(skip(self), fields(eligible = tracing::field::Empty))]
    pub fn report(
        &self,
        window_days: u32,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoreEntry>, StoreError> {
        let since = window_start(window_days, now);
        let filter = EligibilityFilter::new(self.config, since.unwrap_or(now));
        let metrics = MetricContext::new(self.store, self.config, since);

        let mut top = TopK::new(limit);
        let mut scanned = 0usize;
        for user in filter.filter(self.store.users()?) {
            if self
                .config
                .max_users_scanned
                .is_some_and(|max| scanned >= max)
            {
                tracing::warn!(
                    scanned,
                    "user scan budget exhausted, report covers only the users scanned so far"
                );
                break;
            }
            scanned += 1;

            let user_metrics = metrics.compute(&user)?;
            top.offer(ScoreEntry::new(&user, &user_metrics));
        }

        tracing::Span::current().record("eligible", scanned);
        let entries = top.into_sorted_vec();
        tracing::debug!(scanned, returned = entries.len(), "computed contribution scores");
        Ok(entries)
    }

    /// A single all-time metric for one user, formatted for display.
    #[instrument(skip(self))]
    pub fn inline_metric(
        &self,
        username: &str,
        metric_name: &str,
    ) -> Result<MetricOutput, StoreError> {
        let user = match self.store.user_by_name(username)? {
            Some(user) if user.registered => user,
            _ => return Ok(MetricOutput::InvalidUsername),
        };
        let Ok(metric) = metric_name.parse::<Metric>() else {
            return Ok(MetricOutput::InvalidMetric);
        };

        let context = MetricContext::new(self.store, self.config, None);
        let value = match metric {
            Metric::Score => context.score(&user)?.round() as i64,
            Metric::Changes => context.change_count(&user)? as i64,
            Metric::Pages => context.unique_pages(&user)? as i64,
            Metric::Creations => context.created_pages(&user)? as i64,
            Metric::AbsDiff => context.abs_diff(&user)? as i64,
        };
        Ok(MetricOutput::Value(format_number(value)))
    }
}
