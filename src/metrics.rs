//! Per-user contribution metrics.
//!
//! All metrics are computed over the edits a user made inside a window (or all time).
//! `abs_diff` is the expensive one: every edit is diffed line by line against its parent
//! revision.
use std::{fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;

use crate::{
    config::Config,
    store::{EditQuery, RevisionEdit, RevisionStore, StoreError, User},
    utils::{ChangeTag, LineDiff},
};

/// `unique_pages * 2 + abs_diff / 100`.
pub fn score(unique_pages: u64, abs_diff: u64) -> f64 {
    unique_pages as f64 * 2.0 + abs_diff as f64 / 100.0
}

/// Metric names accepted by the inline accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Score,
    Changes,
    Pages,
    Creations,
    AbsDiff,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown metric `{0}`")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score" => Ok(Metric::Score),
            "changes" => Ok(Metric::Changes),
            "pages" => Ok(Metric::Pages),
            "creations" => Ok(Metric::Creations),
            "absdiff" => Ok(Metric::AbsDiff),
            _ => Err(UnknownMetric(s.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Score => "score",
            Metric::Changes => "changes",
            Metric::Pages => "pages",
            Metric::Creations => "creations",
            Metric::AbsDiff => "absdiff",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserMetrics {
    pub unique_pages: u64,
    pub change_count: u64,
    pub created_pages: u64,
    pub abs_diff: u64,
}

impl UserMetrics {
    pub fn score(&self) -> f64 {
        score(self.unique_pages, self.abs_diff)
    }
}

/// Number of distinct pages among `edits`.
pub fn count_unique_pages(edits: &[Arc<RevisionEdit>]) -> u64 {
    edits
        .iter()
        .map(|edit| edit.page_id)
        .collect::<FxHashSet<_>>()
        .len() as u64
}

/// Number of `edits` that created their page.
pub fn count_created_pages(edits: &[Arc<RevisionEdit>]) -> u64 {
    edits.iter().filter(|edit| edit.is_creation()).count() as u64
}

/// Substitution magnitude between two revisions of a page.
///
/// For each changed block of lines, the first `min(removed, added)` lines are paired up and
/// the differences of their byte lengths summed. Pure insertions and deletions, and the
/// unpaired tail of a changed block, count nothing.
pub fn abs_diff_between(parent: &str, child: &str) -> u64 {
    LineDiff::compute(parent, child)
        .ops()
        .filter(|op| op.tag == ChangeTag::Change)
        .flat_map(|op| op.orig.iter().zip(op.closing.iter()))
        .map(|(orig, closing)| orig.len().abs_diff(closing.len()) as u64)
        .sum()
}

/// Computes metrics for users against a store, restricted to one window.
pub struct MetricContext<'a, S: RevisionStore + ?Sized> {
    store: &'a S,
    rough_edit_count: bool,
    query: EditQuery,
}

impl<'a, S: RevisionStore + ?Sized> MetricContext<'a, S> {
    pub fn new(store: &'a S, config: &Config, since: Option<DateTime<Utc>>) -> Self {
        Self {
            store,
            rough_edit_count: config.rough_edit_count,
            query: EditQuery::since(since),
        }
    }

    fn edits(&self, user: &User) -> Result<Vec<Arc<RevisionEdit>>, StoreError> {
        self.store.edits_by_user(user.id, &self.query)
    }

    pub fn unique_pages(&self, user: &User) -> Result<u64, StoreError> {
        Ok(count_unique_pages(&self.edits(user)?))
    }

    pub fn change_count(&self, user: &User) -> Result<u64, StoreError> {
        if self.rough_edit_count {
            return Ok(user.edit_count);
        }
        Ok(self.edits(user)?.len() as u64)
    }

    pub fn created_pages(&self, user: &User) -> Result<u64, StoreError> {
        Ok(self
            .store
            .edits_by_user(user.id, &self.query.creations())?
            .len() as u64)
    }

    pub fn abs_diff(&self, user: &User) -> Result<u64, StoreError> {
        self.abs_diff_of(&self.edits(user)?)
    }

    pub fn score(&self, user: &User) -> Result<f64, StoreError> {
        let edits = self.edits(user)?;
        Ok(score(count_unique_pages(&edits), self.abs_diff_of(&edits)?))
    }

    /// All metrics at once, fetching the user's edits a single time.
    pub fn compute(&self, user: &User) -> Result<UserMetrics, StoreError> {
        let edits = self.edits(user)?;
        let metrics = UserMetrics {
            unique_pages: count_unique_pages(&edits),
            change_count: if self.rough_edit_count {
                user.edit_count
            } else {
                edits.len() as u64
            },
            created_pages: count_created_pages(&edits),
            abs_diff: self.abs_diff_of(&edits)?,
        };
        tracing::trace!(user = user.name.as_str(), ?metrics, "computed user metrics");
        Ok(metrics)
    }

    fn abs_diff_of(&self, edits: &[Arc<RevisionEdit>]) -> Result<u64, StoreError> {
        let mut total = 0;
        for edit in edits {
            total += self.edit_abs_diff(edit)?;
        }
        Ok(total)
    }

    /// Substitution magnitude of a single edit against its parent revision.
    pub fn edit_abs_diff(&self, edit: &RevisionEdit) -> Result<u64, StoreError> {
        let parent = match edit.parent_id {
            Some(parent_id) if parent_id != 0 => self.store.revision(parent_id)?,
            _ => None,
        };

        match parent {
            Some(parent) => Ok(abs_diff_between(parent.text.as_str(), edit.text.as_str())),
            None => {
                if !edit.is_creation() {
                    tracing::trace!(
                        revision = edit.id,
                        parent = ?edit.parent_id,
                        "parent revision not found, counting as page creation"
                    );
                }
                // the whole content against one empty line is a single changed pair
                Ok(edit.text.len() as u64)
            }
        }
    }
}
