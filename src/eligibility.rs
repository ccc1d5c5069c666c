use chrono::{DateTime, Utc};
use compact_str::CompactString;
use rustc_hash::FxHashSet;

use crate::{config::Config, store::User};

pub const BOT_GROUP: &str = "bot";

/// Why a user is left out of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    NoEdits,
    Unregistered,
    Blocked,
    Bot,
    IgnoredName,
}

/// Decides which users take part in a report.
#[derive(Debug)]
pub struct EligibilityFilter {
    ignore_bots: bool,
    ignore_blocked_users: bool,
    ignored_names: FxHashSet<CompactString>,
    /// Bot memberships expiring before this instant no longer count.
    reference_time: DateTime<Utc>,
}

impl EligibilityFilter {
    pub fn new(config: &Config, reference_time: DateTime<Utc>) -> Self {
        Self {
            ignore_bots: config.ignore_bots,
            ignore_blocked_users: config.ignore_blocked_users,
            ignored_names: config.ignore_usernames.iter().cloned().collect(),
            reference_time,
        }
    }

    pub fn exclusion(&self, user: &User) -> Option<Exclusion> {
        if user.edit_count == 0 {
            Some(Exclusion::NoEdits)
        } else if !user.registered {
            Some(Exclusion::Unregistered)
        } else if self.ignore_blocked_users && user.blocked {
            Some(Exclusion::Blocked)
        } else if self.ignore_bots && user.in_group_at(BOT_GROUP, self.reference_time) {
            Some(Exclusion::Bot)
        } else if self.ignored_names.contains(&user.name) {
            Some(Exclusion::IgnoredName)
        } else {
            None
        }
    }

    pub fn is_eligible(&self, user: &User) -> bool {
        self.exclusion(user).is_none()
    }

    pub fn filter<'a, I>(&'a self, users: I) -> impl Iterator<Item = User> + 'a
    where
        I: IntoIterator<Item = User>,
        I::IntoIter: 'a,
    {
        users.into_iter().filter(move |user| match self.exclusion(user) {
            None => true,
            Some(reason) => {
                tracing::trace!(user = user.name.as_str(), ?reason, "user excluded");
                false
            }
        })
    }
}
