//! Read-only access to users and their revisions.
//!
//! The aggregator only talks to the [`RevisionStore`] and [`UserDirectory`] traits.
//! [`WikiStore`] implements both in memory and can be loaded from parsed dump pages.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use rustc_hash::FxHashMap;

use crate::dump_parser::{Page, Text};

pub type UserId = i32;
pub type PageId = i32;
pub type RevisionId = i32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMembership {
    pub group: CompactString,
    /// `None` means the membership never expires.
    pub expiry: Option<DateTime<Utc>>,
}

impl GroupMembership {
    pub fn new(group: &str) -> Self {
        Self {
            group: group.into(),
            expiry: None,
        }
    }

    pub fn expiring(group: &str, expiry: DateTime<Utc>) -> Self {
        Self {
            group: group.into(),
            expiry: Some(expiry),
        }
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.expiry.map_or(true, |expiry| expiry >= at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: CompactString,
    pub real_name: Option<CompactString>,
    pub registered: bool,
    /// Running total maintained by the wiki, not derived from the revisions in a window.
    pub edit_count: u64,
    pub blocked: bool,
    pub groups: Vec<GroupMembership>,
}

impl User {
    pub fn registered(id: UserId, name: &str) -> Self {
        Self {
            id,
            name: name.into(),
            real_name: None,
            registered: true,
            edit_count: 0,
            blocked: false,
            groups: Vec::new(),
        }
    }

    pub fn anonymous(id: UserId, name: &str) -> Self {
        Self {
            registered: false,
            ..Self::registered(id, name)
        }
    }

    pub fn in_group_at(&self, group: &str, at: DateTime<Utc>) -> bool {
        self.groups
            .iter()
            .any(|membership| membership.group == group && membership.is_active_at(at))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionEdit {
    pub id: RevisionId,
    pub page_id: PageId,
    pub parent_id: Option<RevisionId>,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub text: Text,
}

impl RevisionEdit {
    /// Whether this edit created its page. Parent id `0` is how MediaWiki spells "none".
    pub fn is_creation(&self) -> bool {
        matches!(self.parent_id, None | Some(0))
    }
}

/// Predicates applied when listing a user's edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditQuery {
    /// Inclusive lower bound; `None` selects all time.
    pub since: Option<DateTime<Utc>>,
    pub creations_only: bool,
}

impl EditQuery {
    pub fn all_time() -> Self {
        Self::default()
    }

    pub fn since(since: Option<DateTime<Utc>>) -> Self {
        Self {
            since,
            creations_only: false,
        }
    }

    pub fn creations(self) -> Self {
        Self {
            creations_only: true,
            ..self
        }
    }

    pub fn matches(&self, edit: &RevisionEdit) -> bool {
        self.since.map_or(true, |since| edit.timestamp >= since)
            && (!self.creations_only || edit.is_creation())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown user id {0}")]
    UnknownUser(UserId),
    #[error("revision store failure: {0}")]
    Backend(String),
}

pub trait RevisionStore {
    /// All edits by `user` matching `query`, in no particular order.
    fn edits_by_user(
        &self,
        user: UserId,
        query: &EditQuery,
    ) -> Result<Vec<Arc<RevisionEdit>>, StoreError>;

    /// Look up a single revision; `Ok(None)` if it does not exist.
    fn revision(&self, id: RevisionId) -> Result<Option<Arc<RevisionEdit>>, StoreError>;
}

pub trait UserDirectory {
    fn user_by_name(&self, name: &str) -> Result<Option<User>, StoreError>;

    fn users(&self) -> Result<Vec<User>, StoreError>;
}

/// Normalize a user name the way MediaWiki does: underscores become spaces, surrounding
/// whitespace is dropped and the first letter is upper-cased.
///
/// Returns `None` for names MediaWiki would reject.
pub fn canonical_username(name: &str) -> Option<CompactString> {
    const FORBIDDEN: &[char] = &['#', '<', '>', '[', ']', '|', '{', '}', '/'];

    let name = name.replace('_', " ");
    let name = name.trim();
    if name.is_empty() || name.contains(FORBIDDEN) {
        return None;
    }

    let mut chars = name.chars();
    let first = chars.next()?;
    let mut canonical = CompactString::default();
    canonical.extend(first.to_uppercase());
    canonical.push_str(chars.as_str());
    Some(canonical)
}

/// In-memory revision store and user directory.
#[derive(Debug, Default)]
pub struct WikiStore {
    revisions: FxHashMap<RevisionId, Arc<RevisionEdit>>,
    edits_by_user: FxHashMap<UserId, Vec<Arc<RevisionEdit>>>,
    users: FxHashMap<UserId, User>,
    /// Every name a user appeared under, including names from before a rename.
    user_ids_by_name: FxHashMap<CompactString, UserId>,
    /// Timestamp of the newest revision carrying a registered user's current name.
    name_seen_at: FxHashMap<UserId, DateTime<Utc>>,
    next_anonymous_id: UserId,
}

impl WikiStore {
    pub fn new() -> Self {
        Self {
            next_anonymous_id: -1,
            ..Self::default()
        }
    }

    /// Build a store from dump pages.
    ///
    /// Revisions without an explicit parent id take the preceding revision of the same page
    /// as their parent. Contributors with an id become registered users, all others are
    /// tracked as anonymous users with synthetic negative ids. A registered user seen under
    /// several names keeps one record named after their newest revision, and every earlier
    /// name still resolves to it.
    pub fn from_pages(pages: impl IntoIterator<Item = Page>) -> Self {
        let mut store = Self::new();

        for page in pages {
            let mut previous = None;
            for revision in page.revisions {
                let user_id = store.user_id_for(&revision.contributor, revision.timestamp);
                let parent_id = revision.parent_id.or(previous);
                previous = Some(revision.id);

                store.insert_edit(RevisionEdit {
                    id: revision.id,
                    page_id: page.id,
                    parent_id,
                    user_id,
                    timestamp: revision.timestamp,
                    text: revision.text,
                });
            }
        }

        tracing::debug!(
            users = store.users.len(),
            revisions = store.revisions.len(),
            "built revision store"
        );
        store
    }

    fn user_id_for(
        &mut self,
        contributor: &crate::dump_parser::Contributor,
        at: DateTime<Utc>,
    ) -> UserId {
        if let Some(id) = contributor.id.filter(|_| contributor.is_registered()) {
            return self.registered_user_id(id, &contributor.username, at);
        }

        if let Some(&id) = self.user_ids_by_name.get(&contributor.username) {
            return id;
        }
        let id = self.next_anonymous_id;
        self.next_anonymous_id -= 1;
        self.insert_user(User::anonymous(id, &contributor.username));
        id
    }

    fn registered_user_id(&mut self, id: UserId, name: &CompactString, at: DateTime<Utc>) -> UserId {
        if !self.users.contains_key(&id) {
            self.insert_user(User::registered(id, name));
            self.name_seen_at.insert(id, at);
            return id;
        }
        let Some(user) = self.users.get_mut(&id) else {
            return id;
        };

        if user.name != *name {
            self.user_ids_by_name.insert(name.clone(), id);
        }
        let seen = self.name_seen_at.entry(id).or_insert(at);
        if at >= *seen {
            *seen = at;
            if user.name != *name {
                tracing::debug!(id, old = user.name.as_str(), new = name.as_str(), "user renamed");
                user.name = name.clone();
            }
        }
        id
    }

    /// Add or replace a user record.
    pub fn insert_user(&mut self, user: User) {
        if let Some(previous) = self.users.get(&user.id) {
            self.user_ids_by_name.remove(&previous.name);
        }
        self.user_ids_by_name.insert(user.name.clone(), user.id);
        self.users.insert(user.id, user);
    }

    /// Add a revision and bump its author's running edit count.
    pub fn insert_edit(&mut self, edit: RevisionEdit) {
        if let Some(user) = self.users.get_mut(&edit.user_id) {
            user.edit_count += 1;
        }

        let edit = Arc::new(edit);
        self.edits_by_user
            .entry(edit.user_id)
            .or_default()
            .push(edit.clone());
        self.revisions.insert(edit.id, edit);
    }

    fn user_mut(&mut self, name: &str) -> Option<&mut User> {
        let id = self.user_ids_by_name.get(name)?;
        self.users.get_mut(id)
    }

    /// Returns `false` if no user has that name.
    pub fn set_blocked(&mut self, name: &str, blocked: bool) -> bool {
        self.user_mut(name)
            .map(|user| user.blocked = blocked)
            .is_some()
    }

    /// Returns `false` if no user has that name.
    pub fn add_group(&mut self, name: &str, membership: GroupMembership) -> bool {
        self.user_mut(name)
            .map(|user| user.groups.push(membership))
            .is_some()
    }

    /// Returns `false` if no user has that name.
    pub fn set_real_name(&mut self, name: &str, real_name: &str) -> bool {
        self.user_mut(name)
            .map(|user| user.real_name = Some(real_name.into()))
            .is_some()
    }

    pub fn num_revisions(&self) -> usize {
        self.revisions.len()
    }
}

impl RevisionStore for WikiStore {
    fn edits_by_user(
        &self,
        user: UserId,
        query: &EditQuery,
    ) -> Result<Vec<Arc<RevisionEdit>>, StoreError> {
        if !self.users.contains_key(&user) {
            return Err(StoreError::UnknownUser(user));
        }

        Ok(self
            .edits_by_user
            .get(&user)
            .map(|edits| {
                edits
                    .iter()
                    .filter(|edit| query.matches(edit))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn revision(&self, id: RevisionId) -> Result<Option<Arc<RevisionEdit>>, StoreError> {
        Ok(self.revisions.get(&id).cloned())
    }
}

impl UserDirectory for WikiStore {
    fn user_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        let Some(name) = canonical_username(name) else {
            return Ok(None);
        };
        Ok(self
            .user_ids_by_name
            .get(&name)
            .and_then(|id| self.users.get(id))
            .cloned())
    }

    /// Users in ascending id order, so that reports break ties the same way every time.
    fn users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by_key(|user| user.id);
        Ok(users)
    }
}
