use compact_str::CompactString;

/// Largest report that can be embedded in a page. Reports are always computed at this size
/// and truncated when rendered, so one cached result serves every smaller limit.
pub const MAX_INCLUDE_LIMIT: usize = 50;

/// A report shown on the full leaderboard page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSpec {
    /// Window length in days, `0` for all time.
    pub days: u32,
    pub limit: usize,
}

impl ReportSpec {
    pub const fn new(days: u32, limit: usize) -> Self {
        Self { days, limit }
    }
}

/// Settings for computing and presenting contribution scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Skip users in the `bot` group.
    pub ignore_bots: bool,
    /// Skip blocked users.
    pub ignore_blocked_users: bool,
    /// Skip these user names.
    pub ignore_usernames: Vec<CompactString>,
    /// Report the user's running edit counter as the number of changes instead of
    /// counting edits in the window. Faster, but ignores the window.
    pub rough_edit_count: bool,
    pub cache_ttl_minutes: u32,
    pub disable_cache: bool,
    /// Link users by their real name when they have one.
    pub use_real_name: bool,
    /// Reports shown on the full leaderboard page.
    pub reports: Vec<ReportSpec>,
    /// Stop scanning after this many eligible users.
    pub max_users_scanned: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ignore_bots: true,
            ignore_blocked_users: true,
            ignore_usernames: Vec::new(),
            rough_edit_count: false,
            cache_ttl_minutes: 30,
            disable_cache: false,
            use_real_name: false,
            reports: vec![
                ReportSpec::new(7, MAX_INCLUDE_LIMIT),
                ReportSpec::new(30, MAX_INCLUDE_LIMIT),
                ReportSpec::new(0, MAX_INCLUDE_LIMIT),
            ],
            max_users_scanned: None,
        }
    }
}

impl Config {
    pub fn with_ignore_bots(mut self, ignore_bots: bool) -> Self {
        self.ignore_bots = ignore_bots;
        self
    }

    pub fn with_ignore_blocked_users(mut self, ignore_blocked_users: bool) -> Self {
        self.ignore_blocked_users = ignore_blocked_users;
        self
    }

    pub fn with_ignored_usernames<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        self.ignore_usernames = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rough_edit_count(mut self, rough_edit_count: bool) -> Self {
        self.rough_edit_count = rough_edit_count;
        self
    }

    pub fn with_cache_ttl_minutes(mut self, minutes: u32) -> Self {
        self.cache_ttl_minutes = minutes;
        self
    }

    pub fn with_disable_cache(mut self, disable_cache: bool) -> Self {
        self.disable_cache = disable_cache;
        self
    }

    pub fn with_use_real_name(mut self, use_real_name: bool) -> Self {
        self.use_real_name = use_real_name;
        self
    }

    pub fn with_reports(mut self, reports: Vec<ReportSpec>) -> Self {
        self.reports = reports;
        self
    }

    pub fn with_max_users_scanned(mut self, max_users_scanned: Option<usize>) -> Self {
        self.max_users_scanned = max_users_scanned;
        self
    }

    /// Whether results may be cached at all.
    pub fn caching_enabled(&self) -> bool {
        !self.disable_cache && self.cache_ttl_minutes > 0
    }
}
