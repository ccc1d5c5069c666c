//! HTML presentation of leaderboards.
//!
//! Rendering only consumes the ordered [`ScoreEntry`] slice; computing it is up to the
//! [`ScoreAggregator`], with results shared through the [`ReportCache`].
use std::fmt::Write;

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;

use crate::{
    aggregator::{ScoreAggregator, ScoreEntry},
    cache::ReportCache,
    config::{Config, MAX_INCLUDE_LIMIT},
    store::{RevisionStore, StoreError, UserDirectory},
    utils::{format_number, url_encode_title},
};

const DEFAULT_INCLUDE_LIMIT: usize = 10;
const DEFAULT_INCLUDE_DAYS: u32 = 7;

/// Options given as a comma-separated list, e.g. `nosort,notools`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOptions {
    /// Mark the table sortable. Unsortable tables get alternating row classes instead.
    pub sortable: bool,
    /// Show talk and contributions links after each user.
    pub tools: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            sortable: true,
            tools: true,
        }
    }
}

impl DisplayOptions {
    pub fn parse(options: &str) -> Self {
        let mut result = Self::default();
        for option in options.split(',') {
            match option.trim().to_lowercase().as_str() {
                "nosort" => result.sortable = false,
                "notools" => result.tools = false,
                _ => {}
            }
        }
        result
    }
}

/// Parameters of an embedded leaderboard, written as `limit/days/options`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeParams {
    pub limit: usize,
    pub days: u32,
    pub options: DisplayOptions,
}

/// Leading integer of `value`, 0 if there is none. Saturates instead of overflowing.
fn leading_integer(value: &str) -> i64 {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(i64::from(digit - b'0'))
        });
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

impl IncludeParams {
    /// Each segment is read up to its first non-digit, so `20abc` is 20 and an empty or
    /// non-numeric day count is 0 (all time). Out-of-range limits fall back to 10 and missing
    /// or negative day counts to 7.
    pub fn parse(par: Option<&str>) -> Self {
        let par = par.unwrap_or_default();
        if par.is_empty() || par == "0" {
            return Self {
                limit: DEFAULT_INCLUDE_LIMIT,
                days: DEFAULT_INCLUDE_DAYS,
                options: DisplayOptions::default(),
            };
        }
        let mut params = par.split('/');

        let limit = params
            .next()
            .map(leading_integer)
            .filter(|limit| (1..=MAX_INCLUDE_LIMIT as i64).contains(limit))
            .map_or(DEFAULT_INCLUDE_LIMIT, |limit| limit as usize);
        let days = params
            .next()
            .map(leading_integer)
            .filter(|days| *days >= 0)
            .map_or(DEFAULT_INCLUDE_DAYS, |days| {
                u32::try_from(days).unwrap_or(u32::MAX)
            });
        let options = params
            .next()
            .map(DisplayOptions::parse)
            .unwrap_or_default();

        Self {
            limit,
            days,
            options,
        }
    }
}

/// Heading of a report, e.g. `Last 7 days (Top 10)`.
pub fn report_title(days: u32, limit: usize) -> String {
    let window = if days > 0 {
        let unit = if days == 1 { "day" } else { "days" };
        format!("Last {} {unit}", format_number(i64::from(days)))
    } else {
        "All time".to_string()
    };
    format!("{window} (Top {})", format_number(limit as i64))
}

/// Renders leaderboards as HTML tables linking to user pages.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    use_real_name: bool,
    article_path: String,
    user_namespace: String,
    user_talk_namespace: String,
}

impl ReportRenderer {
    pub fn new(config: &Config) -> Self {
        Self {
            use_real_name: config.use_real_name,
            article_path: "/wiki/".to_string(),
            user_namespace: "User".to_string(),
            user_talk_namespace: "User talk".to_string(),
        }
    }

    /// Prefix of page links, `/wiki/` by default.
    pub fn with_article_path(mut self, article_path: &str) -> Self {
        self.article_path = article_path.to_string();
        self
    }

    /// Localized names of the user and user talk namespaces.
    pub fn with_namespaces(mut self, user: &str, user_talk: &str) -> Self {
        self.user_namespace = user.to_string();
        self.user_talk_namespace = user_talk.to_string();
        self
    }

    fn page_url(&self, title: &str) -> String {
        format!(
            "{}{}",
            self.article_path,
            url_encode_title(&title.replace(' ', "_"))
        )
    }

    fn link(&self, title: &str, text: &str) -> String {
        format!(
            "<a href=\"{}\" title=\"{}\">{}</a>",
            escape(&self.page_url(title)),
            escape(title),
            escape(text)
        )
    }

    fn user_cell(&self, entry: &ScoreEntry, options: &DisplayOptions) -> String {
        let text = match &entry.user_real_name {
            Some(real_name) if self.use_real_name && !real_name.is_empty() => real_name.as_str(),
            _ => entry.user_name.as_str(),
        };
        let mut cell = self.link(
            &format!("{}:{}", self.user_namespace, entry.user_name),
            text,
        );

        if options.tools {
            let talk = self.link(
                &format!("{}:{}", self.user_talk_namespace, entry.user_name),
                "talk",
            );
            let contribs = self.link(
                &format!("Special:Contributions/{}", entry.user_name),
                "contribs",
            );
            let _ = write!(cell, " <span class=\"mw-usertoollinks\">({talk} | {contribs})</span>");
        }
        cell
    }

    /// Render at most `limit` entries as a table, optionally wrapped with a title.
    pub fn render_table(
        &self,
        entries: &[ScoreEntry],
        limit: usize,
        title: Option<&str>,
        options: &DisplayOptions,
    ) -> String {
        const NUMERIC: &str = "<td class=\"content\" style=\"padding-right:10px;text-align:right;\">";

        let sortable = if options.sortable { " sortable" } else { "" };
        let mut output = format!(
            "<table class=\"wikitable contributionscores plainlinks{sortable}\">\n<tr class=\"header\"><th>Rank</th><th>Score</th><th>Abs. diff</th><th>Pages</th><th>Changes</th><th>Username</th></tr>\n"
        );

        for (index, entry) in entries.iter().take(limit).enumerate() {
            let row_class = if !options.sortable && index % 2 == 1 {
                "odd"
            } else {
                ""
            };
            let _ = writeln!(
                output,
                "<tr class=\"{row_class}\">{NUMERIC}{}</td>{NUMERIC}{}</td>{NUMERIC}{}</td>{NUMERIC}{}</td>{NUMERIC}{}</td><td class=\"content\">{}</td></tr>",
                format_number(index as i64 + 1),
                format_number(entry.display_score()),
                format_number(entry.abs_diff as i64),
                format_number(entry.unique_pages as i64),
                format_number(entry.change_count as i64),
                self.user_cell(entry, options),
            );
        }
        output.push_str("</table>");

        match title {
            Some(title) if !title.is_empty() => format!(
                "<table class=\"contributionscores-wrapper\" style=\"border-spacing: 0; padding: 0\" lang=\"en\" dir=\"ltr\">\n<tr><td style=\"padding: 0px;\">{title}</td></tr>\n<tr><td style=\"padding: 0px;\">{output}</td></tr>\n</table>"
            ),
            _ => output,
        }
    }

    /// An embedded leaderboard for `limit/days/options` parameters.
    pub fn render_include<S>(
        &self,
        aggregator: &ScoreAggregator<'_, S>,
        cache: &mut ReportCache,
        par: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError>
    where
        S: RevisionStore + UserDirectory + ?Sized,
    {
        let params = IncludeParams::parse(par);
        let entries = cache.get_or_compute(params.days, now, || {
            aggregator.report(params.days, MAX_INCLUDE_LIMIT, now)
        })?;

        let title = format!(
            "<h4 class=\"contributionscores-title\">{}</h4>\n",
            escape(&report_title(params.days, params.limit))
        );
        Ok(self.render_table(&entries, params.limit, Some(&title), &params.options))
    }

    /// The full leaderboard page with every configured report.
    pub fn render_page<S>(
        &self,
        aggregator: &ScoreAggregator<'_, S>,
        cache: &mut ReportCache,
        now: DateTime<Utc>,
    ) -> Result<String, StoreError>
    where
        S: RevisionStore + UserDirectory + ?Sized,
    {
        let mut output = String::from(
            "<p>Contribution scores rank editors by the number of distinct pages they edited and the size of their changes.</p>\n",
        );

        for report in &aggregator.config().reports {
            let limit = report.limit.min(MAX_INCLUDE_LIMIT);
            let entries = cache.get_or_compute(report.days, now, || {
                aggregator.report(report.days, MAX_INCLUDE_LIMIT, now)
            })?;

            let _ = writeln!(
                output,
                "<h2 class=\"contributionscores-title\">{}</h2>",
                escape(&report_title(report.days, limit))
            );
            output.push_str(&self.render_table(&entries, limit, None, &DisplayOptions::default()));
            output.push('\n');
        }
        Ok(output)
    }
}
