use chrono::{DateTime, Utc};
use clap::Parser;
use contribscores::aggregator::ScoreAggregator;
use contribscores::cache::ReportCache;
use contribscores::config::{Config, ReportSpec, MAX_INCLUDE_LIMIT};
use contribscores::dump_parser::DumpParser;
use contribscores::eligibility::BOT_GROUP;
use contribscores::render::ReportRenderer;
use contribscores::store::{GroupMembership, WikiStore};
use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Compute contribution score leaderboards from a MediaWiki XML dump.
#[derive(Debug, clap::Parser)]
struct CommandLine {
    /// Dump file, zstd compressed if it ends in `.zst`.
    input_file: PathBuf,
    /// Render a single embedded leaderboard for `limit/days/options` instead of the full page.
    #[arg(long)]
    include: Option<String>,
    /// Print one metric (score, changes, pages, creations, absdiff) of one user.
    #[arg(long, num_args = 2, value_names = ["USER", "METRIC"])]
    metric: Option<Vec<String>>,
    /// Reference time for windows, RFC 3339. Defaults to the current time.
    #[arg(long)]
    now: Option<DateTime<Utc>>,
    /// Leave this user out of all reports.
    #[arg(long = "ignore-user")]
    ignore_users: Vec<String>,
    /// Put this user into the bot group.
    #[arg(long = "bot")]
    bots: Vec<String>,
    /// Mark this user as blocked.
    #[arg(long = "blocked")]
    blocked: Vec<String>,
    #[arg(long)]
    keep_bots: bool,
    #[arg(long)]
    keep_blocked: bool,
    #[arg(long)]
    rough_edit_count: bool,
    /// Link users by their real name, if one is given with `--real-name`.
    #[arg(long)]
    use_real_name: bool,
    /// Real name of a user, as `USER=NAME`.
    #[arg(long = "real-name", value_parser = parse_real_name)]
    real_names: Vec<(String, String)>,
    /// Report shown on the full page, as `DAYS/LIMIT`. Replaces the default reports.
    #[arg(long = "report", value_parser = parse_report)]
    reports: Vec<ReportSpec>,
    /// Prefix of page links.
    #[arg(long, default_value = "/wiki/")]
    article_path: String,
    /// Stop each report after scanning this many eligible users.
    #[arg(long)]
    max_users: Option<usize>,
}

impl CommandLine {
    fn config(&self) -> Config {
        let config = Config::default()
            .with_ignore_bots(!self.keep_bots)
            .with_ignore_blocked_users(!self.keep_blocked)
            .with_ignored_usernames(self.ignore_users.iter().map(String::as_str))
            .with_rough_edit_count(self.rough_edit_count)
            .with_use_real_name(self.use_real_name)
            .with_max_users_scanned(self.max_users);
        if self.reports.is_empty() {
            config
        } else {
            config.with_reports(self.reports.clone())
        }
    }
}

fn parse_real_name(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(user, name)| (user.to_string(), name.to_string()))
        .ok_or_else(|| format!("expected USER=NAME, got `{value}`"))
}

fn parse_report(value: &str) -> Result<ReportSpec, String> {
    let (days, limit) = value
        .split_once('/')
        .ok_or_else(|| format!("expected DAYS/LIMIT, got `{value}`"))?;
    let days = days.parse::<u32>().map_err(|e| format!("invalid day count `{days}`: {e}"))?;
    let limit: usize = limit.parse().map_err(|e| format!("invalid limit `{limit}`: {e}"))?;
    if !(1..=MAX_INCLUDE_LIMIT).contains(&limit) {
        return Err(format!("limit must be between 1 and {MAX_INCLUDE_LIMIT}"));
    }
    Ok(ReportSpec::new(days, limit))
}

fn open_dump(path: &Path) -> Result<Box<dyn BufRead>, Box<dyn Error>> {
    let file = File::open(path)
        .map_err(|e| format!("failed to open {}: {e}", path.display()))?;
    let reader = BufReader::new(file);
    if path.extension().is_some_and(|extension| extension == "zst") {
        let reader = zstd::stream::Decoder::with_buffer(reader)?;
        Ok(Box::new(BufReader::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

fn run(args: CommandLine) -> Result<(), Box<dyn Error>> {
    let mut parser = DumpParser::new(open_dump(&args.input_file)?)?;
    tracing::info!(site = ?parser.site_info(), "reading dump");

    let mut store = WikiStore::from_pages(parser.parse_all()?);
    for name in &args.bots {
        if !store.add_group(name, GroupMembership::new(BOT_GROUP)) {
            tracing::warn!(name, "unknown user, cannot add to bot group");
        }
    }
    for name in &args.blocked {
        if !store.set_blocked(name, true) {
            tracing::warn!(name, "unknown user, cannot block");
        }
    }
    for (name, real_name) in &args.real_names {
        if !store.set_real_name(name, real_name) {
            tracing::warn!(name, "unknown user, cannot set real name");
        }
    }

    let config = args.config();
    let aggregator = ScoreAggregator::new(&store, &config);
    let now = args.now.unwrap_or_else(Utc::now);

    if let Some([user, metric]) = args.metric.as_deref() {
        println!("{}", aggregator.inline_metric(user, metric)?);
        return Ok(());
    }

    let site_info = parser.site_info();
    let renderer = ReportRenderer::new(&config)
        .with_article_path(&args.article_path)
        .with_namespaces(site_info.user_namespace(), site_info.user_talk_namespace());
    let mut cache = ReportCache::new(&config);
    let html = match &args.include {
        Some(par) => renderer.render_include(&aggregator, &mut cache, Some(par), now)?,
        None => renderer.render_page(&aggregator, &mut cache, now)?,
    };
    println!("{html}");

    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("contribscores=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CommandLine::parse();
    if let Err(e) = run(args) {
        tracing::error!(error = %e, "contribscores failed");
        std::process::exit(1);
    }
}
