use chrono::{DateTime, Duration, Utc};
use std::io::Cursor;

use crate::{
    aggregator::{MetricOutput, ScoreAggregator},
    cache::ReportCache,
    config::Config,
    dump_parser::{Contributor, DumpParser, Page, Revision, Text},
    eligibility::BOT_GROUP,
    metrics::score,
    render::{DisplayOptions, ReportRenderer},
    store::{GroupMembership, WikiStore},
    test_support::prelude::*,
};

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn revision(id: i32, contributor: (Option<i32>, &str), days_ago: i64, text: &str) -> Revision {
    Revision {
        id,
        timestamp: now() - Duration::days(days_ago),
        contributor: Contributor {
            id: contributor.0,
            username: contributor.1.into(),
        },
        text: Text::Normal(text.to_string()),
        ..dummy_revision()
    }
}

const ALICE: (Option<i32>, &str) = (Some(1), "Alice");
const BOB: (Option<i32>, &str) = (Some(2), "Bob");
const ROBOT: (Option<i32>, &str) = (Some(3), "Robot");
const ANONYMOUS: (Option<i32>, &str) = (None, "10.0.0.1");

fn sample_pages() -> Vec<Page> {
    vec![
        Page {
            id: 1,
            title: "Main Page".into(),
            namespace: 0,
            revisions: vec![
                revision(1, ALICE, 3, "Hello world"),
                revision(2, BOB, 1, "Hello world\nMore"),
                revision(3, ANONYMOUS, 1, "Hi world\nMore"),
            ],
        },
        Page {
            id: 2,
            title: "Sandbox".into(),
            namespace: 0,
            revisions: vec![
                revision(4, ALICE, 20, "abc"),
                revision(5, ROBOT, 2, &"a".repeat(1000)),
            ],
        },
    ]
}

fn load(pages: &[Page]) -> (DumpParser<Cursor<Vec<u8>>>, WikiStore) {
    let xml = dump_to_xml(pages);
    let mut parser = DumpParser::new(Cursor::new(xml.into_bytes())).unwrap();
    let parsed = parser.parse_all().unwrap();
    assert_eq!(parsed.len(), pages.len());
    (parser, WikiStore::from_pages(parsed))
}

fn names(entries: &[crate::aggregator::ScoreEntry]) -> Vec<&str> {
    entries.iter().map(|entry| entry.user_name.as_str()).collect()
}

#[test]
fn leaderboard_from_dump() {
    let (_, mut store) = load(&sample_pages());
    assert_eq!(store.num_revisions(), 5);
    assert!(store.add_group("Robot", GroupMembership::new(BOT_GROUP)));

    let config = Config::default();
    let aggregator = ScoreAggregator::new(&store, &config);

    let all = aggregator.report(0, 50, now()).unwrap();
    assert_eq!(names(&all), vec!["Alice", "Bob"]);
    // both pages were created by Alice, counted with their full length
    assert_eq!(all[0].unique_pages, 2);
    assert_eq!(all[0].abs_diff, 14);
    assert_eq!(all[0].score, score(2, 14));
    // appending a line changes nothing in place
    assert_eq!(all[1].abs_diff, 0);
    assert_eq!(all[1].score, 2.0);

    let week = aggregator.report(7, 50, now()).unwrap();
    assert_eq!(names(&week), vec!["Alice", "Bob"]);
    assert_eq!(week[0].unique_pages, 1);
    assert_eq!(week[0].abs_diff, 11);
}

#[test]
fn bot_flags_expire() {
    let (_, mut store) = load(&sample_pages());
    store.add_group(
        "Robot",
        GroupMembership::expiring(BOT_GROUP, now() - Duration::days(3)),
    );
    let config = Config::default();
    let aggregator = ScoreAggregator::new(&store, &config);

    // the bot flag was still active when the week started, but has expired by now
    let week = aggregator.report(7, 50, now()).unwrap();
    assert_eq!(names(&week), vec!["Alice", "Bob"]);

    let all = aggregator.report(0, 50, now()).unwrap();
    assert_eq!(names(&all), vec!["Robot", "Alice", "Bob"]);
    assert_eq!(all[0].abs_diff, 997);
}

#[test]
fn inline_metrics_from_dump() {
    let (_, store) = load(&sample_pages());
    let config = Config::default();
    let aggregator = ScoreAggregator::new(&store, &config);

    let metric = |user: &str, name: &str| aggregator.inline_metric(user, name).unwrap().to_string();
    assert_eq!(metric("Alice", "creations"), "2");
    assert_eq!(metric("Alice", "score"), "4");
    assert_eq!(metric("Robot", "absdiff"), "997");
    assert_eq!(metric("10.0.0.1", "score"), "Invalid username");
    assert_eq!(
        aggregator.inline_metric("Bob", "edits").unwrap(),
        MetricOutput::InvalidMetric
    );
}

#[test]
fn renamed_account_counts_all_edits() {
    let old_name = (Some(1), "OldName");
    let pages = vec![Page {
        id: 1,
        title: "Page".into(),
        namespace: 0,
        revisions: vec![
            revision(1, old_name, 4, "a"),
            revision(2, old_name, 3, "ab"),
            revision(3, old_name, 2, "abc"),
            revision(4, (Some(1), "NewName"), 1, "abcd"),
        ],
    }];
    let (_, store) = load(&pages);

    let exact = Config::default();
    let rough = Config::default().with_rough_edit_count(true);
    for config in [&exact, &rough] {
        let aggregator = ScoreAggregator::new(&store, config);
        let entries = aggregator.report(0, 10, now()).unwrap();
        assert_eq!(names(&entries), vec!["NewName"]);
        assert_eq!(entries[0].change_count, 4);
        assert_eq!(aggregator.inline_metric("OldName", "changes").unwrap().to_string(), "4");
        assert_eq!(aggregator.inline_metric("NewName", "changes").unwrap().to_string(), "4");
    }
}

#[test]
fn real_names_label_links() {
    let (_, mut store) = load(&sample_pages());
    assert!(store.set_real_name("Alice", "Alice Liddell"));
    assert!(!store.set_real_name("Nobody", "No One"));

    let config = Config::default().with_use_real_name(true);
    let aggregator = ScoreAggregator::new(&store, &config);
    let entries = aggregator.report(0, 50, now()).unwrap();
    let alice = entries.iter().find(|entry| entry.user_name == "Alice").unwrap();
    assert_eq!(alice.user_real_name.as_deref(), Some("Alice Liddell"));

    let html = ReportRenderer::new(&config)
        .with_article_path("/w/")
        .render_table(&entries, 50, None, &DisplayOptions::default());
    assert!(html.contains("<a href=\"/w/User:Alice\" title=\"User:Alice\">Alice Liddell</a>"));
    assert!(html.contains(">Bob</a>"));
}

#[test]
fn rendered_page_uses_site_namespaces() {
    let (parser, store) = load(&sample_pages());
    let site_info = parser.site_info();
    assert_eq!(site_info.user_namespace(), "User");
    assert_eq!(site_info.user_talk_namespace(), "User talk");

    let config = Config::default().with_ignore_bots(false);
    let aggregator = ScoreAggregator::new(&store, &config);
    let renderer = ReportRenderer::new(&config)
        .with_namespaces(site_info.user_namespace(), site_info.user_talk_namespace());
    let mut cache = ReportCache::new(&config);

    let page = renderer.render_page(&aggregator, &mut cache, now()).unwrap();
    assert!(page.contains("Last 7 days (Top 50)"));
    assert!(page.contains("href=\"/wiki/User:Robot\""));
    assert!(page.contains("href=\"/wiki/User_talk:Alice\""));
    assert!(!page.contains("10.0.0.1"));

    let include = renderer
        .render_include(&aggregator, &mut cache, Some("1/7"), now())
        .unwrap();
    assert!(include.contains("Last 7 days (Top 1)"));
    assert!(include.contains("User:Robot"));
    assert!(!include.contains("User:Alice"));
    assert_eq!(cache.len(), 3);
}

proptest! {
    #[test]
    fn parsed_dump_matches_direct_store(lengths in prop::collection::vec(0usize..400, 1..20)) {
        let revisions = lengths
            .iter()
            .enumerate()
            .map(|(i, length)| {
                let user = (i % 3) as i32 + 1;
                let name = format!("Editor {user}");
                revision(i as i32 + 1, (Some(user), name.as_str()), 1, &"l\n".repeat(*length))
            })
            .collect();
        let pages = vec![Page {
            id: 1,
            title: "Page".into(),
            namespace: 0,
            revisions,
        }];

        let (_, store) = load(&pages);
        let mut wiki = TestWiki::new();
        for user in 1..=3 {
            wiki.user(user, &format!("Editor {user}"));
        }
        for (i, length) in lengths.iter().enumerate() {
            wiki.edit((i % 3) as i32 + 1, 1, now() - Duration::days(1), &"l\n".repeat(*length));
        }
        let direct = wiki.into_store();

        let config = Config::default();
        let from_dump = ScoreAggregator::new(&store, &config).report(0, 50, now()).unwrap();
        let expected = ScoreAggregator::new(&direct, &config).report(0, 50, now()).unwrap();
        prop_assert_eq!(from_dump, expected);
    }
}
