// SPDX-License-Identifier: MPL-2.0
//! # contribscores
//!
//! Ranked leaderboards of wiki editors, computed from MediaWiki revision histories.
//!
//! ## Overview
//!
//! `contribscores` scores every registered editor of a wiki by how many distinct pages they
//! edited and how much text they changed, and presents the highest-scoring editors as HTML
//! tables. Scores can be restricted to a trailing window of days or cover all time.
//!
//! The score of an editor is
//!
//! ```text
//! score = unique_pages * 2 + abs_diff / 100
//! ```
//!
//! where `abs_diff` is the line-level size of all their changes, measured against the parent
//! revision of each edit.
//!
//! **Key Features:**
//!
//! - **Dump Input**: Builds its revision store straight from MediaWiki XML exports (optionally zstd compressed).
//! - **Bounded Ranking**: Keeps only the best `limit` editors in memory while scanning all users.
//! - **Eligibility Rules**: Leaves out bots, blocked users, anonymous editors and configured user names.
//! - **Caching**: Computed reports are reused for a configurable number of minutes.
//!
//! ## Getting Started
//!
//! ### Basic Usage
//!
//! Load a dump, build the store and compute the last week's leaderboard:
//!
//! ```no_run
//! use chrono::Utc;
//! use contribscores::aggregator::ScoreAggregator;
//! use contribscores::config::Config;
//! use contribscores::dump_parser::DumpParser;
//! use contribscores::store::WikiStore;
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let xml_dump = File::open("dewiktionary-20240901-pages-meta-history.xml")?;
//!     let mut parser = DumpParser::new(BufReader::new(xml_dump))?;
//!     let store = WikiStore::from_pages(parser.parse_all()?);
//!
//!     let config = Config::default();
//!     let aggregator = ScoreAggregator::new(&store, &config);
//!     for entry in aggregator.report(7, 10, Utc::now())? {
//!         println!("{} {}", entry.user_name, entry.display_score());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Rendering
//!
//! [`render::ReportRenderer`] turns reports into HTML. Embedded leaderboards take parameters
//! of the form `limit/days/options`, e.g. `10/30/nosort,notools`:
//!
//! ```no_run
//! # use chrono::Utc;
//! # use contribscores::{aggregator::ScoreAggregator, cache::ReportCache, config::Config, render::ReportRenderer, store::WikiStore};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let store = WikiStore::new();
//! let config = Config::default();
//! let aggregator = ScoreAggregator::new(&store, &config);
//! let mut cache = ReportCache::new(&config);
//!
//! let html = ReportRenderer::new(&config).render_include(&aggregator, &mut cache, Some("10/30/notools"), Utc::now())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules and API
//!
//! ### `store` Module
//!
//! **Purpose**: The data model and the [`store::RevisionStore`] and [`store::UserDirectory`] traits
//! that the scoring code reads from. [`store::WikiStore`] is the in-memory implementation.
//!
//! ### `metrics` Module
//!
//! **Purpose**: Per-user metrics: unique pages, change count, created pages and absolute diff.
//!
//! ### `aggregator` Module
//!
//! **Purpose**: Filters users, computes their metrics and selects the top scores.
//! Also answers single-metric lookups for one user.
//!
//! ### `cache` and `render` Modules
//!
//! **Purpose**: Time-bounded reuse of reports and their HTML presentation.
//!
//! ## Features and Configuration
//!
//! All settings live in [`config::Config`]. The defaults ignore bots and blocked users, cache
//! reports for 30 minutes and show 7 day, 30 day and all-time reports on the full page.
//!
//! ### Logging and Error Handling
//!
//! - Uses the `tracing` crate for logging warnings and errors.
//! - The parser is designed to recover from errors when possible. Enable the `strict` feature to make the parser terminate upon encountering errors.
//!
//! ## Limitations
//!
//! - **Rough Edit Count**: With `rough_edit_count` enabled the number of changes is the user's
//!   running edit counter and ignores the window.
//! - **Diff Size**: The absolute diff pairs removed and added lines of a changed block one to one,
//!   so the surplus lines of an uneven block are not counted.
//!
//! ## Licensing
//!
//! This project is licensed under the Mozilla Public License 2.0.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod dump_parser;
pub mod eligibility;
#[cfg(test)]
mod integration_tests;
pub mod metrics;
pub mod render;
pub mod store;
#[cfg(test)]
mod test_support;
pub mod top_k;
pub mod utils;
