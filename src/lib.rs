// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! retriever retrieves Reddit comments and submissions. Historical searches
//! go through the [Pushshift] archive, and the official Reddit API can be
//! used either to refresh results with live data or to recover comments the
//! archive is missing.
//!
//! # Library
//!
//! ```no_run
//! use retriever::reddit::{Options, Query, Reddit};
//! use retriever::clock::NaiveDate;
//!
//! # async fn example() -> Result<(), retriever::reddit::client::Error> {
//! let reddit = Reddit::new(Options::default()).await;
//! let query = Query::new()
//!     .start(NaiveDate::from_ymd_opt(2019, 1, 1))
//!     .end(NaiveDate::from_ymd_opt(2019, 1, 8))
//!     .limit(500);
//! let submissions = reddit.subreddit_submissions("modeltrains", &query).await?;
//! println!("Found {} submissions", submissions.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Command line
//!
//! Collect a subreddit's submissions and comments into `data/subreddits`:
//!
//! ```bash
//! retriever subreddit modeltrains --start-date 2019-01-01 --end-date 2019-03-01
//! ```
//!
//! Collect the comment histories of the users found there:
//!
//! ```bash
//! retriever users --comments data/subreddits/modeltrains/comments/*.json
//! ```
//!
//! Summarize what was collected:
//!
//! ```bash
//! retriever stats modeltrains --output-dir plots
//! ```
//!
//! Get usage and help for the tool:
//!
//! ```bash
//! retriever --help
//! ```
//!
//! # Reddit API Setup
//!
//! Live data, subreddit metadata, and fallback searches need credentials for
//! a Reddit "script" application. Register one in your [app preferences]
//! and store its credentials in `retriever/config.json`, or in the file
//! named by `$RETRIEVER_CONFIG`:
//!
//! ```json
//! {
//!     "reddit": {
//!         "client_id": "CLIENT_ID",
//!         "client_secret": "CLIENT_SECRET",
//!         "user_agent": "retriever by u/USERNAME",
//!         "username": "USERNAME",
//!         "password": "PASSWORD"
//!     }
//! }
//! ```
//!
//! # License
//!
//! retriever is licensed under the terms of the [Apache License 2.0]. Please
//! see the LICENSE file accompanying this source code or visit the previous
//! link for more information on licensing.
//!
//! [Apache License 2.0]: https://www.apache.org/licenses/LICENSE-2.0
//! [Pushshift]: https://pushshift.io
//! [app preferences]: https://www.reddit.com/prefs/apps

pub mod cli;
pub mod clock;
pub mod collect;
pub mod conf;
pub mod count;
pub mod filter;
pub mod http;
pub mod reddit;
pub mod retry;
pub mod store;

#[cfg(test)]
mod test_utils;
