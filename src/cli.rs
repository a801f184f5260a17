// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! Drives the command-line program.

use crate::clock::{Frequency, NaiveDate};
use crate::collect::{self, StatsJob, SubredditJob, UserJob};
use crate::conf::{self, CONFIG_ENV_VAR, Credentials};
use crate::count::Tally;
use crate::reddit::client::{self, REQUEST_LIMIT};
use crate::reddit::thing::Kind;
use crate::reddit::{Options, Query, Reddit};
use crate::retry::RetryPolicy;
use crate::store;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Program configuration.
#[derive(Debug, Parser)]
#[command(version)]
#[command(about = "Retrieves Reddit comments and submissions from Pushshift and the Reddit API", long_about = None)]
pub struct Config {
    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,

    /// Path to the API credential file
    #[arg(long, global = true, env = CONFIG_ENV_VAR, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    api: ApiArgs,

    #[command(subcommand)]
    command: Command,
}

impl Config {
    pub fn verbosity(&self) -> Verbosity<WarnLevel> {
        self.verbosity
    }
}

#[derive(Args, Debug)]
struct ApiArgs {
    /// Retrieve live data from the Reddit API (requires credentials)
    #[arg(long, global = true, default_value_t = false)]
    use_official: bool,

    /// Ask the Reddit API for comments Pushshift does not have
    #[arg(long, global = true, default_value_t = false)]
    allow_fallback: bool,

    /// Maximum attempts for each request
    #[arg(long, global = true, default_value_t = RetryPolicy::default().max_retries)]
    max_retries: u32,

    /// Seconds to wait after the first failed request
    #[arg(long, global = true, default_value_t = RetryPolicy::default().backoff)]
    backoff: u64,
}

#[derive(Args, Debug)]
struct DateArgs {
    /// First day to retrieve (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    start_date: Option<NaiveDate>,

    /// Day at which to stop retrieving (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    end_date: Option<NaiveDate>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Collect a subreddit's submissions and comments to disk
    Subreddit(SubredditArgs),

    /// Collect the comment and submission histories of users to disk
    Users(UserArgs),

    /// Search comments or submissions for text
    Search {
        /// Kind of thing to search
        #[arg(value_enum)]
        kind: Kind,

        /// Text to search for
        text: String,

        /// Only search this subreddit
        #[arg(long)]
        subreddit: Option<String>,

        #[command(flatten)]
        dates: DateArgs,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = REQUEST_LIMIT)]
        limit: usize,

        /// Write results to FILE instead of printing them
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Rank subreddits by how many submissions they receive
    Active {
        #[command(flatten)]
        dates: DateArgs,

        /// Length of each sampled window, e.g., 5m or 1h
        #[arg(long, value_name = "FREQ")]
        chunksize: Option<Frequency>,

        /// Only show the top 'n' subreddits
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Rank a subreddit's users by how much they post
    History {
        /// Name of the subreddit
        subreddit: String,

        /// Kind of posts to count
        #[arg(long, value_enum, default_value_t = Kind::Comment)]
        kind: Kind,

        #[command(flatten)]
        dates: DateArgs,

        /// Split the search into windows of this length, e.g., 1d
        #[arg(long, value_name = "FREQ")]
        chunksize: Option<Frequency>,

        /// Only show the top 'n' users
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show information about a subreddit (requires --use-official)
    Metadata {
        /// Name of the subreddit
        subreddit: String,
    },

    /// Summarize a subreddit collected with `subreddit`
    Stats {
        /// Name of the subreddit
        subreddit: String,

        /// Where collected subreddits are stored
        #[arg(long, default_value = "data/subreddits", value_name = "DIR")]
        data_dir: PathBuf,

        /// Write daily counts to DIR/<subreddit>.counts.csv
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SubredditArgs {
    /// Name of the subreddit
    subreddit: String,

    /// Where to store collected data
    #[arg(long, default_value = "data/subreddits", value_name = "DIR")]
    output_dir: PathBuf,

    #[command(flatten)]
    dates: DateArgs,

    /// How to break up the submission search, e.g., 7d
    #[arg(long, default_value = "7d", value_name = "FREQ")]
    query_freq: Frequency,

    /// Only collect comments on submissions with at least this many
    #[arg(long, default_value_t = 0)]
    min_comments: i64,

    /// Number of submissions whose comments are searched at once
    #[arg(long, default_value_t = 50)]
    chunksize: usize,

    /// Fraction of submissions whose comments are collected, in (0, 1]
    #[arg(long, default_value_t = 1.0, value_parser = parse_fraction)]
    sample_percent: f64,

    /// Seed for sampling submissions
    #[arg(long, default_value_t = 42)]
    random_state: u64,

    /// Store empty comment files so threads are skipped next time
    #[arg(long, default_value_t = false)]
    cache_empty: bool,

    /// Only collect comments posted within this many days
    #[arg(long, value_name = "DAYS")]
    comment_max_range: Option<i64>,
}

#[derive(Args, Debug)]
struct UserArgs {
    /// Files listing users (.txt) or records with authors (.json)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Where to store collected data
    #[arg(long, default_value = "data/users", value_name = "DIR")]
    output_dir: PathBuf,

    /// Collect users' comments
    #[arg(long, default_value_t = false)]
    comments: bool,

    /// Collect users' submissions
    #[arg(long, default_value_t = false)]
    submissions: bool,

    #[command(flatten)]
    dates: DateArgs,

    /// Keep at most this many of each user's newest comments
    #[arg(long)]
    max_comments: Option<usize>,

    /// Keep at most this many of each user's newest submissions
    #[arg(long)]
    max_submissions: Option<usize>,

    /// Skip users whose histories are already on disk
    #[arg(long, default_value_t = false)]
    ignore_existing: bool,

    /// Number of users searched at once
    #[arg(long, default_value_t = 10)]
    users_per_chunk: usize,
}

fn parse_fraction(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(fraction) if fraction > 0.0 && fraction <= 1.0 => Ok(fraction),
        Ok(_) => Err(format!("{s} is not in (0, 1]")),
        Err(err) => Err(err.to_string()),
    }
}

/// Runs the command-line program.
pub async fn run(config: Config) -> Result<(), Error> {
    let Config {
        config: path,
        api,
        command,
        ..
    } = config;

    // Only commands that talk to Reddit connect to it.
    let (path, api) = (path.as_deref(), &api);
    let client = move || connect(path, api);

    match command {
        Command::Subreddit(args) => run_subreddit(&client().await?, args).await,
        Command::Users(args) => run_users(&client().await?, args).await,
        Command::Search {
            kind,
            text,
            subreddit,
            dates,
            limit,
            output,
        } => {
            let reddit = client().await?;
            let query = Query::new().start(dates.start_date).end(dates.end_date).limit(limit);
            let subreddit = subreddit.as_deref();
            match kind {
                Kind::Comment => {
                    let comments = reddit.search_comments(&text, subreddit, &query).await?;
                    emit(&comments, output.as_deref())
                }
                Kind::Submission => {
                    let submissions = reddit.search_submissions(&text, subreddit, &query).await?;
                    emit(&submissions, output.as_deref())
                }
            }
        }
        Command::Active {
            dates,
            chunksize,
            limit,
        } => {
            let reddit = client().await?;
            let query = Query::new()
                .start(dates.start_date)
                .end(dates.end_date)
                .chunksize(chunksize);
            print_tallies(&reddit.active_subreddits(&query).await, limit);
            Ok(())
        }
        Command::History {
            subreddit,
            kind,
            dates,
            chunksize,
            limit,
        } => {
            let reddit = client().await?;
            let query = Query::new()
                .start(dates.start_date)
                .end(dates.end_date)
                .chunksize(chunksize);
            let tallies = reddit.subreddit_user_history(&subreddit, kind, &query).await;
            print_tallies(&tallies, limit);
            Ok(())
        }
        Command::Metadata { subreddit } => {
            let metadata = client().await?.subreddit_metadata(&subreddit).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
            Ok(())
        }
        Command::Stats {
            subreddit,
            data_dir,
            output_dir,
        } => run_stats(subreddit, data_dir, output_dir),
    }
}

async fn connect(path: Option<&Path>, api: &ApiArgs) -> Result<Reddit, Error> {
    let credentials = Credentials::load_or_default(path)?.reddit;
    let options = Options::default()
        .use_official(api.use_official)
        .allow_fallback(api.allow_fallback)
        .max_retries(api.max_retries)
        .backoff(api.backoff)
        .credentials(credentials);
    let reddit = Reddit::new(options).await;
    log::debug!("Created client {reddit}");
    Ok(reddit)
}

async fn run_subreddit(reddit: &Reddit, args: SubredditArgs) -> Result<(), Error> {
    let mut job = SubredditJob::new(args.subreddit, args.output_dir);
    job.start = args.dates.start_date;
    job.end = args.dates.end_date;
    job.query_freq = args.query_freq;
    job.min_comments = args.min_comments;
    job.chunksize = args.chunksize;
    job.sample_percent = args.sample_percent;
    job.random_state = args.random_state;
    job.cache_empty = args.cache_empty;
    job.comment_max_range = args.comment_max_range;
    job.progress = true;

    let summary = job.run(reddit).await?;
    println!(
        "Collected {} submissions and {} comments from {} threads",
        summary.submissions, summary.comments, summary.threads
    );
    Ok(())
}

async fn run_users(reddit: &Reddit, args: UserArgs) -> Result<(), Error> {
    let users = collect::enumerate_users(&args.inputs)?;
    log::info!("Found {} users", users.len());

    let mut job = UserJob::new(args.output_dir);
    job.start = args.dates.start_date;
    job.end = args.dates.end_date;
    job.comments = args.comments;
    job.submissions = args.submissions;
    job.max_comments = args.max_comments;
    job.max_submissions = args.max_submissions;
    job.ignore_existing = args.ignore_existing;
    job.users_per_chunk = args.users_per_chunk;
    job.progress = true;

    let summary = job.run(reddit, &users).await?;
    println!(
        "Collected {} comment and {} submission histories for {} users",
        summary.comment_histories, summary.submission_histories, summary.users
    );
    Ok(())
}

fn run_stats(subreddit: String, data_dir: PathBuf, output_dir: Option<PathBuf>) -> Result<(), Error> {
    let mut job = StatsJob::new(subreddit, data_dir);
    job.output_dir = output_dir;
    let stats = job.run()?;

    for (name, activity) in [("Submissions", stats.submissions), ("Comments", stats.comments)] {
        println!(
            "{name}: {} unique authors, {} total posts",
            activity.unique_authors, activity.posts
        );
    }
    if let Some(path) = job.counts_path().filter(|path| path.exists()) {
        println!("Daily counts written to {}", path.display());
    }
    Ok(())
}

fn emit<T: Serialize>(things: &[T], output: Option<&Path>) -> Result<(), Error> {
    match output {
        Some(path) => {
            store::write_records(path, things)?;
            log::info!("Wrote {} records to {}", things.len(), path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(things)?),
    }
    Ok(())
}

fn print_tallies(tallies: &[Tally], limit: Option<usize>) {
    let tallies = &tallies[..limit.unwrap_or(tallies.len()).min(tallies.len())];
    let width = tallies.iter().map(|(name, _)| name.len()).max().unwrap_or_default();
    for (name, count) in tallies {
        println!("{name:<width$}  {count}");
    }
}

/// A command-line error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(#[from] conf::Error),

    #[error("{0}")]
    Client(#[from] client::Error),

    #[error("{0}")]
    Collect(#[from] collect::Error),

    #[error("{0}")]
    Store(#[from] store::Error),

    #[error("Could not format output: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("retriever").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn it_parses_subreddit_jobs_with_defaults() {
        let config = parse(&["subreddit", "modeltrains"]);
        let Command::Subreddit(args) = config.command else {
            panic!("expected a subreddit command");
        };
        assert_eq!(args.subreddit, "modeltrains");
        assert_eq!(args.output_dir, PathBuf::from("data/subreddits"));
        assert_eq!(args.query_freq.days(), 7);
        assert_eq!(args.chunksize, 50);
        assert_eq!(args.sample_percent, 1.0);
        assert_eq!(args.dates.start_date, None);
    }

    #[test]
    fn it_parses_dates_and_frequencies() {
        let config = parse(&[
            "active",
            "--start-date",
            "2019-01-01",
            "--end-date",
            "2019-01-02",
            "--chunksize",
            "1h",
        ]);
        let Command::Active { dates, chunksize, .. } = config.command else {
            panic!("expected an active command");
        };
        assert_eq!(dates.start_date, NaiveDate::from_ymd_opt(2019, 1, 1));
        assert_eq!(dates.end_date, NaiveDate::from_ymd_opt(2019, 1, 2));
        assert_eq!(chunksize.map(|c| c.seconds()), Some(3600));
    }

    #[test]
    fn it_rejects_invalid_frequencies() {
        let result = Config::try_parse_from(["retriever", "active", "--chunksize", "5s"]);
        assert!(result.is_err());
    }

    #[test]
    fn it_rejects_invalid_sample_fractions() {
        let result = Config::try_parse_from(["retriever", "subreddit", "modeltrains", "--sample-percent", "1.5"]);
        assert!(result.is_err());
    }

    #[test]
    fn it_requires_user_inputs() {
        let result = Config::try_parse_from(["retriever", "users", "--comments"]);
        assert!(result.is_err());
    }

    #[test]
    fn it_accepts_global_api_flags_after_the_subcommand() {
        let config = parse(&["search", "comment", "graphite", "--use-official", "--backoff", "0"]);
        assert!(config.api.use_official);
        assert!(!config.api.allow_fallback);
        assert_eq!(config.api.backoff, 0);
        assert_eq!(config.api.max_retries, 3);
    }

    #[test]
    fn it_reads_the_config_path_from_the_environment() {
        temp_env::with_var(CONFIG_ENV_VAR, Some("/etc/retriever.json"), || {
            let config = parse(&["metadata", "modeltrains"]);
            assert_eq!(config.config, Some(PathBuf::from("/etc/retriever.json")));
        });
    }
}
