// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! Bulk collection of Reddit data to disk.
//!
//! Every job caches what it retrieves, so an interrupted job can be run
//! again and will pick up where it left off.

use crate::clock::{self, Clock, Frequency, NaiveDate};
use crate::count::Tallier;
use crate::filter::{self, Screened};
use crate::reddit::Query;
use crate::reddit::client::Reddit;
use crate::reddit::pushshift::Archive;
use crate::reddit::service::Service;
use crate::reddit::thing::{Comment, Kind, Submission, Thing};
use crate::store;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Records retrieved per group of users when no maximum is given.
pub const USER_RECORD_LIMIT: usize = 1_000_000;

const WEEKLY: Frequency = Frequency::minutes(7 * 24 * 60);

const PROGRESS_TEMPLATE: &str = "{msg:>12} [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

/// Submission fields kept when collecting a subreddit.
pub const SUBMISSION_FIELDS: [&str; 10] = [
    "author",
    "author_fullname",
    "num_comments",
    "created_utc",
    "id",
    "permalink",
    "selftext",
    "title",
    "subreddit",
    "subreddit_id",
];

const CSV_HEADER: &str =
    "date,n_unique_users_submission,n_posts_submission,n_unique_users_comment,n_posts_comment";

/// First day collected when a job has no start date.
pub fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 1).expect("2015-01-01 is a valid date")
}

fn progress_bar(len: usize, show: bool, message: &'static str) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .expect("Invalid progress bar template")
            .progress_chars("=> "),
    );
    bar.set_message(message);
    bar
}

/// Collects a subreddit's submissions and the comments on them.
///
/// Submissions are stored in one file per window of `query_freq`, under
/// `<output_dir>/<subreddit>/submissions/<start>_<stop>.json`. Comments
/// are stored in one file per thread, under
/// `<output_dir>/<subreddit>/comments/<id>.json`.
#[derive(Clone, Debug)]
pub struct SubredditJob {
    pub subreddit: String,
    pub output_dir: PathBuf,

    /// First day to collect. Defaults to 2015-01-01.
    pub start: Option<NaiveDate>,

    /// Last day to collect. Defaults to today.
    pub end: Option<NaiveDate>,

    /// Length of each submission window. Must be at least a day.
    pub query_freq: Frequency,

    /// Only collect comments on submissions with at least this many.
    pub min_comments: i64,

    /// Number of submissions whose comments are searched for at once.
    pub chunksize: usize,

    /// Fraction of each window's submissions whose comments are collected.
    pub sample_percent: f64,

    /// Seed for sampling submissions.
    pub random_state: u64,

    /// Write files for threads without comments, so they are skipped
    /// next time.
    pub cache_empty: bool,

    /// Only collect comments posted within this many days of the start of
    /// a submission's window.
    pub comment_max_range: Option<i64>,

    pub progress: bool,
}

/// What a [`SubredditJob`] found.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SubredditSummary {
    pub submissions: usize,
    pub comments: usize,
    pub threads: usize,
    pub empty_threads: usize,
}

impl SubredditJob {
    pub fn new(subreddit: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            subreddit: subreddit.into(),
            output_dir: output_dir.into(),
            start: None,
            end: None,
            query_freq: WEEKLY,
            min_comments: 0,
            chunksize: 50,
            sample_percent: 1.0,
            random_state: 42,
            cache_empty: false,
            comment_max_range: None,
            progress: false,
        }
    }

    pub fn submission_path(&self, start: NaiveDate, stop: NaiveDate) -> PathBuf {
        self.output_dir
            .join(&self.subreddit)
            .join("submissions")
            .join(format!("{start}_{stop}.json"))
    }

    pub fn thread_path(&self, id: &str) -> PathBuf {
        self.output_dir
            .join(&self.subreddit)
            .join("comments")
            .join(format!("{id}.json"))
    }

    pub async fn run<A: Archive, S: Service, C: Clock>(
        &self,
        reddit: &Reddit<A, S, C>,
    ) -> Result<SubredditSummary, Error> {
        let start = self.start.unwrap_or_else(default_start);
        let end = self.end.unwrap_or_else(|| reddit.today());
        let dates = clock::date_range(start, end, &self.query_freq)?;
        log::info!("Collecting r/{} from {start} to {end}", self.subreddit);

        let mut summary = SubredditSummary::default();
        let windows = self.collect_submissions(reddit, &dates, &mut summary).await?;
        log::info!("Found {} submissions", summary.submissions);

        let bar = progress_bar(windows.len(), self.progress, "Comments");
        for (path, window_start) in windows {
            self.collect_comments(reddit, &path, window_start, &mut summary)
                .await?;
            bar.inc(1);
        }
        bar.finish_and_clear();
        log::info!(
            "Collected {} comments from {} threads",
            summary.comments,
            summary.threads
        );
        Ok(summary)
    }

    /// Retrieves submissions for every window that is not cached yet.
    ///
    /// Windows that cannot be retrieved are not cached.
    async fn collect_submissions<A: Archive, S: Service, C: Clock>(
        &self,
        reddit: &Reddit<A, S, C>,
        dates: &[NaiveDate],
        summary: &mut SubredditSummary,
    ) -> Result<Vec<(PathBuf, NaiveDate)>, Error> {
        let bar = progress_bar(dates.len().saturating_sub(1), self.progress, "Submissions");
        let mut windows = vec![];

        for (&start, &stop) in dates.iter().tuple_windows() {
            bar.inc(1);
            let path = self.submission_path(start, stop);
            if path.exists() {
                summary.submissions += store::count_records(&path)?;
                windows.push((path, start));
                continue;
            }

            let query = Query::new()
                .start(start)
                .end(stop)
                .fields(&SUBMISSION_FIELDS)
                .unlimited();
            match reddit.subreddit_submissions(&self.subreddit, &query).await {
                Ok(submissions) => {
                    summary.submissions += submissions.len();
                    store::write_records(&path, &submissions)?;
                    windows.push((path, start));
                }
                Err(err) => log::warn!("Could not retrieve submissions from {start} to {stop}: {err}"),
            }
        }

        bar.finish_and_clear();
        Ok(windows)
    }

    async fn collect_comments<A: Archive, S: Service, C: Clock>(
        &self,
        reddit: &Reddit<A, S, C>,
        path: &Path,
        window_start: NaiveDate,
        summary: &mut SubredditSummary,
    ) -> Result<(), Error> {
        let submissions: Vec<Submission> = store::read_records(path)?;
        let ids: Vec<String> = self
            .sample(submissions)
            .into_iter()
            .filter(|s| s.num_comments.unwrap_or_default() >= self.min_comments)
            .filter_map(|s| s.id)
            .filter(|id| !self.thread_path(id).exists())
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let end = self
            .comment_max_range
            .map(|days| clock::add_days(window_start, days))
            .transpose()?;
        let query = Query::new().start(window_start).end(end).unlimited();

        for chunk in ids.chunks(self.chunksize.max(1)) {
            let comments = match reddit.submission_comments(chunk, &query).await {
                Ok(comments) => comments,
                Err(err) => {
                    log::warn!("Could not retrieve comments on {} submissions: {err}", chunk.len());
                    continue;
                }
            };

            for id in chunk {
                let thread: Vec<&Comment> = comments.iter().filter(|c| c.belongs_to(id)).collect();
                if thread.is_empty() {
                    summary.empty_threads += 1;
                    if !self.cache_empty {
                        continue;
                    }
                } else {
                    summary.threads += 1;
                    summary.comments += thread.len();
                }
                store::write_records(&self.thread_path(id), &thread)?;
            }
        }
        Ok(())
    }

    /// Keeps a seeded random sample of `sample_percent` of the submissions,
    /// in their original order.
    fn sample(&self, submissions: Vec<Submission>) -> Vec<Submission> {
        if self.sample_percent >= 1.0 {
            return submissions;
        }
        let len = submissions.len();
        let amount = ((len as f64 * self.sample_percent).round() as usize).min(len);
        let mut rng = StdRng::seed_from_u64(self.random_state);
        let picked: HashSet<usize> = index::sample(&mut rng, len, amount).into_iter().collect();
        submissions
            .into_iter()
            .enumerate()
            .filter(|(i, _)| picked.contains(i))
            .map(|(_, submission)| submission)
            .collect()
    }
}

/// Reads usernames from `.txt` and `.json` files.
///
/// Users are returned from least to most frequent. Deleted accounts and
/// AutoModerator are left out, and missing files are skipped.
pub fn enumerate_users(inputs: &[PathBuf]) -> Result<Vec<String>, Error> {
    let mut tallier = Tallier::new();
    for input in inputs {
        if !input.exists() {
            log::warn!("No such file: {}", input.display());
            continue;
        }
        for user in store::read_usernames(input)? {
            tallier.add(user);
        }
    }
    tallier.retain(filter::is_collectable_author);
    Ok(tallier.least_common().into_iter().map(|(user, _)| user).collect())
}

/// Collects the comment and submission histories of a list of users.
///
/// Histories are stored under `<output_dir>/<user>.comments.json` and
/// `<output_dir>/<user>.submissions.json`.
///
/// Users are searched for in groups of `users_per_chunk`. Since a group
/// shares one limit, a maximum is only exact for groups of one user.
#[derive(Clone, Debug)]
pub struct UserJob {
    pub output_dir: PathBuf,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub comments: bool,
    pub submissions: bool,

    /// Keep at most this many of each user's newest comments.
    pub max_comments: Option<usize>,

    /// Keep at most this many of each user's newest submissions.
    pub max_submissions: Option<usize>,

    /// Skip histories that are already on disk.
    pub ignore_existing: bool,

    pub users_per_chunk: usize,
    pub progress: bool,
}

/// What a [`UserJob`] found.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UserSummary {
    pub users: usize,
    pub comment_histories: usize,
    pub submission_histories: usize,
}

#[derive(Debug)]
struct Pending<'a> {
    user: &'a str,
    comments: bool,
    submissions: bool,
}

impl UserJob {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            start: None,
            end: None,
            comments: false,
            submissions: false,
            max_comments: None,
            max_submissions: None,
            ignore_existing: false,
            users_per_chunk: 10,
            progress: false,
        }
    }

    pub fn history_path(&self, user: &str, kind: Kind) -> PathBuf {
        let suffix = match kind {
            Kind::Comment => "comments",
            Kind::Submission => "submissions",
        };
        self.output_dir.join(format!("{user}.{suffix}.json"))
    }

    fn wanted(&self, user: &str, kind: Kind, requested: bool) -> bool {
        requested && !(self.ignore_existing && self.history_path(user, kind).exists())
    }

    pub async fn run<A: Archive, S: Service, C: Clock>(
        &self,
        reddit: &Reddit<A, S, C>,
        users: &[String],
    ) -> Result<UserSummary, Error> {
        if !self.comments && !self.submissions {
            return Err(Error::NothingRequested);
        }

        let pending: Vec<Pending> = users
            .iter()
            .map(|user| Pending {
                user,
                comments: self.wanted(user, Kind::Comment, self.comments),
                submissions: self.wanted(user, Kind::Submission, self.submissions),
            })
            .filter(|p| p.comments || p.submissions)
            .collect();

        // Users needing the same searches are grouped together.
        let chunks: Vec<Vec<&Pending>> = [(true, true), (false, true), (true, false)]
            .into_iter()
            .flat_map(|(comments, submissions)| {
                let group: Vec<&Pending> = pending
                    .iter()
                    .filter(|p| p.comments == comments && p.submissions == submissions)
                    .collect();
                group
                    .chunks(self.users_per_chunk.max(1))
                    .map(|chunk| chunk.to_vec())
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut summary = UserSummary {
            users: pending.len(),
            ..Default::default()
        };
        let start = self.start.unwrap_or_else(default_start);
        let bar = progress_bar(chunks.len(), self.progress, "Users");

        for chunk in chunks {
            let submitters: Vec<&str> = chunk.iter().filter(|p| p.submissions).map(|p| p.user).collect();
            if !submitters.is_empty() {
                let query = self.query(start, &submitters, self.max_submissions);
                match reddit.author_submissions(&submitters, &query).await {
                    Ok(submissions) => {
                        summary.submission_histories += self.save(submissions, self.max_submissions)?
                    }
                    Err(err) => log::warn!("Could not retrieve submissions by {}: {err}", submitters.join(", ")),
                }
            }

            let commenters: Vec<&str> = chunk.iter().filter(|p| p.comments).map(|p| p.user).collect();
            if !commenters.is_empty() {
                let query = self.query(start, &commenters, self.max_comments);
                match reddit.author_comments(&commenters, &query).await {
                    Ok(comments) => summary.comment_histories += self.save(comments, self.max_comments)?,
                    Err(err) => log::warn!("Could not retrieve comments by {}: {err}", commenters.join(", ")),
                }
            }
            bar.inc(1);
        }

        bar.finish_and_clear();
        Ok(summary)
    }

    fn query(&self, start: NaiveDate, users: &[&str], max: Option<usize>) -> Query {
        let limit = max.map_or(USER_RECORD_LIMIT, |max| max * users.len());
        Query::new().start(start).end(self.end).limit(limit)
    }

    /// Writes each author's newest `max` things to their history file.
    ///
    /// Returns the number of files written.
    fn save<T: Thing>(&self, things: Vec<T>, max: Option<usize>) -> Result<usize, Error> {
        let by_author: HashMap<String, Vec<T>> = things
            .into_iter()
            .filter_map(|thing| Some((thing.author()?.to_string(), thing)))
            .into_group_map();

        let written = by_author.len();
        for (author, mut things) in by_author {
            things.sort_by_key(|thing| Reverse(thing.created_utc()));
            if let Some(max) = max {
                things.truncate(max);
            }
            things.reverse();
            store::write_records(&self.history_path(&author, T::KIND), &things)?;
        }
        Ok(written)
    }
}

/// Activity of posters over some period.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Activity {
    pub unique_authors: usize,
    pub posts: usize,
}

impl<'a, T: Thing + 'a> FromIterator<&'a T> for Activity {
    fn from_iter<I: IntoIterator<Item = &'a T>>(iter: I) -> Self {
        let mut authors = HashSet::new();
        let mut posts = 0;
        for thing in iter {
            posts += 1;
            if let Some(author) = thing.author() {
                authors.insert(author);
            }
        }
        Self {
            unique_authors: authors.len(),
            posts,
        }
    }
}

/// Submission and comment activity on one day.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DailyActivity {
    pub submissions: Activity,
    pub comments: Activity,
}

/// Summary statistics of a collected subreddit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubredditStats {
    pub submissions: Activity,
    pub comments: Activity,

    /// Activity on every day from the first post to the last, including
    /// days without any posts.
    pub daily: BTreeMap<NaiveDate, DailyActivity>,
}

/// Summarizes a subreddit collected by a [`SubredditJob`].
///
/// Posts by deleted accounts and AutoModerator are ignored, as are posts
/// without text.
#[derive(Clone, Debug)]
pub struct StatsJob {
    pub subreddit: String,
    pub data_dir: PathBuf,

    /// Where to write `<subreddit>.counts.csv` with daily counts, if
    /// anywhere.
    pub output_dir: Option<PathBuf>,
}

impl StatsJob {
    pub fn new(subreddit: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            subreddit: subreddit.into(),
            data_dir: data_dir.into(),
            output_dir: None,
        }
    }

    pub fn counts_path(&self) -> Option<PathBuf> {
        self.output_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.counts.csv", self.subreddit)))
    }

    pub fn run(&self) -> Result<SubredditStats, Error> {
        let root = self.data_dir.join(&self.subreddit);
        let submissions: Vec<Submission> = screened(read_directory(&root.join("submissions"))?);
        let comments: Vec<Comment> = screened(read_directory(&root.join("comments"))?);
        if submissions.is_empty() && comments.is_empty() {
            log::warn!("No posts found for r/{}", self.subreddit);
            return Ok(SubredditStats::default());
        }

        let daily_submissions = daily_activity(&submissions);
        let daily_comments = daily_activity(&comments);
        let days = daily_submissions.keys().chain(daily_comments.keys());
        let mut daily = BTreeMap::new();
        if let Some((&first, &last)) = days.minmax().into_option() {
            for day in first.iter_days().take_while(|day| *day <= last) {
                let activity = DailyActivity {
                    submissions: daily_submissions.get(&day).copied().unwrap_or_default(),
                    comments: daily_comments.get(&day).copied().unwrap_or_default(),
                };
                daily.insert(day, activity);
            }
        }

        let stats = SubredditStats {
            submissions: submissions.iter().collect(),
            comments: comments.iter().collect(),
            daily,
        };
        for (kind, activity) in [(Kind::Submission, stats.submissions), (Kind::Comment, stats.comments)] {
            log::info!(
                "{kind} statistics: {} unique authors, {} total posts",
                activity.unique_authors,
                activity.posts
            );
        }

        if let Some(path) = self.counts_path() {
            write_daily_counts(&path, &stats.daily)?;
        }
        Ok(stats)
    }
}

fn screened<T: Thing>(things: Vec<T>) -> Vec<T> {
    things
        .into_iter()
        .filter(|thing| thing.has_real_author() && thing.is_meaningful())
        .collect()
}

fn daily_activity<T: Thing>(things: &[T]) -> HashMap<NaiveDate, Activity> {
    things
        .iter()
        .filter_map(|thing| {
            let posted = clock::convert_utc_epoch_to_datetime(thing.created_utc()?)?;
            Some((posted.date_naive(), thing))
        })
        .into_group_map()
        .into_iter()
        .map(|(day, things)| (day, things.into_iter().collect()))
        .collect()
}

/// Reads every record file in `dir`. A missing directory has no records.
fn read_directory<T: Thing>(dir: &Path) -> Result<Vec<T>, Error> {
    if !dir.is_dir() {
        log::warn!("No {} files in {}", T::KIND, dir.display());
        return Ok(vec![]);
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| Error::Io(dir.to_path_buf(), e))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut things = vec![];
    for path in paths {
        things.extend(store::read_records::<T>(&path)?);
    }
    Ok(things)
}

/// Writes daily activity to `path` as CSV.
pub fn write_daily_counts(path: &Path, daily: &BTreeMap<NaiveDate, DailyActivity>) -> Result<(), Error> {
    let rows = daily.iter().map(|(day, activity)| {
        format!(
            "{day},{},{},{},{}",
            activity.submissions.unique_authors,
            activity.submissions.posts,
            activity.comments.unique_authors,
            activity.comments.posts
        )
    });
    let csv = std::iter::once(CSV_HEADER.to_string()).chain(rows).join("\n") + "\n";

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::Io(parent.to_path_buf(), e))?;
    }
    fs::write(path, csv).map_err(|e| Error::Io(path.to_path_buf(), e))
}

/// A collection error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Store(#[from] store::Error),

    #[error("Date error: {0}")]
    Clock(#[from] clock::Error),

    #[error("Could not access {path}: {err}", path = .0.display(), err = .1)]
    Io(PathBuf, io::Error),

    #[error("Nothing to collect; ask for comments, submissions or both")]
    NothingRequested,
}
