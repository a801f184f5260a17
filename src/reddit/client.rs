// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! Clients for retrieving comments and submissions from Reddit.
//!
//! [`Reddit`] searches the Pushshift archive and optionally consults the
//! official Reddit API, either for every query ("official mode") or only
//! when the archive comes up empty.

use crate::clock::{self, Clock, DateTime, Frequency, NaiveDate, SystemClock, Utc};
use crate::conf::RedditCredentials;
use crate::count::{Tally, Tallier};
use crate::filter;
use crate::http::HTTPError;
use crate::reddit::pushshift::{Archive, MAX_RESULTS_PER_REQUEST, PushshiftService, SearchParams};
use crate::reddit::service::{RedditService, Service};
use crate::reddit::thing::{self, Comment, Kind, Submission, SubredditMetadata, Thing};
use crate::retry::RetryPolicy;
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Default maximum number of things returned by a query.
pub const REQUEST_LIMIT: usize = 100_000;

/// Default window for tallying active subreddits.
pub const ACTIVE_SUBREDDITS_CHUNKSIZE: Frequency = Frequency::minutes(5);

/// Maximum number of fullnames the official API looks up at once.
const INFO_BATCH_SIZE: usize = 100;

const NO_QUERY: &[(&str, String)] = &[];

/// Fields that are always requested when a query filters fields, since
/// they are needed to page through results and refresh them.
const REQUIRED_FIELDS: [&str; 2] = ["id", "created_utc"];

/// How a [`Reddit`] client is set up.
#[derive(Clone, Debug)]
#[must_use]
pub struct Options {
    /// Retrieve live data from the official API instead of the archive's
    /// snapshot. Requires credentials.
    pub use_official: bool,

    /// Ask the official API for comments the archive does not have.
    pub allow_fallback: bool,

    /// Maximum attempts for each request.
    pub max_retries: u32,

    /// Seconds to wait after the first failed attempt.
    pub backoff: u64,

    /// Credentials for the official API.
    pub credentials: Option<RedditCredentials>,
}

impl Default for Options {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            use_official: false,
            allow_fallback: true,
            max_retries: retry.max_retries,
            backoff: retry.backoff,
            credentials: None,
        }
    }
}

impl Options {
    pub fn use_official(mut self, use_official: bool) -> Self {
        self.use_official = use_official;
        self
    }

    pub fn allow_fallback(mut self, allow_fallback: bool) -> Self {
        self.allow_fallback = allow_fallback;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, backoff: u64) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn credentials(mut self, credentials: Option<RedditCredentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Bounds and shape of a search.
///
/// Dates are interpreted as midnight UTC. Without a start date, searches
/// begin at the launch of Reddit; without an end date, they run through
/// today.
#[derive(Clone, Debug, PartialEq)]
#[must_use]
pub struct Query {
    /// First day to search.
    pub start: Option<NaiveDate>,

    /// Day at which to stop searching (exclusive).
    pub end: Option<NaiveDate>,

    /// Maximum number of things to return, or `None` for everything.
    pub limit: Option<usize>,

    /// Only return these fields of each thing. Empty means all fields.
    pub fields: Vec<String>,

    /// Split the search into windows of this length.
    pub chunksize: Option<Frequency>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            limit: Some(REQUEST_LIMIT),
            fields: vec![],
            chunksize: None,
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, start: impl Into<Option<NaiveDate>>) -> Self {
        self.start = start.into();
        self
    }

    pub fn end(mut self, end: impl Into<Option<NaiveDate>>) -> Self {
        self.end = end.into();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Removes the limit on the number of things returned.
    pub fn unlimited(mut self) -> Self {
        self.limit = None;
        self
    }

    pub fn fields<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.fields = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    pub fn chunksize(mut self, chunksize: impl Into<Option<Frequency>>) -> Self {
        self.chunksize = chunksize.into();
        self
    }
}

/// Adds the fields needed internally to a field filter.
fn filter_fields<S: AsRef<str>>(fields: &[S]) -> Vec<String> {
    let mut filter: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
    if !filter.is_empty() {
        for required in REQUIRED_FIELDS {
            if !filter.iter().any(|f| f == required) {
                filter.push(required.to_string());
            }
        }
    }
    filter
}

/// Retrieves Reddit comments and submissions.
///
/// All results are sorted from oldest to newest.
pub struct Reddit<A = PushshiftService, S = RedditService, C = SystemClock> {
    archive: A,
    official: Option<S>,
    use_official: bool,
    allow_fallback: bool,
    retry: RetryPolicy,
    clock: C,
}

impl Reddit {
    /// Creates a new client.
    ///
    /// If credentials are given, they are verified immediately. Invalid
    /// credentials are not an error: the client logs a warning and carries
    /// on with the archive alone.
    pub async fn new(options: Options) -> Self {
        let official = options.credentials.clone().map(RedditService::new);
        Self::with_services(options, PushshiftService::default(), official, SystemClock).await
    }
}

impl<A: Archive, S: Service, C: Clock> Reddit<A, S, C> {
    /// Creates a new client that searches `archive` and consults `official`.
    pub async fn with_services(options: Options, archive: A, official: Option<S>, clock: C) -> Self {
        let official = match official {
            Some(service) => match service.authenticate().await {
                Ok(()) => Some(service),
                Err(err) => {
                    log::warn!("Reddit API credentials invalid. Defaulting to Pushshift.io API");
                    log::debug!("Authentication failed: {err}");
                    None
                }
            },
            None => {
                if options.use_official {
                    log::warn!("Reddit API credentials not detected. Defaulting to Pushshift.io API");
                }
                None
            }
        };

        Self {
            use_official: options.use_official && official.is_some(),
            allow_fallback: options.allow_fallback,
            retry: RetryPolicy::new(options.max_retries, options.backoff),
            archive,
            official,
            clock,
        }
    }

    /// True if results are refreshed with live data from the official API.
    pub fn use_official(&self) -> bool {
        self.use_official
    }

    /// True if an authenticated official API is available.
    pub fn has_official(&self) -> bool {
        self.official.is_some()
    }

    /// Converts a UTC epoch into a datetime.
    pub fn convert_utc_epoch_to_datetime(&self, epoch: i64) -> Option<DateTime<Utc>> {
        clock::convert_utc_epoch_to_datetime(epoch)
    }

    /// Today's date in UTC, according to the client's clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Descriptive information about a subreddit, such as its subscriber
    /// count.
    ///
    /// Only available in official mode.
    pub async fn subreddit_metadata(&self, subreddit: &str) -> Result<SubredditMetadata, Error> {
        let official = match &self.official {
            Some(official) if self.use_official => official,
            _ => return Err(Error::OfficialApiRequired),
        };
        let path = format!("/r/{subreddit}/about");
        let data = self.fetch(official, &path, NO_QUERY).await?;
        Ok(SubredditMetadata::parse(&data)?)
    }

    /// Submissions posted to `subreddit`.
    pub async fn subreddit_submissions(
        &self,
        subreddit: &str,
        query: &Query,
    ) -> Result<Vec<Submission>, Error> {
        let params = SearchParams::default()
            .subreddit(subreddit)
            .filter(&filter_fields(&query.fields));
        self.retrieve_chunked(params, query).await
    }

    /// Comments posted on the given submissions.
    ///
    /// Submissions may be given as IDs, fullnames or permalinks. If the
    /// archive has no comments for them (or cannot be reached), comment
    /// trees are fetched from the official API instead, as long as
    /// fallback is allowed. The query's dates only bound the search when
    /// they are set.
    pub async fn submission_comments<T: AsRef<str>>(
        &self,
        submissions: &[T],
        query: &Query,
    ) -> Result<Vec<Comment>, Error> {
        let ids = submissions
            .iter()
            .map(|s| thing::submission_id(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let fullnames: Vec<String> = ids.iter().map(|id| format!("{}_{id}", Kind::Submission.prefix())).collect();
        let mut params = SearchParams::default()
            .link_ids(&fullnames)
            .filter(&filter_fields(&query.fields));
        if let Some(start) = query.start {
            params = params.after(clock::date_epoch(start));
        }
        if let Some(end) = query.end {
            params = params.before(clock::date_epoch(end));
        }

        let archived = self.retrieve(params, query.limit).await;
        match archived {
            Ok(comments) if !comments.is_empty() => Ok(comments),
            result => match self.fallback() {
                Some(official) => {
                    match &result {
                        Ok(_) => log::info!("No comments in archive; falling back to the Reddit API"),
                        Err(err) => log::warn!("Archive search failed ({err}); falling back to the Reddit API"),
                    }
                    self.official_comments(official, &ids, query).await
                }
                None => result,
            },
        }
    }

    /// Comments written by any of `authors`.
    pub async fn author_comments<T: AsRef<str>>(
        &self,
        authors: &[T],
        query: &Query,
    ) -> Result<Vec<Comment>, Error> {
        let params = SearchParams::default()
            .authors(authors)
            .filter(&filter_fields(&query.fields));
        self.retrieve_chunked(params, query).await
    }

    /// Submissions posted by any of `authors`.
    pub async fn author_submissions<T: AsRef<str>>(
        &self,
        authors: &[T],
        query: &Query,
    ) -> Result<Vec<Submission>, Error> {
        let params = SearchParams::default()
            .authors(authors)
            .filter(&filter_fields(&query.fields));
        self.retrieve_chunked(params, query).await
    }

    /// Submissions whose title contains the phrase `text`.
    pub async fn search_submissions(
        &self,
        text: &str,
        subreddit: Option<&str>,
        query: &Query,
    ) -> Result<Vec<Submission>, Error> {
        let params = self.text_search(subreddit, query).title(format!("\"{text}\""));
        self.retrieve(params, query.limit).await
    }

    /// Comments whose body matches `text`.
    pub async fn search_comments(
        &self,
        text: &str,
        subreddit: Option<&str>,
        query: &Query,
    ) -> Result<Vec<Comment>, Error> {
        let params = self.text_search(subreddit, query).q(text);
        self.retrieve(params, query.limit).await
    }

    /// Subreddits ranked by the number of submissions posted to them.
    ///
    /// One request is made per window of the query's chunk size (five
    /// minutes by default), so only a sample of each window is counted.
    /// Windows that cannot be retrieved are skipped. Users' personal
    /// subreddits (`u_...`) are not included.
    pub async fn active_subreddits(&self, query: &Query) -> Vec<Tally> {
        let chunksize = query.chunksize.unwrap_or(ACTIVE_SUBREDDITS_CHUNKSIZE);
        let (start, end) = self.bounds(query);
        let filter = filter_fields(&["subreddit"]);

        let mut tallier = Tallier::new();
        for (after, stop) in clock::chunk_timestamps(start, end, Some(&chunksize))
            .into_iter()
            .tuple_windows()
        {
            let params = SearchParams::default()
                .after(after)
                .before(stop + 1)
                .filter(&filter)
                .size(MAX_RESULTS_PER_REQUEST);
            match self.archive_page::<Submission>(&params).await {
                Ok(page) => page
                    .into_iter()
                    .filter_map(|submission| submission.subreddit)
                    .for_each(|subreddit| tallier.add(subreddit)),
                Err(err) => log::warn!("Skipping subreddits from {after} to {stop}: {err}"),
            }
        }

        tallier.retain(|name| !name.starts_with("u_"));
        tallier.most_common()
    }

    /// Authors ranked by the number of comments or submissions they posted
    /// to `subreddit`.
    ///
    /// Deleted accounts and probable bots are not counted. Windows that
    /// cannot be retrieved are skipped.
    pub async fn subreddit_user_history(
        &self,
        subreddit: &str,
        kind: Kind,
        query: &Query,
    ) -> Vec<Tally> {
        let (start, end) = self.bounds(query);
        let filter = filter_fields(&["author"]);

        let mut tallier = Tallier::new();
        for (after, stop) in clock::chunk_timestamps(start, end, query.chunksize.as_ref())
            .into_iter()
            .tuple_windows()
        {
            let params = SearchParams::default()
                .subreddit(subreddit)
                .after(after)
                .before(stop + 1)
                .filter(&filter);
            let authors = match kind {
                Kind::Comment => self.authors::<Comment>(params).await,
                Kind::Submission => self.authors::<Submission>(params).await,
            };
            match authors {
                Ok(authors) => authors.into_iter().for_each(|author| tallier.add(author)),
                Err(err) => log::warn!("Skipping authors from {after} to {stop}: {err}"),
            }
        }

        tallier.retain(filter::is_countable_author);
        tallier.most_common()
    }

    fn bounds(&self, query: &Query) -> (i64, i64) {
        let start = clock::start_epoch(query.start);
        let end = clock::end_epoch(query.end, &self.clock);
        (start, end)
    }

    fn fallback(&self) -> Option<&S> {
        if self.allow_fallback {
            self.official.as_ref()
        } else {
            None
        }
    }

    fn text_search(&self, subreddit: Option<&str>, query: &Query) -> SearchParams {
        let (start, end) = self.bounds(query);
        let params = SearchParams::default()
            .after(start)
            .before(end)
            .filter(&filter_fields(&query.fields));
        match subreddit {
            Some(subreddit) => params.subreddit(subreddit),
            None => params,
        }
    }

    async fn fetch(&self, official: &S, path: &str, query: &[(&str, String)]) -> Result<String, Error> {
        Ok(self.retry.run(move || official.get_resource(path, query)).await?)
    }

    /// A single page of search results.
    async fn archive_page<T: Thing>(&self, params: &SearchParams) -> Result<Vec<T>, Error> {
        let archive = &self.archive;
        self.retry
            .run(move || async move {
                let data = archive.search(T::KIND, params).await?;
                Ok::<_, Error>(thing::parse_archive(&data)?)
            })
            .await
    }

    /// Pages backwards through the archive until `limit` things are found
    /// or the archive runs out.
    async fn search<T: Thing>(&self, mut params: SearchParams, limit: Option<usize>) -> Result<Vec<T>, Error> {
        let mut things: Vec<T> = vec![];
        loop {
            let size = match limit {
                Some(limit) if things.len() >= limit => break,
                Some(limit) => (limit - things.len()).min(MAX_RESULTS_PER_REQUEST),
                None => MAX_RESULTS_PER_REQUEST,
            };
            params.size = Some(size);

            let page: Vec<T> = self.archive_page(&params).await?;
            let full = page.len() >= size;
            let oldest = page.iter().filter_map(|thing| thing.created_utc()).min();
            things.extend(page);

            match oldest {
                Some(oldest) if full && params.before.is_none_or(|before| oldest < before) => {
                    params.before = Some(oldest);
                }
                _ => break,
            }
        }
        Ok(things)
    }

    /// Searches the archive, refreshing results from the official API in
    /// official mode.
    async fn retrieve<T: Thing>(&self, params: SearchParams, limit: Option<usize>) -> Result<Vec<T>, Error> {
        let mut things = self.search(params, limit).await?;
        if self.use_official {
            things = self.refresh(things).await;
        }
        thing::sort_by_created(&mut things);
        Ok(things)
    }

    /// Runs a search once per window of the query's chunk size.
    ///
    /// Windows that fail are skipped, unless every window fails.
    async fn retrieve_chunked<T: Thing>(&self, params: SearchParams, query: &Query) -> Result<Vec<T>, Error> {
        let (start, end) = self.bounds(query);
        let mut things: Vec<T> = vec![];
        let mut succeeded = false;
        let mut last_error = None;

        for (after, stop) in clock::chunk_timestamps(start, end, query.chunksize.as_ref())
            .into_iter()
            .tuple_windows()
        {
            let remaining = match query.limit {
                Some(limit) if things.len() >= limit => break,
                Some(limit) => Some(limit - things.len()),
                None => None,
            };
            let window = params.clone().after(after).before(stop + 1);
            match self.retrieve(window, remaining).await {
                Ok(found) => {
                    succeeded = true;
                    things.extend(found);
                }
                Err(err) => {
                    log::warn!("Skipping {} from {after} to {stop}: {err}", T::KIND);
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) if !succeeded => Err(err),
            _ => {
                thing::sort_by_created(&mut things);
                if let Some(limit) = query.limit {
                    things.truncate(limit);
                }
                Ok(things)
            }
        }
    }

    async fn authors<T: Thing>(&self, params: SearchParams) -> Result<Vec<String>, Error> {
        let things: Vec<T> = self.search(params, None).await?;
        Ok(things
            .iter()
            .filter_map(|thing| thing.author())
            .map(str::to_string)
            .collect())
    }

    /// Replaces archived things with their current state from the official
    /// API. Things the API does not return are kept as archived.
    async fn refresh<T: Thing>(&self, things: Vec<T>) -> Vec<T> {
        let Some(official) = &self.official else {
            return things;
        };

        let fullnames: Vec<String> = things.iter().filter_map(|thing| thing.fullname()).collect();
        let mut live: HashMap<String, T> = HashMap::new();
        for batch in fullnames.chunks(INFO_BATCH_SIZE) {
            let query = [("id", batch.join(","))];
            let refreshed = match self.fetch(official, "/api/info", &query).await {
                Ok(data) => thing::parse_listing::<T>(&data).map_err(Error::from),
                Err(err) => Err(err),
            };
            match refreshed {
                Ok(refreshed) => live.extend(
                    refreshed
                        .into_iter()
                        .filter_map(|thing| Some((thing.id()?.to_string(), thing))),
                ),
                Err(err) => log::warn!("Could not refresh {} from the Reddit API: {err}", T::KIND),
            }
        }

        things
            .into_iter()
            .map(|thing| match thing.id().and_then(|id| live.remove(id)) {
                Some(fresh) => fresh,
                None => thing,
            })
            .collect()
    }

    /// Fetches whole comment trees from the official API.
    async fn official_comments(&self, official: &S, ids: &[String], query: &Query) -> Result<Vec<Comment>, Error> {
        let mut comments = vec![];
        for id in ids {
            let path = format!("/comments/{id}");
            match self.fetch(official, &path, NO_QUERY).await {
                Ok(data) => comments.extend(thing::parse_comment_tree(&data)?),
                Err(err) => log::warn!("Could not retrieve comments on {id} from the Reddit API: {err}"),
            }
        }

        if let Some(start) = query.start.map(clock::date_epoch) {
            comments.retain(|c| c.created_utc().is_some_and(|created| created >= start));
        }
        if let Some(end) = query.end.map(clock::date_epoch) {
            comments.retain(|c| c.created_utc().is_some_and(|created| created < end));
        }
        thing::sort_by_created(&mut comments);
        if let Some(limit) = query.limit {
            comments.truncate(limit);
        }
        Ok(comments)
    }
}

#[cfg(test)]
impl<A, S, C> Reddit<A, S, C> {
    pub(crate) fn archive(&self) -> &A {
        &self.archive
    }
}

impl<A, S, C> fmt::Display for Reddit<A, S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reddit(use_official={})", self.use_official)
    }
}

impl<A, S, C> fmt::Debug for Reddit<A, S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reddit")
            .field("use_official", &self.use_official)
            .field("allow_fallback", &self.allow_fallback)
            .field("has_official", &self.official.is_some())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// A client error.
#[derive(Debug, Error)]
pub enum Error {
    /// An error from the underlying HTTP service.
    #[error("Service error: {0}")]
    Service(#[from] HTTPError),

    /// An error parsing data.
    #[error("Parse error: {0}")]
    Parse(#[from] thing::Error),

    /// The operation needs the official API, but the client was not
    /// created in official mode with valid credentials.
    #[error("This operation requires the official Reddit API; provide valid credentials and enable official mode")]
    OfficialApiRequired,
}
