// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! HTTPS connector for the Pushshift archive of Reddit content.
//!
//! Pushshift indexes historical comments and submissions and allows them to
//! be searched by subreddit, author, submission, text and time range. It does
//! not require credentials, but it is notoriously unstable, so callers should
//! be ready for failures (see [`crate::retry`]).

use crate::http::{self, HTTPError, HTTPResult, HTTPService};
use crate::reddit::thing::Kind;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Url};
use std::fmt;
use std::num::NonZeroU32;

/// Root of the Pushshift search API.
pub const BASE_URL: &str = "https://api.pushshift.io/reddit/search";

/// Maximum number of results Pushshift returns for a single request.
pub const MAX_RESULTS_PER_REQUEST: usize = 100;

/// Parameters for a Pushshift search.
///
/// Parameters are built up incrementally:
///
/// ```
/// use retriever::reddit::pushshift::SearchParams;
/// let params = SearchParams::default()
///     .subreddit("modeltrains")
///     .after(1546300800)
///     .before(1546387201);
/// assert_eq!(params.before, Some(1546387201));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[must_use]
pub struct SearchParams {
    /// Only return things created at or after this epoch.
    pub after: Option<i64>,

    /// Only return things created before this epoch.
    pub before: Option<i64>,

    /// Only return things from this subreddit.
    pub subreddit: Option<String>,

    /// Only return things by these authors.
    pub authors: Vec<String>,

    /// Only return comments on these submissions (fullnames).
    pub link_ids: Vec<String>,

    /// Only return submissions whose title matches.
    pub title: Option<String>,

    /// Only return things whose text matches.
    pub q: Option<String>,

    /// Only return these fields of each thing.
    pub filter: Vec<String>,

    /// Maximum number of results to return.
    pub size: Option<usize>,
}

impl SearchParams {
    /// Sets the lower time bound.
    pub fn after(mut self, epoch: i64) -> Self {
        self.after = Some(epoch);
        self
    }

    /// Sets the upper time bound.
    pub fn before(mut self, epoch: i64) -> Self {
        self.before = Some(epoch);
        self
    }

    /// Restricts results to a subreddit.
    pub fn subreddit(mut self, subreddit: impl Into<String>) -> Self {
        self.subreddit = Some(subreddit.into());
        self
    }

    /// Restricts results to a set of authors.
    pub fn authors<S: AsRef<str>>(mut self, authors: &[S]) -> Self {
        self.authors = authors.iter().map(|a| a.as_ref().to_string()).collect();
        self
    }

    /// Restricts results to comments on a set of submissions.
    pub fn link_ids<S: AsRef<str>>(mut self, link_ids: &[S]) -> Self {
        self.link_ids = link_ids.iter().map(|id| id.as_ref().to_string()).collect();
        self
    }

    /// Restricts results to submissions with a matching title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Restricts results to things with matching text.
    pub fn q(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    /// Only returns the given fields.
    pub fn filter<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.filter = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    /// Limits the number of results in a single response.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Query string pairs for these parameters.
    ///
    /// Results are always sorted newest first, which is what allows
    /// paging backwards through time by moving `before`.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![];
        if let Some(after) = self.after {
            pairs.push(("after", after.to_string()));
        }
        if let Some(before) = self.before {
            pairs.push(("before", before.to_string()));
        }
        if let Some(subreddit) = &self.subreddit {
            pairs.push(("subreddit", subreddit.clone()));
        }
        if !self.authors.is_empty() {
            pairs.push(("author", self.authors.join(",")));
        }
        if !self.link_ids.is_empty() {
            pairs.push(("link_id", self.link_ids.join(",")));
        }
        if let Some(title) = &self.title {
            pairs.push(("title", title.clone()));
        }
        if let Some(q) = &self.q {
            pairs.push(("q", q.clone()));
        }
        if !self.filter.is_empty() {
            pairs.push(("filter", self.filter.join(",")));
        }
        if let Some(size) = self.size {
            pairs.push(("size", size.to_string()));
        }
        pairs.push(("sort", "desc".to_string()));
        pairs.push(("sort_type", "created_utc".to_string()));
        pairs
    }
}

/// A searchable archive of Reddit content.
///
/// Using this trait, clients can implement different ways of connecting
/// to the archive, such as an actual connector for production code,
/// and a mocked connector for testing purposes.
pub trait Archive {
    /// Searches for things of the given `kind` and returns the raw JSON
    /// response body.
    fn search(
        &self,
        kind: Kind,
        params: &SearchParams,
    ) -> impl Future<Output = HTTPResult<String>> + Send;
}

/// A service that contacts the Pushshift API directly.
///
/// Requests are throttled to one per second.
pub struct PushshiftService {
    client: Client,
    base_url: String,
    limiter: DefaultDirectRateLimiter,
}

impl HTTPService for PushshiftService {}

impl Default for PushshiftService {
    fn default() -> Self {
        Self::with_base_url(BASE_URL)
    }
}

impl fmt::Debug for PushshiftService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushshiftService")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PushshiftService {
    /// Creates a service for a Pushshift-compatible API rooted at `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Self::client();
        let limiter = RateLimiter::direct(Quota::per_second(NonZeroU32::MIN));
        Self {
            client,
            base_url,
            limiter,
        }
    }

    fn uri(&self, kind: Kind, params: &SearchParams) -> HTTPResult<Url> {
        let endpoint = format!("{}/{}/", self.base_url, kind.endpoint());
        Url::parse_with_params(&endpoint, params.query_pairs()).map_err(HTTPError::Url)
    }
}

impl Archive for PushshiftService {
    async fn search(&self, kind: Kind, params: &SearchParams) -> HTTPResult<String> {
        let uri = self.uri(kind, params)?;
        self.limiter.until_ready().await;
        log::debug!("GET {uri}");
        let resp = self.client.get(uri).send().await?;
        http::json_body(resp).await
    }
}
