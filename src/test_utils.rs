// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

use crate::clock::{Clock, DateTime, Utc};
use crate::http::{HTTPError, HTTPResult};
use crate::reddit::client::{Options, Reddit};
use crate::reddit::pushshift::{Archive, SearchParams};
use crate::reddit::service::Service;
use crate::reddit::thing::Kind;
use reqwest::StatusCode;
use serde_json::{Map, Value, json};
use std::fs;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[allow(dead_code)]
pub fn do_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn load_data(file: &str) -> String {
    fs::read_to_string(format!("tests/data/{file}.json")).expect("could not find test data")
}

/// Records from a Pushshift fixture.
pub fn load_records(file: &str) -> Vec<Value> {
    let data: Value = serde_json::from_str(&load_data(file)).expect("invalid test data");
    match data.get("data") {
        Some(Value::Array(records)) => records.clone(),
        _ => panic!("{file} is not a Pushshift response"),
    }
}

/// `n` synthetic submissions, one per minute, ending at `newest`.
pub fn generate_submissions(n: usize, newest: i64) -> Vec<Value> {
    (0..n as i64)
        .map(|i| {
            json!({
                "id": format!("gen{i}"),
                "author": format!("user{}", i % 7),
                "created_utc": newest - 60 * i,
                "subreddit": "modeltrains",
                "title": format!("Post {i}"),
            })
        })
        .collect()
}

/// An in-memory archive that answers searches from fixture data.
///
/// Searches are filtered by time range, subreddit, author and submission,
/// returned newest first, and truncated to the requested size, just as
/// Pushshift would.
pub struct TestArchive {
    comments: Vec<Value>,
    submissions: Vec<Value>,
    failures: AtomicUsize,
    requests: Mutex<Vec<(Kind, SearchParams)>>,
}

impl TestArchive {
    pub fn new() -> Self {
        Self {
            comments: load_records("pushshift_comments"),
            submissions: load_records("pushshift_submissions"),
            failures: AtomicUsize::new(0),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn empty() -> Self {
        Self::new().with_comments(vec![]).with_submissions(vec![])
    }

    pub fn with_comments(mut self, comments: Vec<Value>) -> Self {
        self.comments = comments;
        self
    }

    pub fn with_submissions(mut self, submissions: Vec<Value>) -> Self {
        self.submissions = submissions;
        self
    }

    /// Fails the first `n` searches with an HTTP 503.
    pub fn failing(self, n: usize) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn requests(&self) -> Vec<(Kind, SearchParams)> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, kind: Kind, params: &SearchParams) -> HTTPResult<String> {
        self.requests.lock().unwrap().push((kind, params.clone()));

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(HTTPError::Http(StatusCode::SERVICE_UNAVAILABLE));
        }

        let records = match kind {
            Kind::Comment => &self.comments,
            Kind::Submission => &self.submissions,
        };
        let mut matches: Vec<&Value> = records.iter().filter(|r| matches(r, params)).collect();
        matches.sort_by_key(|r| std::cmp::Reverse(r["created_utc"].as_i64()));
        let data: Vec<Value> = matches
            .into_iter()
            .take(params.size.unwrap_or(25))
            .map(|r| project(r, &params.filter))
            .collect();
        Ok(json!({ "data": data }).to_string())
    }
}

fn matches(record: &Value, params: &SearchParams) -> bool {
    let text = |field: &str| record[field].as_str().unwrap_or_default().to_string();
    let created = record["created_utc"].as_i64();

    params.after.is_none_or(|after| created.is_some_and(|c| c > after))
        && params.before.is_none_or(|before| created.is_some_and(|c| c < before))
        && params.subreddit.as_ref().is_none_or(|s| text("subreddit").eq_ignore_ascii_case(s))
        && (params.authors.is_empty() || params.authors.contains(&text("author")))
        && (params.link_ids.is_empty() || {
            let link_id = text("link_id");
            let link_id = link_id.strip_prefix("t3_").unwrap_or(&link_id).to_string();
            params
                .link_ids
                .iter()
                .any(|id| id.strip_prefix("t3_").unwrap_or(id) == link_id)
        })
        && params.q.as_ref().is_none_or(|q| text("body").contains(q.as_str()))
        && params
            .title
            .as_ref()
            .is_none_or(|t| text("title").contains(t.trim_matches('"')))
}

fn project(record: &Value, fields: &[String]) -> Value {
    match record {
        Value::Object(map) if !fields.is_empty() => {
            let projected: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| fields.contains(key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Value::Object(projected)
        }
        _ => record.clone(),
    }
}

impl Archive for TestArchive {
    fn search(
        &self,
        kind: Kind,
        params: &SearchParams,
    ) -> impl Future<Output = HTTPResult<String>> + Send {
        let result = self.respond(kind, params);
        async move { result }
    }
}

/// An in-memory official API that answers requests from fixture data.
pub struct TestService {
    authenticated: bool,
    info_available: bool,
    requests: Mutex<Vec<String>>,
}

impl TestService {
    pub fn new() -> Self {
        Self {
            authenticated: true,
            info_available: true,
            requests: Mutex::new(vec![]),
        }
    }

    /// A service whose credentials are rejected.
    pub fn unauthorized() -> Self {
        Self {
            authenticated: false,
            ..Self::new()
        }
    }

    /// A service whose `/api/info` endpoint is unavailable.
    pub fn without_info() -> Self {
        Self {
            info_available: false,
            ..Self::new()
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, path: &str, query: &[(&str, String)]) -> HTTPResult<String> {
        self.requests.lock().unwrap().push(path.to_string());
        if !self.authenticated {
            return Err(HTTPError::Authentication("invalid_grant".to_string()));
        }

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let fixture = match segments.as_slice() {
            ["comments", id] => format!("official_comments_{id}"),
            ["r", subreddit, "about"] => format!("official_about_{subreddit}"),
            ["api", "info"] if !self.info_available => {
                return Err(HTTPError::Http(StatusCode::SERVICE_UNAVAILABLE));
            }
            ["api", "info"] => {
                let ids = query
                    .iter()
                    .find(|(name, _)| *name == "id")
                    .map(|(_, ids)| ids.as_str())
                    .unwrap_or_default();
                if ids.starts_with("t1_") {
                    "official_info_comments".to_string()
                } else {
                    "official_info_submissions".to_string()
                }
            }
            _ => return Err(HTTPError::Http(StatusCode::NOT_FOUND)),
        };
        fs::read_to_string(format!("tests/data/{fixture}.json"))
            .map_err(|_| HTTPError::Http(StatusCode::NOT_FOUND))
    }
}

impl Service for TestService {
    fn authenticate(&self) -> impl Future<Output = HTTPResult<()>> + Send {
        let result = if self.authenticated {
            Ok(())
        } else {
            Err(HTTPError::Authentication("invalid_grant".to_string()))
        };
        async move { result }
    }

    fn get_resource(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> impl Future<Output = HTTPResult<String>> + Send {
        let result = self.respond(path, query);
        async move { result }
    }
}

pub struct FrozenClock {
    datetime: DateTime<Utc>,
}

impl FrozenClock {
    pub fn new(datetime: DateTime<Utc>) -> Self {
        FrozenClock { datetime }
    }
}

impl Default for FrozenClock {
    fn default() -> Self {
        let datetime = DateTime::parse_from_rfc3339("2025-05-23T10:13:00-07:00")
            .expect("invalid date supplied")
            .with_timezone(&Utc);
        Self::new(datetime)
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.datetime
    }
}

/// Options that keep tests quick when requests fail.
pub fn test_options() -> Options {
    Options::default().backoff(0)
}

impl Reddit<TestArchive, TestService, FrozenClock> {
    /// Returns a wrapper that searches fixture data, without access to the
    /// official API.
    pub async fn test() -> Self {
        Self::test_with(test_options(), TestArchive::new(), None).await
    }

    /// Returns a wrapper in official mode, backed by fixture data.
    pub async fn test_official() -> Self {
        let options = test_options().use_official(true);
        Self::test_with(options, TestArchive::new(), Some(TestService::new())).await
    }

    pub async fn test_with(
        options: Options,
        archive: TestArchive,
        official: Option<TestService>,
    ) -> Self {
        Reddit::with_services(options, archive, official, FrozenClock::default()).await
    }
}
