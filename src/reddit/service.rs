// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! HTTPS connector for the official Reddit API.
//!
//! Service structures in this module provide a low-level way to interact
//! with the Reddit API over HTTPS, essentially a specialized HTTPS client
//! specifically for Reddit. Requests are authenticated with OAuth; see
//! [`crate::conf`] for how credentials are configured.

use crate::conf::RedditCredentials;
use crate::http::{self, HTTPError, HTTPResult, HTTPService};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

/// Endpoint that issues OAuth access tokens.
pub const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Root of the authenticated Reddit API.
pub const OAUTH_URL: &str = "https://oauth.reddit.com";

/// A service for retrieving information from the official Reddit API.
///
/// Using this trait, clients can implement different ways of connecting
/// to the Reddit API, such as an actual connector for production code,
/// and a mocked connector for testing purposes.
pub trait Service {
    /// Verifies that the service's credentials are accepted.
    fn authenticate(&self) -> impl Future<Output = HTTPResult<()>> + Send;

    /// Performs a GET request to the API resource at `path` (such as
    /// `/r/rust/about`) and returns the raw JSON response.
    fn get_resource(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> impl Future<Output = HTTPResult<String>> + Send;
}

/// An OAuth bearer token and its expiration time.
#[derive(Clone, Debug)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Tokens are refreshed this long before they actually expire.
    const EXPIRY_MARGIN: TimeDelta = TimeDelta::seconds(60);

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Self::EXPIRY_MARGIN
    }
}

/// Reddit's token endpoint reports bad credentials with an HTTP 200 and an
/// error field, so both shapes have to be accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenResponse {
    Granted { access_token: String, expires_in: i64 },
    Refused { error: String },
}

/// A service that contacts the Reddit API directly to retrieve information.
#[derive(Debug)]
pub struct RedditService {
    client: Client,
    credentials: RedditCredentials,
    token_url: String,
    oauth_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl HTTPService for RedditService {}

impl RedditService {
    /// Creates a new Reddit service that authenticates with `credentials`.
    ///
    /// No requests are made until the service is used.
    pub fn new(credentials: RedditCredentials) -> Self {
        Self::with_endpoints(credentials, TOKEN_URL, OAUTH_URL)
    }

    /// Creates a service that requests tokens from `token_url` and
    /// resources from under `oauth_url`.
    pub fn with_endpoints(
        credentials: RedditCredentials,
        token_url: impl Into<String>,
        oauth_url: impl Into<String>,
    ) -> Self {
        let client = Self::client_with_user_agent(&credentials.user_agent);
        Self {
            client,
            credentials,
            token_url: token_url.into(),
            oauth_url: oauth_url.into(),
            token: Mutex::new(None),
        }
    }

    /// Form parameters for the token request.
    ///
    /// Accounts with a username and password use the "script" password
    /// grant; otherwise an application-only token is requested.
    fn grant(&self) -> Vec<(&'static str, String)> {
        match self.credentials.account() {
            Some((username, password)) => vec![
                ("grant_type", "password".to_string()),
                ("username", username.to_string()),
                ("password", password.to_string()),
            ],
            None => vec![("grant_type", "client_credentials".to_string())],
        }
    }

    fn uri(&self, path: &str) -> String {
        format!("{}/{}", self.oauth_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn request_token(&self) -> HTTPResult<AccessToken> {
        let resp = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&self.grant())
            .send()
            .await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(HTTPError::Authentication(
                "client ID or secret was rejected".to_string(),
            ));
        }

        let body = http::json_body(resp).await?;
        let token = serde_json::from_str(&body)
            .map_err(|err| HTTPError::Authentication(format!("unexpected token response: {err}")))?;
        match token {
            TokenResponse::Granted {
                access_token,
                expires_in,
            } => Ok(AccessToken {
                value: access_token,
                expires_at: Utc::now() + TimeDelta::seconds(expires_in),
            }),
            TokenResponse::Refused { error } => Err(HTTPError::Authentication(error)),
        }
    }

    /// A valid bearer token, requesting a new one if necessary.
    async fn token(&self) -> HTTPResult<String> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if !current.is_expired(Utc::now()) {
                return Ok(current.value.clone());
            }
        }

        log::debug!("Requesting a new Reddit API access token");
        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *token = Some(fresh);
        Ok(value)
    }
}

impl Service for RedditService {
    async fn authenticate(&self) -> HTTPResult<()> {
        self.token().await.map(|_| ())
    }

    async fn get_resource(&self, path: &str, query: &[(&str, String)]) -> HTTPResult<String> {
        let token = self.token().await?;
        let uri = self.uri(path);
        log::debug!("GET {uri}");

        // Without raw_json, Reddit escapes &, < and > in text fields.
        let mut query = query.to_vec();
        query.push(("raw_json", "1".to_string()));

        let resp = self
            .client
            .get(uri)
            .bearer_auth(token)
            .query(&query)
            .send()
            .await?;
        http::json_body(resp).await
    }
}
