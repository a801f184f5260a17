// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! Services for communicating with APIs using HTTP.

use reqwest::{Client, ClientBuilder, Response, header};
use std::{error, fmt};

/// A general service for making HTTP calls.
///
/// It might be a bit odd to refer to this trait as a "service", since
/// it appears to be more of a _client_ implementation, but think of
/// this as a proxy for a remote _service_ (even though a _client_ is used
/// to communicate with that remote service). A service might not always
/// be remote, such as when the implementation is a deterministic service
/// used for testing.
pub trait HTTPService {
    /// Default HTTP client that can be used to make HTTP requests.
    fn client() -> Client {
        Self::client_with_user_agent(Self::user_agent())
    }

    /// An HTTP client that identifies itself with the given `user_agent`.
    fn client_with_user_agent(user_agent: impl AsRef<str>) -> Client {
        ClientBuilder::new()
            .user_agent(user_agent.as_ref())
            .build()
            // According to the docs, build() only fails if a TLS backend
            // cannot be initialized, or if DNS resolution cannot be
            // initialized, and both of these are unrecoverable for us.
            .expect("could not create a new HTTP client")
    }

    /// An appropriate user agent to use when making HTTP requests.
    fn user_agent() -> String {
        format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

/// Reads the body of a JSON response.
///
/// Fails if the response has an unsuccessful status code, or if it does not
/// declare an `application/json` content type.
pub async fn json_body(resp: Response) -> HTTPResult<String> {
    if !resp.status().is_success() {
        return Err(HTTPError::Http(resp.status()));
    }

    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .ok_or(HTTPError::MissingContentType)?
        .to_str()?;
    if !content_type.starts_with("application/json") {
        Err(HTTPError::UnexpectedContentType(content_type.to_string()))
    } else {
        resp.text().await.map_err(HTTPError::Body)
    }
}

/// The result of an HTTP request.
pub type HTTPResult<T> = Result<T, HTTPError>;

/// Indicates an error has occurred when making an HTTP call.
#[derive(Debug)]
pub enum HTTPError {
    /// An error retrieving the body of a response.
    Body(reqwest::Error),

    /// An error that occurred while making an HTTP request.
    Request(reqwest::Error),

    /// An error that occurred while building a request URL.
    Url(UrlParseError),

    /// An unsuccessful HTTP status code in an HTTP response.
    Http(reqwest::StatusCode),

    /// A missing Content-Type header in a response.
    MissingContentType,

    /// An invalid Content-Type header.
    InvalidContentType(header::ToStrError),

    /// A Content-Type that is not understood by the service.
    UnexpectedContentType(String),

    /// The remote service refused the supplied credentials.
    Authentication(String),
}

/// Error produced when a request URL cannot be parsed.
pub type UrlParseError = <reqwest::Url as std::str::FromStr>::Err;

impl From<reqwest::Error> for HTTPError {
    fn from(error: reqwest::Error) -> Self {
        HTTPError::Request(error)
    }
}

impl From<header::ToStrError> for HTTPError {
    fn from(error: header::ToStrError) -> Self {
        HTTPError::InvalidContentType(error)
    }
}

impl fmt::Display for HTTPError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HTTPError::Body(err) => write!(f, "Error retrieving body of HTTP response: {err}"),
            HTTPError::Request(err) => write!(f, "Error while making HTTP request: {err}"),
            HTTPError::Url(err) => write!(f, "Invalid request URL: {err}"),
            HTTPError::Http(status) => write!(f, "Request returned HTTP {status}"),
            HTTPError::MissingContentType => write!(f, "Missing Content-Type header"),
            HTTPError::InvalidContentType(err) => {
                write!(f, "Invalid Content-Type header value: {err}")
            }
            HTTPError::UnexpectedContentType(content_type) => {
                write!(f, "Unexpected content type: {content_type}")
            }
            HTTPError::Authentication(reason) => write!(f, "Authentication failed: {reason}"),
        }
    }
}

impl error::Error for HTTPError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            HTTPError::Body(err) => Some(err),
            HTTPError::Request(err) => Some(err),
            HTTPError::Url(err) => Some(err),
            HTTPError::Http(_) => None,
            HTTPError::MissingContentType => None,
            HTTPError::InvalidContentType(err) => Some(err),
            HTTPError::UnexpectedContentType(_) => None,
            HTTPError::Authentication(_) => None,
        }
    }
}
