// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! Environment and configuration utilities.
//!
//! API credentials live in a JSON file with one section per supported
//! platform. Only Reddit is supported at the moment:
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
//! Without credentials only the anonymous Pushshift search is available.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{env, fmt, fs, io};
use thiserror::Error;

/// Default location of the credential file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "retriever/config.json";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_ENV_VAR: &str = "RETRIEVER_CONFIG";

/// Credentials for the official Reddit API.
///
/// `username` and `password` are only required for the "script" OAuth flow.
/// Without them the client falls back to an application-only token.
#[derive(Clone, Deserialize, PartialEq)]
pub struct RedditCredentials {
    /// OAuth client ID of the registered application.
    pub client_id: String,

    /// OAuth client secret of the registered application.
    pub client_secret: String,

    /// User agent sent with every request to the Reddit API.
    pub user_agent: String,

    /// Reddit account name.
    #[serde(default)]
    pub username: Option<String>,

    /// Reddit account password.
    #[serde(default)]
    pub password: Option<String>,
}

impl RedditCredentials {
    /// Username and password, if both are configured.
    pub fn account(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        }
    }
}

impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"********")
            .field("user_agent", &self.user_agent)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}

/// Per-platform API credentials.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Credentials {
    /// Credentials for the Reddit API.
    #[serde(default)]
    pub reddit: Option<RedditCredentials>,
}

impl Credentials {
    /// Loads credentials from the file at `path`.
    ///
    /// A missing file is not an error: it simply means no credentials were
    /// configured, and empty credentials are returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(data) => Self::parse(&data).map_err(|err| Error::Parse(path.to_path_buf(), err)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("No credentials found at {}", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(Error::Read(path.to_path_buf(), err)),
        }
    }

    /// Loads credentials from `path`, or from the default location if
    /// `path` is `None`.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load(config_path()),
        }
    }

    /// Parses the JSON contents of a credential file.
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

/// Path of the credential file.
///
/// This is `$RETRIEVER_CONFIG` if set, otherwise [`DEFAULT_CONFIG_PATH`].
pub fn config_path() -> PathBuf {
    env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// A configuration error.
#[derive(Debug, Error)]
pub enum Error {
    /// The credential file exists but could not be read.
    #[error("Could not read {path}: {err}", path = .0.display(), err = .1)]
    Read(PathBuf, #[source] io::Error),

    /// The credential file is not valid JSON.
    #[error("Could not parse {path}: {err}", path = .0.display(), err = .1)]
    Parse(PathBuf, #[source] serde_json::Error),
}
