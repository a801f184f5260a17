// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! Retrying unreliable requests.
//!
//! Pushshift in particular fails often and transiently, so every request
//! made by [`crate::reddit::Reddit`] is attempted several times, sleeping
//! between attempts. The sleep grows quickly: after a wait of `n` seconds,
//! the next wait is `2^n` seconds.

use std::fmt::Display;
use std::time::Duration;
use tokio::time::sleep;

/// Longest that a single wait between attempts can last.
const MAX_BACKOFF_SECS: u64 = 60 * 60;

/// How many times to attempt a request and how long to wait in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts. Zero is treated as one.
    pub max_retries: u32,

    /// Seconds to wait after the first failure.
    pub backoff: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: 2,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy.
    pub fn new(max_retries: u32, backoff: u64) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// The waits between consecutive attempts.
    ///
    /// ```
    /// use retriever::retry::RetryPolicy;
    /// use std::time::Duration;
    /// let delays = RetryPolicy::new(4, 2).delays();
    /// assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(16)]);
    /// ```
    pub fn delays(&self) -> Vec<Duration> {
        let attempts = self.max_retries.max(1);
        let mut delays = vec![];
        let mut backoff = self.backoff.min(MAX_BACKOFF_SECS);
        for _ in 1..attempts {
            delays.push(Duration::from_secs(backoff));
            backoff = next_backoff(backoff);
        }
        delays
    }

    /// Runs `operation` until it succeeds or the attempts are used up.
    ///
    /// Returns the last error if every attempt fails.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delays = self.delays().into_iter();
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => match delays.next() {
                    Some(delay) => {
                        log::warn!(
                            "Attempt {attempt} failed ({err}); retrying in {}s",
                            delay.as_secs()
                        );
                        sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        log::warn!("Attempt {attempt} failed ({err}); giving up");
                        return Err(err);
                    }
                },
            }
        }
    }
}

fn next_backoff(backoff: u64) -> u64 {
    u32::try_from(backoff)
        .ok()
        .and_then(|exp| 2u64.checked_pow(exp))
        .map_or(MAX_BACKOFF_SECS, |secs| secs.min(MAX_BACKOFF_SECS))
}
