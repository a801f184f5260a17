// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! General-purpose counting capabilities.

use counter::Counter;
use itertools::Itertools;

/// A pair of name (a subreddit or an author) and count.
pub type Tally = (String, usize);

/// Counts how often names occur, such as how many posts each author made.
#[derive(Clone, Debug, Default)]
pub struct Tallier {
    counts: Counter<String>,
}

impl Tallier {
    /// Creates an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more occurrence of `name`.
    pub fn add(&mut self, name: impl Into<String>) {
        *self.counts.entry(name.into()).or_insert(0) += 1;
    }

    /// Drops every name for which `keep` returns false.
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.counts.retain(|name, _| keep(name));
    }

    /// Number of occurrences of `name`.
    pub fn get(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or_default()
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True if nothing has been counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of occurrences across all names.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Pairs sorted from most to least common.
    ///
    /// Ties are broken alphabetically, ignoring case.
    pub fn most_common(&self) -> Vec<Tally> {
        self.counts
            .most_common_tiebreaker(|lhs, rhs| Ord::cmp(&lhs.to_lowercase(), &rhs.to_lowercase()))
    }

    /// Pairs sorted from least to most common.
    ///
    /// Ties are broken alphabetically, ignoring case.
    pub fn least_common(&self) -> Vec<Tally> {
        self.counts
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .sorted_by(|(lname, lcount), (rname, rcount)| {
                lcount
                    .cmp(rcount)
                    .then_with(|| Ord::cmp(&lname.to_lowercase(), &rname.to_lowercase()))
            })
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for Tallier {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let counts = iter.into_iter().map(|name| name.into()).collect::<Counter<String>>();
        Self { counts }
    }
}
