// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! All things time-related.
//!
//! Pushshift queries are bounded by UTC epochs, and long ranges are split
//! into smaller windows ("chunks") so that each request stays small.

pub use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use chrono::NaiveTime;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Tells time and returns the time.
///
/// Generally you will want to retrieve time using [`SystemClock`],
/// but in tests you may want to implement a `Clock` with a fixed time.
pub trait Clock {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Interacts with the system clock to get the current time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The earliest date for which Reddit has content.
pub fn reddit_launch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2005, 8, 1).expect("2005-08-01 is a valid date")
}

/// Epoch of midnight UTC on `date`.
pub fn date_epoch(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::default()).and_utc().timestamp()
}

/// Epoch of the start of a query.
///
/// Defaults to the launch of Reddit if `start` is `None`.
pub fn start_epoch(start: Option<NaiveDate>) -> i64 {
    date_epoch(start.unwrap_or_else(reddit_launch))
}

/// Epoch of the end of a query.
///
/// Defaults to midnight at the start of tomorrow (UTC) if `end` is `None`,
/// so that everything posted today is included.
pub fn end_epoch<C: Clock + ?Sized>(end: Option<NaiveDate>, clock: &C) -> i64 {
    date_epoch(end.unwrap_or_else(|| clock.now().date_naive() + TimeDelta::days(1)))
}

/// Converts a UTC epoch into a datetime.
///
/// Returns `None` if the epoch is out of range.
pub fn convert_utc_epoch_to_datetime(epoch: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(epoch, 0)
}

/// A span of time used to break up queries, such as `5m` or `7d`.
///
/// Frequencies are written as an optional multiplier followed by a unit:
/// minutes (`m`), hours (`h`), days (`d`), weeks (`w`), months (`mo`, 31
/// days) or years (`y`, 365 days). Parsing is case-insensitive.
///
/// # Examples
///
/// ```
/// use retriever::clock::Frequency;
/// let freq: Frequency = "5m".parse().unwrap();
/// assert_eq!(freq.seconds(), 300);
///
/// let freq: Frequency = "mo".parse().unwrap();
/// assert_eq!(freq.seconds(), 31 * 24 * 60 * 60);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frequency {
    seconds: i64,
}

impl Frequency {
    const UNITS: [(&'static str, i64); 6] = [
        ("m", 60),
        ("h", 60 * 60),
        ("d", 60 * 60 * 24),
        ("w", 60 * 60 * 24 * 7),
        ("mo", 60 * 60 * 24 * 31),
        ("y", 60 * 60 * 24 * 365),
    ];

    /// A frequency of `n` minutes. `n` must be positive.
    pub const fn minutes(n: i64) -> Self {
        Self { seconds: n * 60 }
    }

    /// Length of the frequency in seconds.
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Length of the frequency in whole days.
    pub fn days(&self) -> i64 {
        self.seconds / (60 * 60 * 24)
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static FREQUENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^(?<mult>\d*)(?<unit>mo|[mhdwy])$").expect("invalid frequency regex")
        });

        let freq = s.to_lowercase();
        let invalid = || Error::InvalidFrequency(s.to_string());
        let caps = FREQUENCY_RE.captures(&freq).ok_or_else(invalid)?;

        let mult = match &caps["mult"] {
            "" => 1,
            digits => digits.parse::<i64>().map_err(|_| invalid())?,
        };
        let base = Self::UNITS
            .iter()
            .find(|(name, _)| *name == &caps["unit"])
            .map(|(_, seconds)| *seconds)
            .ok_or_else(invalid)?;

        match mult.checked_mul(base) {
            Some(seconds) if seconds > 0 => Ok(Self { seconds }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.seconds)
    }
}

/// Splits the span from `start` to `end` into chunk boundaries.
///
/// Without a frequency the span is a single chunk. Otherwise boundaries
/// advance by `freq` until `end` is reached; the final chunk may be shorter.
///
/// # Examples
///
/// ```
/// use retriever::clock::{Frequency, chunk_timestamps};
/// let freq: Frequency = "1m".parse().unwrap();
/// assert_eq!(chunk_timestamps(0, 150, Some(&freq)), vec![0, 60, 120, 150]);
/// assert_eq!(chunk_timestamps(0, 150, None), vec![0, 150]);
/// ```
pub fn chunk_timestamps(start: i64, end: i64, freq: Option<&Frequency>) -> Vec<i64> {
    match freq {
        None => vec![start, end],
        Some(freq) => {
            let mut chunks = vec![start];
            let mut last = start;
            while last < end {
                last = last.saturating_add(freq.seconds()).min(end);
                chunks.push(last);
            }
            chunks
        }
    }
}

/// Dates from `start` to `end`, stepping by `freq`.
///
/// `end` is always included as the final date, even when it does not fall
/// on a step boundary. `freq` must be at least one day long.
pub fn date_range(start: NaiveDate, end: NaiveDate, freq: &Frequency) -> Result<Vec<NaiveDate>, Error> {
    let step = freq.days();
    if step < 1 {
        return Err(Error::SubDailyFrequency(*freq));
    }
    if start > end {
        return Ok(vec![]);
    }

    // A step too large to represent is past every date.
    let step = TimeDelta::try_days(step);
    let mut dates = vec![start];
    let mut next = step.and_then(|step| start.checked_add_signed(step));
    while let Some(date) = next.filter(|date| *date <= end) {
        dates.push(date);
        next = step.and_then(|step| date.checked_add_signed(step));
    }
    if dates.last() != Some(&end) {
        dates.push(end);
    }
    Ok(dates)
}

/// The date `days` days after `date`.
pub fn add_days(date: NaiveDate, days: i64) -> Result<NaiveDate, Error> {
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or(Error::DateOutOfRange(date, days))
}

/// A time-related error.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// A frequency string could not be parsed.
    #[error("Could not parse frequency: {0}")]
    InvalidFrequency(String),

    /// A frequency shorter than a day was used to generate dates.
    #[error("Frequency of {0} is shorter than a day")]
    SubDailyFrequency(Frequency),

    #[error("{1} days after {0} is out of range")]
    DateOutOfRange(NaiveDate, i64),
}

#[cfg(test)]
mod tests {
    mod clock {
        use super::super::*;
        use std::ops::Sub;

        #[test]
        fn it_returns_the_system_time() {
            let clock = SystemClock::default();
            let delta = Utc::now().sub(clock.now());
            let secs = delta.num_seconds();
            assert_eq!(secs, 0);
        }
    }

    mod epochs {
        use super::super::*;
        use crate::test_utils::FrozenClock;

        #[test]
        fn it_defaults_the_start_date_to_the_launch_of_reddit() {
            let default = start_epoch(None);
            let explicit = start_epoch(NaiveDate::from_ymd_opt(2005, 8, 1));
            assert_eq!(default, explicit);
            assert_eq!(default, 1122854400);
        }

        #[test]
        fn it_defaults_the_end_date_to_tomorrow() {
            let clock = FrozenClock::default();
            let tomorrow = NaiveDate::from_ymd_opt(2025, 5, 24);
            assert_eq!(end_epoch(None, &clock), end_epoch(tomorrow, &clock));
            assert_eq!(end_epoch(None, &clock), 1748044800);
        }

        #[test]
        fn it_converts_epochs_to_datetimes() {
            let actual = convert_utc_epoch_to_datetime(1577025930).unwrap();
            let expected = DateTime::parse_from_rfc3339("2019-12-22T06:45:30-08:00").unwrap();
            assert_eq!(actual, expected);
        }
    }

    mod frequency {
        use super::super::*;

        fn seconds(s: &str) -> i64 {
            s.parse::<Frequency>().unwrap().seconds()
        }

        #[test]
        fn it_parses_minutes() {
            assert_eq!(seconds("5m"), 300);
        }

        #[test]
        fn it_parses_hours_and_days() {
            assert_eq!(seconds("2h"), 7200);
            assert_eq!(seconds("7D"), 604800);
        }

        #[test]
        fn it_parses_months_and_years() {
            assert_eq!(seconds("2mo"), 2 * 31 * 86400);
            assert_eq!(seconds("y"), 365 * 86400);
        }

        #[test]
        fn it_defaults_to_a_multiplier_of_one() {
            assert_eq!(seconds("w"), 604800);
        }

        #[test]
        fn it_rejects_unknown_units() {
            let err = "5s".parse::<Frequency>().unwrap_err();
            assert_eq!(err, Error::InvalidFrequency("5s".to_string()));
        }

        #[test]
        fn it_rejects_bare_numbers() {
            assert!("10".parse::<Frequency>().is_err());
        }

        #[test]
        fn it_rejects_empty_strings() {
            assert!("".parse::<Frequency>().is_err());
        }

        #[test]
        fn it_rejects_zero_length_frequencies() {
            assert!("0d".parse::<Frequency>().is_err());
        }
    }

    mod chunks {
        use super::super::*;

        #[test]
        fn it_returns_a_single_chunk_without_a_frequency() {
            assert_eq!(chunk_timestamps(10, 20, None), vec![10, 20]);
        }

        #[test]
        fn it_splits_ranges_evenly() {
            let freq = "1h".parse().unwrap();
            assert_eq!(chunk_timestamps(0, 7200, Some(&freq)), vec![0, 3600, 7200]);
        }

        #[test]
        fn it_truncates_the_last_chunk() {
            let freq = "1h".parse().unwrap();
            assert_eq!(chunk_timestamps(0, 5000, Some(&freq)), vec![0, 3600, 5000]);
        }

        #[test]
        fn it_stops_at_the_end_of_huge_chunks() {
            let freq = "153722867280912900m".parse().unwrap();
            assert_eq!(
                chunk_timestamps(1546300800, 1546387200, Some(&freq)),
                vec![1546300800, 1546387200]
            );
        }

        #[test]
        fn it_returns_no_windows_for_empty_ranges() {
            let freq = "1h".parse().unwrap();
            assert_eq!(chunk_timestamps(100, 100, Some(&freq)), vec![100]);
        }
    }

    mod dates {
        use super::super::*;
        use pretty_assertions::assert_eq;

        fn date(s: &str) -> NaiveDate {
            s.parse().unwrap()
        }

        #[test]
        fn it_steps_through_dates() {
            let freq = "7d".parse().unwrap();
            let actual = date_range(date("2020-01-01"), date("2020-01-15"), &freq).unwrap();
            let expected = vec![date("2020-01-01"), date("2020-01-08"), date("2020-01-15")];
            assert_eq!(actual, expected);
        }

        #[test]
        fn it_appends_the_end_date() {
            let freq = "7d".parse().unwrap();
            let actual = date_range(date("2020-01-01"), date("2020-01-10"), &freq).unwrap();
            let expected = vec![date("2020-01-01"), date("2020-01-08"), date("2020-01-10")];
            assert_eq!(actual, expected);
        }

        #[test]
        fn it_returns_nothing_for_reversed_ranges() {
            let freq = "1d".parse().unwrap();
            let actual = date_range(date("2020-01-10"), date("2020-01-01"), &freq).unwrap();
            assert!(actual.is_empty());
        }

        #[test]
        fn it_handles_steps_past_the_calendar() {
            let freq = "1000000000y".parse().unwrap();
            let actual = date_range(date("2020-01-01"), date("2020-01-10"), &freq).unwrap();
            assert_eq!(actual, vec![date("2020-01-01"), date("2020-01-10")]);
        }

        #[test]
        fn it_adds_days() {
            assert_eq!(add_days(date("2019-01-01"), 7), Ok(date("2019-01-08")));
            assert_eq!(
                add_days(date("2019-01-01"), 1_000_000_000_000),
                Err(Error::DateOutOfRange(date("2019-01-01"), 1_000_000_000_000))
            );
        }

        #[test]
        fn it_rejects_sub_daily_frequencies() {
            let freq = "5h".parse().unwrap();
            let actual = date_range(date("2020-01-01"), date("2020-01-10"), &freq);
            assert!(matches!(actual, Err(Error::SubDailyFrequency(_))));
        }
    }
}
