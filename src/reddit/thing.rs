// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! A "thing" in the Reddit sense.
//!
//! Historically in the Reddit API and its old source code, a "Thing" was
//! any element of the Reddit system: users, posts, comments, etc. This
//! module provides typed records for comments, submissions and subreddits,
//! along with parsers for the two JSON shapes we receive: Pushshift search
//! results (`{"data": [...]}`) and official API listings
//! (`{"kind": "Listing", "data": {"children": [...]}}`).
//!
//! Every field is optional. Pushshift omits fields it did not index (or
//! that were excluded with a `filter` parameter), and the official API
//! nulls out fields of deleted content.

use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// The types of things that can be searched for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum Kind {
    /// A comment on a submission.
    Comment,

    /// An article or self post.
    Submission,
}

impl Kind {
    /// Name of the Pushshift search endpoint for this kind of thing.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Kind::Comment => "comment",
            Kind::Submission => "submission",
        }
    }

    /// Prefix used by Reddit to build "fullnames" for this kind of thing.
    pub fn prefix(&self) -> &'static str {
        match self {
            Kind::Comment => "t1",
            Kind::Submission => "t3",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Behavior common to comments and submissions.
pub trait Thing: DeserializeOwned + Serialize + Clone + fmt::Debug + Send + Sync {
    /// The kind of thing this is.
    const KIND: Kind;

    /// Base-36 ID of the thing, without its kind prefix.
    fn id(&self) -> Option<&str>;

    /// Username of the thing's author.
    fn author(&self) -> Option<&str>;

    /// Subreddit the thing was posted in.
    fn subreddit(&self) -> Option<&str>;

    /// When the thing was posted, as a UTC epoch.
    fn created_utc(&self) -> Option<i64>;

    /// The thing's human-written text.
    fn text(&self) -> String;

    /// The thing's ID including its kind prefix, e.g., `t3_6v7yvh`.
    fn fullname(&self) -> Option<String> {
        self.id().map(|id| format!("{}_{id}", Self::KIND.prefix()))
    }
}

/// Sorts things from oldest to newest.
///
/// The sort is stable, and things without a creation date sort first.
pub fn sort_by_created<T: Thing>(things: &mut [T]) {
    things.sort_by_key(|thing| thing.created_utc());
}

/// A Reddit post (an article or a self post).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub archived: Option<bool>,
    pub author: Option<String>,
    pub author_flair_text: Option<String>,
    pub author_flair_type: Option<String>,
    pub author_fullname: Option<String>,
    pub category: Option<Value>,
    pub comment_limit: Option<Value>,
    pub content_categories: Option<Value>,
    #[serde(default, deserialize_with = "deserialize_epoch")]
    pub created_utc: Option<i64>,
    pub crosspost_parent: Option<String>,
    pub domain: Option<String>,
    pub discussion_type: Option<String>,
    pub distinguished: Option<String>,
    pub downs: Option<i64>,
    pub full_link: Option<String>,
    pub gilded: Option<i64>,
    pub id: Option<String>,
    pub is_meta: Option<bool>,
    pub is_original_content: Option<bool>,
    pub is_reddit_media_domain: Option<bool>,
    pub is_self: Option<bool>,
    pub is_video: Option<bool>,
    pub link_flair_text: Option<String>,
    pub link_flair_type: Option<String>,
    pub locked: Option<bool>,
    pub media: Option<Value>,
    pub num_comments: Option<i64>,
    pub num_crossposts: Option<i64>,
    pub num_duplicates: Option<i64>,
    pub num_reports: Option<i64>,
    pub over_18: Option<bool>,
    pub permalink: Option<String>,
    pub score: Option<i64>,
    pub selftext: Option<String>,
    pub subreddit: Option<String>,
    pub subreddit_id: Option<String>,
    pub thumbnail: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub ups: Option<i64>,
    pub upvote_ratio: Option<f64>,
}

impl Thing for Submission {
    const KIND: Kind = Kind::Submission;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    fn subreddit(&self) -> Option<&str> {
        self.subreddit.as_deref()
    }

    fn created_utc(&self) -> Option<i64> {
        self.created_utc
    }

    /// The title and self text, separated by a space.
    fn text(&self) -> String {
        let title = self.title.as_deref().unwrap_or_default();
        let selftext = self.selftext.as_deref().unwrap_or_default();
        format!("{title} {selftext}")
    }
}

/// A Reddit comment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: Option<String>,
    pub author_flair_text: Option<String>,
    pub author_flair_type: Option<String>,
    pub author_fullname: Option<String>,
    pub body: Option<String>,
    pub collapsed: Option<bool>,
    pub collapsed_reason: Option<String>,
    pub controversiality: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_epoch")]
    pub created_utc: Option<i64>,
    pub downs: Option<i64>,
    /// `false`, or the epoch at which the comment was last edited.
    pub edited: Option<Value>,
    pub gildings: Option<Value>,
    pub id: Option<String>,
    pub is_submitter: Option<bool>,
    /// Fullname of the submission the comment belongs to.
    pub link_id: Option<String>,
    pub locked: Option<bool>,
    /// Fullname of the comment or submission being replied to.
    pub parent_id: Option<String>,
    pub permalink: Option<String>,
    pub stickied: Option<bool>,
    pub subreddit: Option<String>,
    pub subreddit_id: Option<String>,
    pub score: Option<i64>,
    pub score_hidden: Option<bool>,
    pub total_awards_received: Option<i64>,
    pub ups: Option<i64>,
}

impl Comment {
    /// True if the comment belongs to the submission with the given ID.
    ///
    /// Pushshift has historically returned `link_id` both with and without
    /// its `t3_` prefix, so both forms are accepted.
    pub fn belongs_to(&self, submission_id: &str) -> bool {
        match self.link_id.as_deref() {
            Some(link_id) => link_id.strip_prefix("t3_").unwrap_or(link_id) == submission_id,
            None => false,
        }
    }
}

impl Thing for Comment {
    const KIND: Kind = Kind::Comment;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    fn subreddit(&self) -> Option<&str> {
        self.subreddit.as_deref()
    }

    fn created_utc(&self) -> Option<i64> {
        self.created_utc
    }

    fn text(&self) -> String {
        self.body.clone().unwrap_or_default()
    }
}

/// Descriptive information about a subreddit, as reported by the
/// official Reddit API.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubredditMetadata {
    pub display_name: Option<String>,
    pub restrict_posting: Option<bool>,
    pub wiki_enabled: Option<bool>,
    pub title: Option<String>,
    pub primary_color: Option<String>,
    pub active_user_count: Option<i64>,
    pub display_name_prefixed: Option<String>,
    pub accounts_active: Option<i64>,
    pub public_traffic: Option<bool>,
    pub subscribers: Option<i64>,
    pub name: Option<String>,
    pub quarantine: Option<bool>,
    pub hide_ads: Option<bool>,
    pub emojis_enabled: Option<bool>,
    pub advertiser_category: Option<String>,
    pub public_description: Option<String>,
    pub spoilers_enabled: Option<bool>,
    pub all_original_content: Option<bool>,
    pub key_color: Option<String>,
    pub created: Option<f64>,
    pub submission_type: Option<String>,
    pub allow_videogifs: Option<bool>,
    pub allow_polls: Option<bool>,
    pub collapse_deleted_comments: Option<bool>,
    pub allow_discovery: Option<bool>,
    pub link_flair_enabled: Option<bool>,
    pub subreddit_type: Option<String>,
    pub suggested_comment_sort: Option<String>,
    pub id: Option<String>,
    pub over18: Option<bool>,
    pub description: Option<String>,
    pub restrict_commenting: Option<bool>,
    pub allow_images: Option<bool>,
    pub lang: Option<String>,
    pub whitelist_status: Option<String>,
    pub url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_epoch")]
    pub created_utc: Option<i64>,
}

impl SubredditMetadata {
    /// Parses the response of `/r/<subreddit>/about`.
    pub fn parse(data: &str) -> Result<Self, Error> {
        #[derive(Deserialize)]
        struct About {
            data: SubredditMetadata,
        }

        let about: About = serde_json::from_str(data)?;
        Ok(about.data)
    }
}

/// Parses a Pushshift search response into a list of things.
pub fn parse_archive<T: DeserializeOwned>(data: &str) -> Result<Vec<T>, Error> {
    #[derive(Deserialize)]
    struct SearchResponse<T> {
        data: Vec<T>,
    }

    let resp: SearchResponse<T> = serde_json::from_str(data)?;
    Ok(resp.data)
}

/// Parses an official API listing into a list of things.
///
/// Only children of the thing's own kind are returned.
pub fn parse_listing<T: Thing>(data: &str) -> Result<Vec<T>, Error> {
    let listing: Value = serde_json::from_str(data)?;
    let mut things = vec![];
    for (kind, data) in children(&listing) {
        if kind == T::KIND.prefix() {
            things.push(serde_json::from_value(data.clone())?);
        }
    }
    Ok(things)
}

/// Parses the response of `/comments/<id>` into a flat list of comments.
///
/// The response is a pair of listings: the submission itself, followed by
/// its comment forest. The forest is walked depth-first so that every
/// comment precedes its replies. "Load more comments" stubs are dropped.
pub fn parse_comment_tree(data: &str) -> Result<Vec<Comment>, Error> {
    let resp: Value = serde_json::from_str(data)?;
    let forest = match &resp {
        Value::Array(listings) => listings.get(1),
        listing => Some(listing),
    };

    let mut comments = vec![];
    if let Some(forest) = forest {
        flatten_comments(forest, &mut comments)?;
    }
    Ok(comments)
}

fn flatten_comments(listing: &Value, comments: &mut Vec<Comment>) -> Result<(), Error> {
    for (kind, data) in children(listing) {
        if kind != Kind::Comment.prefix() {
            continue;
        }
        comments.push(serde_json::from_value(data.clone())?);
        // Replies are an empty string when there are none.
        if let Some(replies) = data.get("replies") {
            flatten_comments(replies, comments)?;
        }
    }
    Ok(())
}

fn children(listing: &Value) -> impl Iterator<Item = (&str, &Value)> {
    listing
        .pointer("/data/children")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|child| {
            let kind = child.get("kind")?.as_str()?;
            let data = child.get("data")?;
            Some((kind, data))
        })
}

/// Extracts a bare submission ID from an ID, a `t3_` fullname, or a
/// permalink.
///
/// # Examples
///
/// ```
/// use retriever::reddit::thing::submission_id;
/// let url = "https://www.reddit.com/r/modeltrains/comments/6v7yvh/layout_update/";
/// assert_eq!(submission_id(url).unwrap(), "6v7yvh");
/// assert_eq!(submission_id("t3_6v7yvh").unwrap(), "6v7yvh");
/// assert_eq!(submission_id("6v7yvh").unwrap(), "6v7yvh");
/// ```
pub fn submission_id(reference: &str) -> Result<String, Error> {
    let reference = reference.trim();
    let id = if reference.contains("https") || reference.contains("reddit") {
        reference
            .split("comments/")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .ok_or_else(|| Error::InvalidSubmission(reference.to_string()))?
    } else {
        reference
    };

    let id = id.strip_prefix("t3_").unwrap_or(id);
    if id.is_empty() {
        Err(Error::InvalidSubmission(reference.to_string()))
    } else {
        Ok(id.to_string())
    }
}

// The official API reports timestamps as floats; Pushshift uses integers.
fn deserialize_epoch<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(number.and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))))
}

/// An error parsing data.
#[derive(Debug, Error)]
pub enum Error {
    /// Data was not valid JSON, or did not have the expected shape.
    #[error("Could not parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A string could not be interpreted as a reference to a submission.
    #[error("Not a submission ID, fullname or permalink: {0}")]
    InvalidSubmission(String),
}
