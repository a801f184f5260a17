// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! Predicates for screening out authors and posts that carry no signal.

use crate::reddit::thing::Thing;

/// Placeholder Reddit uses for authors and text of deleted content.
pub const DELETED: &str = "[deleted]";

/// Placeholder Reddit uses for authors and text of removed content.
pub const REMOVED: &str = "[removed]";

/// Reddit's built-in moderation bot.
pub const AUTOMODERATOR: &str = "AutoModerator";

/// True if `author` is a placeholder for deleted or removed content.
pub fn is_deleted(author: &str) -> bool {
    author == DELETED || author == REMOVED
}

/// True if `author` is probably a bot, judging by its name.
pub fn is_probable_bot(author: &str) -> bool {
    author.to_lowercase().ends_with("bot")
}

/// True if `author` should be counted in a subreddit's user history.
pub fn is_countable_author(author: &str) -> bool {
    !is_deleted(author) && !is_probable_bot(author)
}

/// True if `author` is a real user whose history is worth collecting.
pub fn is_collectable_author(author: &str) -> bool {
    !is_deleted(author) && author != AUTOMODERATOR
}

/// True if `text` has actual content.
pub fn is_meaningful_text(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && text != DELETED && text != REMOVED
}

/// Screening for comments and submissions.
pub trait Screened: Thing {
    /// True if the thing was written by a real user.
    fn has_real_author(&self) -> bool {
        self.author().is_some_and(is_collectable_author)
    }

    /// True if the thing's text has actual content.
    ///
    /// Submissions that only have a title still count.
    fn is_meaningful(&self) -> bool {
        is_meaningful_text(&self.text())
    }
}

impl<T: Thing> Screened for T {}
