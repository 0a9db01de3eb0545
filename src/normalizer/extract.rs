use std::collections::HashSet;

use crate::domain::Post;
use crate::normalizer::{NormalizedPage, PageLimit};

/// Applies the per-page extraction rule shared by both grammars.
///
/// Posts are offered in document order. Duplicates are ignored, the budget
/// caps the output, and the first post older than the age floor stops
/// extraction. A pinned post below the floor is still kept before stopping.
pub(crate) struct Extractor {
    limit: PageLimit,
    posts: Vec<Post>,
    seen: HashSet<String>,
    age_floor_reached: bool,
}

impl Extractor {
    pub fn new(limit: PageLimit) -> Self {
        Self {
            limit,
            posts: Vec::new(),
            seen: HashSet::new(),
            age_floor_reached: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.age_floor_reached || self.posts.len() >= self.limit.max_count
    }

    /// Offer the next post. Returns `false` once extraction must stop.
    pub fn offer(&mut self, post: Post) -> bool {
        if self.is_done() {
            return false;
        }
        if !self.seen.insert(post.id.clone()) {
            return true;
        }

        if post.is_older_than(self.limit.age_floor) {
            tracing::debug!(id = %post.id, pinned = post.is_pinned, "Age floor reached");
            self.age_floor_reached = true;
            if post.is_pinned {
                self.posts.push(post);
            }
            return false;
        }

        tracing::debug!(id = %post.id, "Retrieved post");
        self.posts.push(post);
        !self.is_done()
    }

    pub fn finish(self, cursor: Option<String>) -> NormalizedPage {
        NormalizedPage {
            posts: self.posts,
            cursor,
            age_floor_reached: self.age_floor_reached,
        }
    }
}
