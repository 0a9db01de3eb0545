use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single post on a user's timeline, independent of the protocol it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author: Author,
    /// Markdown body as extracted; link rewriting and stripping happen at render time
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Path relative to the web root, e.g. `/alice/status/123`
    pub permalink: String,
    pub conversation_id: String,
    pub stats: PostStats,
    pub is_pinned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repost_of: Option<RepostInfo>,
    /// Only set for original (non-repost) posts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_size_avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub username: String,
    pub display_name: String,
    pub uid: u64,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStats {
    pub reply_count: u64,
    pub repost_count: u64,
    pub like_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepostInfo {
    pub original_author: String,
    pub original_id: String,
    /// Handle of the account whose timeline carried the repost
    pub reposted_by: String,
}

impl Post {
    pub fn is_repost(&self) -> bool {
        self.repost_of.is_some()
    }

    /// Whether this post falls below the given age floor
    pub fn is_older_than(&self, floor: Option<DateTime<Utc>>) -> bool {
        floor.is_some_and(|floor| self.created_at < floor)
    }

    pub fn display_author(&self) -> &str {
        if self.author.display_name.is_empty() {
            &self.author.username
        } else {
            &self.author.display_name
        }
    }
}

/// Sort posts the way they are surfaced: pinned first, then newest first.
///
/// The sort is stable so posts sharing a timestamp keep upstream order.
pub fn order_posts(posts: &mut [Post]) {
    posts.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}
