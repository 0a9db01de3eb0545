use serde::{Deserialize, Serialize};

/// A resolved account. One authoritative copy is owned by whoever is walking
/// or watching the timeline; the cursor is advanced in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub handle: String,
    /// Public, possibly opaque, identifier
    pub id: Option<String>,
    /// Numeric identifier the timeline API expects
    pub rest_id: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub full_size_avatar: Option<String>,
    pub homepage: Option<String>,
    pub counters: ProfileCounters,
    pub pinned_post_ids: Vec<String>,
    pub cursor: TimelineCursor,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCounters {
    pub followers: u64,
    pub friends: u64,
    pub statuses: u64,
    pub favourites: u64,
    pub listed: u64,
    pub media: u64,
}

/// Watermark pair delimiting the newest (`top`) and oldest (`bottom`) fetched position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineCursor {
    pub top: Option<String>,
    pub bottom: Option<String>,
}

impl UserProfile {
    pub fn new(handle: &str) -> Self {
        Self {
            handle: Self::normalize_handle(handle),
            ..Default::default()
        }
    }

    /// Cache key for a handle: no leading `@`, ASCII lowercase.
    pub fn normalize_handle(handle: &str) -> String {
        handle.trim().trim_start_matches('@').to_ascii_lowercase()
    }

    pub fn display_title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.handle)
    }

    /// Numeric user id, when known
    pub fn uid(&self) -> Option<u64> {
        self.rest_id.as_deref().and_then(|id| id.parse().ok())
    }

    /// Record a pinned post id, keeping insertion order and uniqueness
    pub fn add_pinned(&mut self, id: &str) {
        if !self.pinned_post_ids.iter().any(|p| p == id) {
            self.pinned_post_ids.push(id.to_string());
        }
    }
}
