use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::Credentials;
use crate::domain::{Author, Post, PostStats, RepostInfo, UserProfile};
use crate::fetcher::{Endpoints, FetchRequest};
use crate::normalizer::{
    Extractor, NormalizeError, NormalizedPage, NormalizerStrategy, PageKind, PageLimit,
};

const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Page size asked of the timeline endpoint when updating.
const UPDATE_PAGE_SIZE: usize = 40;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TimelineDocument {
    #[serde(rename = "globalObjects")]
    global_objects: GlobalObjects,
    timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GlobalObjects {
    tweets: HashMap<String, RawTweet>,
    users: HashMap<String, RawUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Timeline {
    instructions: Vec<Instruction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Instruction {
    #[serde(rename = "addEntries")]
    add_entries: Option<AddEntries>,
    #[serde(rename = "pinEntry")]
    pin_entry: Option<PinEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddEntries {
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct PinEntry {
    entry: Entry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Entry {
    #[serde(rename = "entryId")]
    entry_id: String,
    content: EntryContent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EntryContent {
    item: Option<ItemContent>,
    operation: Option<Operation>,
}

#[derive(Debug, Deserialize)]
struct ItemContent {
    content: ItemInner,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ItemInner {
    tweet: Option<TweetRef>,
}

#[derive(Debug, Deserialize)]
struct TweetRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Operation {
    cursor: CursorMarker,
}

#[derive(Debug, Deserialize)]
struct CursorMarker {
    value: String,
    #[serde(rename = "cursorType")]
    cursor_type: String,
}

#[derive(Debug, Deserialize)]
struct RawTweet {
    id_str: String,
    created_at: String,
    #[serde(default)]
    full_text: Option<String>,
    #[serde(default)]
    text: Option<String>,
    user_id_str: String,
    #[serde(default)]
    conversation_id_str: Option<String>,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    favorite_count: u64,
    #[serde(default)]
    retweeted_status_id_str: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id_str: String,
    screen_name: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    profile_image_url_https: Option<String>,
}

/// One timeline entry, reduced to what the walk needs.
enum EntryKind<'a> {
    Post { id: &'a str, pinned: bool },
    Cursor { top: bool, value: &'a str },
    Other,
}

impl Entry {
    fn kind(&self, pinned: bool) -> EntryKind<'_> {
        if let Some(op) = &self.content.operation {
            return EntryKind::Cursor {
                top: op.cursor.cursor_type.eq_ignore_ascii_case("top"),
                value: &op.cursor.value,
            };
        }
        match self.content.item.as_ref().and_then(|i| i.content.tweet.as_ref()) {
            Some(tweet) => EntryKind::Post {
                id: &tweet.id,
                pinned,
            },
            None => EntryKind::Other,
        }
    }
}

/// Avatar URLs are served in several sizes; dropping the suffix gives the original.
pub(crate) fn full_size(url: &str) -> String {
    url.replace("_normal.", ".")
}

/// Structured protocol: guest-authenticated JSON timeline.
pub struct TimelineNormalizer {
    endpoints: Endpoints,
    credentials: Credentials,
}

impl TimelineNormalizer {
    pub fn new(endpoints: Endpoints, credentials: Credentials) -> Self {
        Self {
            endpoints,
            credentials,
        }
    }

    fn timeline_request(
        &self,
        profile: &UserProfile,
        count: usize,
        cursor: Option<&str>,
    ) -> Result<FetchRequest, NormalizeError> {
        let rest_id = profile
            .rest_id
            .as_deref()
            .ok_or(NormalizeError::MissingRestId)?;
        let url = self.endpoints.user_timeline(rest_id, count, cursor);
        Ok(self.credentials.authorize(FetchRequest::get(url)))
    }

    fn build_post(
        doc: &TimelineDocument,
        id: &str,
        pinned: bool,
    ) -> Option<Post> {
        let Some(tweet) = doc.global_objects.tweets.get(id) else {
            tracing::warn!(id, "Timeline references a post missing from the post map");
            return None;
        };
        let Some(user) = doc.global_objects.users.get(&tweet.user_id_str) else {
            tracing::warn!(id, user = %tweet.user_id_str, "Post author missing from the user map");
            return None;
        };

        // Reposts surface the original post, tagged with who shared it
        let (source, author, repost_of) = match tweet.retweeted_status_id_str.as_deref() {
            Some(original_id) => {
                let original = doc.global_objects.tweets.get(original_id);
                let original_user = original.and_then(|t| doc.global_objects.users.get(&t.user_id_str));
                match (original, original_user) {
                    (Some(original), Some(original_user)) => (
                        original,
                        original_user,
                        Some(RepostInfo {
                            original_author: original_user.screen_name.clone(),
                            original_id: original.id_str.clone(),
                            reposted_by: user.screen_name.clone(),
                        }),
                    ),
                    _ => {
                        tracing::warn!(id, original_id, "Reposted original missing, keeping the repost itself");
                        (
                            tweet,
                            user,
                            Some(RepostInfo {
                                original_author: String::new(),
                                original_id: original_id.to_string(),
                                reposted_by: user.screen_name.clone(),
                            }),
                        )
                    }
                }
            }
            None => (tweet, user, None),
        };

        let created_at = match DateTime::parse_from_str(&source.created_at, CREATED_AT_FORMAT) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(id, created_at = %source.created_at, error = %e, "Unparseable post timestamp");
                return None;
            }
        };

        let uid = match author.id_str.parse::<u64>() {
            Ok(uid) => uid,
            Err(_) => {
                tracing::warn!(id, user = %author.id_str, "Non-numeric author id");
                return None;
            }
        };

        let text = source
            .full_text
            .as_deref()
            .or(source.text.as_deref())
            .unwrap_or_default();
        let avatar_url = author.profile_image_url_https.clone().unwrap_or_default();

        Some(Post {
            id: source.id_str.clone(),
            author: Author {
                username: author.screen_name.clone(),
                display_name: author.name.clone(),
                uid,
                avatar_url: avatar_url.clone(),
            },
            body: html_escape::decode_html_entities(text).to_string(),
            created_at,
            permalink: format!("/{}/status/{}", author.screen_name, source.id_str),
            conversation_id: source
                .conversation_id_str
                .clone()
                .unwrap_or_else(|| source.id_str.clone()),
            stats: PostStats {
                reply_count: source.reply_count,
                repost_count: source.retweet_count,
                like_count: source.favorite_count,
            },
            is_pinned: pinned,
            full_size_avatar: if repost_of.is_none() && !avatar_url.is_empty() {
                Some(full_size(&avatar_url))
            } else {
                None
            },
            repost_of,
        })
    }
}

impl NormalizerStrategy for TimelineNormalizer {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn requires_identity(&self) -> bool {
        true
    }

    fn first_page(&self, profile: &UserProfile, count: usize) -> Result<FetchRequest, NormalizeError> {
        self.timeline_request(profile, count, None)
    }

    fn next_page(
        &self,
        profile: &UserProfile,
        cursor: &str,
        count: usize,
    ) -> Result<FetchRequest, NormalizeError> {
        self.timeline_request(profile, count, Some(cursor))
    }

    fn updates(&self, profile: &UserProfile, watermark: &str) -> Result<FetchRequest, NormalizeError> {
        self.timeline_request(profile, UPDATE_PAGE_SIZE, Some(watermark))
    }

    fn normalize(
        &self,
        payload: &[u8],
        kind: PageKind,
        limit: PageLimit,
        profile: &mut UserProfile,
    ) -> Result<NormalizedPage, NormalizeError> {
        let doc: TimelineDocument = serde_json::from_slice(payload)?;

        // Pin entries surface first, then the regular entries in document order
        let pinned = doc
            .timeline
            .instructions
            .iter()
            .filter_map(|i| i.pin_entry.as_ref())
            .map(|p| p.entry.kind(true));
        let regular = doc
            .timeline
            .instructions
            .iter()
            .filter_map(|i| i.add_entries.as_ref())
            .flat_map(|a| a.entries.iter())
            .map(|e| e.kind(false));

        let mut extractor = Extractor::new(limit);
        let mut top = None;
        let mut bottom = None;
        let mut stopped = false;

        for entry in pinned.chain(regular) {
            match entry {
                EntryKind::Cursor { top: true, value } => top = Some(value.to_string()),
                EntryKind::Cursor { top: false, value } => bottom = Some(value.to_string()),
                EntryKind::Post { id, pinned } if !stopped => {
                    let pinned = pinned || profile.pinned_post_ids.iter().any(|p| p == id);
                    if let Some(post) = Self::build_post(&doc, id, pinned) {
                        stopped = !extractor.offer(post);
                    }
                }
                EntryKind::Post { .. } | EntryKind::Other => {}
            }
        }

        let page = extractor.finish(if kind == PageKind::Updates {
            None
        } else {
            bottom.clone()
        });

        for post in page.posts.iter().filter(|p| p.is_pinned) {
            profile.add_pinned(&post.id);
        }
        if bottom.is_some() && kind != PageKind::Updates {
            profile.cursor.bottom = bottom;
        }
        match kind {
            PageKind::First => {
                if top.is_some() {
                    profile.cursor.top = top;
                }
            }
            PageKind::Next => {
                if profile.cursor.top.is_none() {
                    profile.cursor.top = top;
                }
            }
            PageKind::Updates => {
                if !page.posts.is_empty() && top.is_some() {
                    profile.cursor.top = top;
                }
            }
        }

        tracing::debug!(
            entries = doc.global_objects.tweets.len(),
            extracted = page.extracted(),
            "Normalized timeline page"
        );
        Ok(page)
    }
}
