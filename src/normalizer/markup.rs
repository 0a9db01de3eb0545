use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{TimeZone, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use crate::domain::{Author, Post, PostStats, RepostInfo, UserProfile};
use crate::fetcher::{Endpoints, FetchRequest};
use crate::normalizer::markdown::to_markdown;
use crate::normalizer::{
    Extractor, NormalizeError, NormalizedPage, NormalizerStrategy, PageKind, PageLimit,
};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("Invalid selector")
}

static POST: LazyLock<Selector> = LazyLock::new(|| selector("div[data-tweet-id]"));
static PINNED: LazyLock<Selector> = LazyLock::new(|| selector(".context .pinned"));
static REPOST: LazyLock<Selector> = LazyLock::new(|| selector(".context .js-retweet-text"));
static TIMESTAMP: LazyLock<Selector> =
    LazyLock::new(|| selector(".tweet-timestamp span[data-time]"));
static CONTENT: LazyLock<Selector> = LazyLock::new(|| selector(".content"));
static AVATAR: LazyLock<Selector> = LazyLock::new(|| selector("img.avatar"));
static TEXT: LazyLock<Selector> = LazyLock::new(|| selector(".js-tweet-text-container"));
static STAT: LazyLock<Selector> = LazyLock::new(|| selector("[data-tweet-stat-count]"));
static PROFILE_AVATAR: LazyLock<Selector> = LazyLock::new(|| selector(".ProfileAvatar-image"));
static STREAM: LazyLock<Selector> = LazyLock::new(|| selector(".stream-container"));
static PROFILE_NAV: LazyLock<Selector> = LazyLock::new(|| selector(".ProfileNav[data-user-id]"));
static PROFILE_NAME: LazyLock<Selector> =
    LazyLock::new(|| selector(".ProfileHeaderCard-nameLink"));
static PROFILE_BIO: LazyLock<Selector> = LazyLock::new(|| selector(".ProfileHeaderCard-bio"));
static PROFILE_URL: LazyLock<Selector> =
    LazyLock::new(|| selector(".ProfileHeaderCard-urlText a"));

/// JSON wrapper around an HTML fragment, used by both continuation and update pages.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    items_html: String,
    #[serde(default)]
    min_position: Option<serde_json::Value>,
    #[serde(default)]
    has_more_items: Option<bool>,
    #[serde(default)]
    new_latent_count: Option<usize>,
}

/// Positions arrive as strings or bare numbers.
fn position(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_of(html: &Html, sel: &Selector) -> Option<String> {
    html.select(sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn attr<'a>(element: &ElementRef<'a>, name: &'static str) -> Result<&'a str, NormalizeError> {
    element
        .value()
        .attr(name)
        .ok_or(NormalizeError::MissingField(name))
}

/// Legacy protocol: HTML profile page, then JSON envelopes carrying `items_html`.
pub struct MarkupNormalizer {
    endpoints: Endpoints,
}

impl MarkupNormalizer {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }

    /// Post elements in document order, de-duplicated and cut to the budget.
    fn candidates<'a>(html: &'a Html, max_count: usize) -> Vec<ElementRef<'a>> {
        let mut seen = HashSet::new();
        html.select(&POST)
            .filter(|el| {
                el.value()
                    .attr("data-tweet-id")
                    .is_some_and(|id| seen.insert(id.to_string()))
            })
            .take(max_count)
            .collect()
    }

    fn extract(
        html: &Html,
        limit: PageLimit,
        full_size_avatar: Option<&str>,
    ) -> Extractor {
        let mut extractor = Extractor::new(limit);

        for element in Self::candidates(html, limit.max_count) {
            match Self::parse_post(element, full_size_avatar) {
                Ok(post) => {
                    if !extractor.offer(post) {
                        break;
                    }
                }
                Err(e) => {
                    let id = element.value().attr("data-tweet-id").unwrap_or_default();
                    tracing::warn!(id, error = %e, "Skipping malformed post element");
                }
            }
        }

        extractor
    }

    fn parse_post(element: ElementRef<'_>, full_size_avatar: Option<&str>) -> Result<Post, NormalizeError> {
        let id = attr(&element, "data-tweet-id")?.to_string();
        let username = attr(&element, "data-screen-name")?.to_string();
        let uid = attr(&element, "data-user-id")?
            .parse::<u64>()
            .map_err(|_| NormalizeError::MissingField("numeric data-user-id"))?;

        let epoch = element
            .select(&TIMESTAMP)
            .next()
            .and_then(|el| el.value().attr("data-time"))
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or(NormalizeError::MissingField("data-time"))?;
        let created_at = Utc
            .timestamp_opt(epoch, 0)
            .single()
            .ok_or(NormalizeError::MissingField("valid data-time"))?;

        let content = element
            .select(&CONTENT)
            .next()
            .ok_or(NormalizeError::MissingField("content"))?;

        let is_pinned = element.select(&PINNED).next().is_some();
        let is_repost = element.select(&REPOST).next().is_some();

        let avatar_url = content
            .select(&AVATAR)
            .next()
            .and_then(|el| el.value().attr("src"))
            .unwrap_or_default()
            .to_string();

        let body = content.select(&TEXT).next().map(to_markdown).unwrap_or_default();

        // Reply, repost, like
        let counts: Vec<u64> = content
            .select(&STAT)
            .filter_map(|el| el.value().attr("data-tweet-stat-count"))
            .filter_map(|c| c.parse().ok())
            .collect();
        let stats = PostStats {
            reply_count: counts.first().copied().unwrap_or(0),
            repost_count: counts.get(1).copied().unwrap_or(0),
            like_count: counts.get(2).copied().unwrap_or(0),
        };

        let repost_of = is_repost.then(|| RepostInfo {
            original_author: username.clone(),
            original_id: id.clone(),
            reposted_by: element
                .value()
                .attr("data-retweeter")
                .unwrap_or_default()
                .to_string(),
        });

        let value = element.value();
        Ok(Post {
            permalink: value
                .attr("data-permalink-path")
                .map(String::from)
                .unwrap_or_else(|| format!("/{}/status/{}", username, id)),
            conversation_id: value
                .attr("data-conversation-id")
                .map(String::from)
                .unwrap_or_else(|| id.clone()),
            author: Author {
                display_name: value.attr("data-name").unwrap_or_default().to_string(),
                username,
                uid,
                avatar_url,
            },
            id,
            body,
            created_at,
            stats,
            is_pinned,
            full_size_avatar: if is_repost {
                None
            } else {
                full_size_avatar.map(String::from)
            },
            repost_of,
        })
    }

    /// Copy account details and stream positions from a full profile page.
    fn read_profile(html: &Html, profile: &mut UserProfile) {
        if let Some(name) = text_of(html, &PROFILE_NAME) {
            profile.display_name = Some(name);
        }
        if let Some(bio) = text_of(html, &PROFILE_BIO) {
            profile.bio = Some(bio);
        }
        if let Some(link) = html.select(&PROFILE_URL).next() {
            profile.homepage = link
                .value()
                .attr("title")
                .map(String::from)
                .or_else(|| Some(link.text().collect::<String>().trim().to_string()));
        }
        if let Some(nav) = html.select(&PROFILE_NAV).next() {
            let uid = nav.value().attr("data-user-id").map(String::from);
            profile.id = uid.clone();
            profile.rest_id = uid;
        }
        if let Some(avatar) = html
            .select(&PROFILE_AVATAR)
            .next()
            .and_then(|el| el.value().attr("src"))
        {
            profile.full_size_avatar = Some(avatar.to_string());
        }

        let count = |item: &str| -> Option<u64> {
            let sel = Selector::parse(&format!(".ProfileNav-item--{} [data-count]", item)).ok()?;
            html.select(&sel)
                .next()
                .and_then(|el| el.value().attr("data-count"))
                .and_then(|c| c.parse().ok())
        };
        let counters = &mut profile.counters;
        counters.statuses = count("tweets").unwrap_or(counters.statuses);
        counters.friends = count("following").unwrap_or(counters.friends);
        counters.followers = count("followers").unwrap_or(counters.followers);
        counters.favourites = count("favorites").unwrap_or(counters.favourites);
        counters.listed = count("lists").unwrap_or(counters.listed);

        match html.select(&STREAM).next() {
            Some(stream) => {
                let value = stream.value();
                let position = |name| {
                    value
                        .attr(name)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                };
                profile.cursor.bottom = position("data-min-position");
                profile.cursor.top = position("data-max-position");
            }
            None => tracing::warn!(handle = %profile.handle, "Profile page has no post stream"),
        }
    }

    fn normalize_document(
        &self,
        payload: &[u8],
        limit: PageLimit,
        profile: &mut UserProfile,
    ) -> NormalizedPage {
        let html = Html::parse_document(&String::from_utf8_lossy(payload));
        Self::read_profile(&html, profile);

        let extractor = Self::extract(&html, limit, profile.full_size_avatar.as_deref());
        let page = extractor.finish(profile.cursor.bottom.clone());
        Self::record_pinned(&page, profile);
        page
    }

    fn normalize_envelope(
        &self,
        payload: &[u8],
        kind: PageKind,
        limit: PageLimit,
        profile: &mut UserProfile,
    ) -> Result<NormalizedPage, NormalizeError> {
        let envelope: Envelope = serde_json::from_slice(payload)?;
        let html = Html::parse_fragment(&envelope.items_html);
        let avatar = profile.full_size_avatar.clone();

        if kind == PageKind::Updates {
            let latent = envelope.new_latent_count.unwrap_or(usize::MAX);
            if latent == 0 {
                return Ok(NormalizedPage::default());
            }
            let limit = PageLimit::new(latent.min(limit.max_count), None);
            let page = Self::extract(&html, limit, avatar.as_deref()).finish(None);
            if let Some(newest) = page.posts.iter().max_by(|a, b| {
                a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
            }) {
                profile.cursor.top = Some(newest.id.clone());
            }
            return Ok(page);
        }

        let min_position = position(envelope.min_position.as_ref());
        if min_position.is_some() {
            profile.cursor.bottom = min_position.clone();
        }
        let cursor = match envelope.has_more_items {
            Some(false) => None,
            _ => min_position,
        };

        let page = Self::extract(&html, limit, avatar.as_deref()).finish(cursor);
        Self::record_pinned(&page, profile);
        Ok(page)
    }

    fn record_pinned(page: &NormalizedPage, profile: &mut UserProfile) {
        for post in page.posts.iter().filter(|p| p.is_pinned) {
            profile.add_pinned(&post.id);
        }
    }
}

impl NormalizerStrategy for MarkupNormalizer {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn requires_identity(&self) -> bool {
        false
    }

    fn first_page(&self, profile: &UserProfile, _count: usize) -> Result<FetchRequest, NormalizeError> {
        Ok(FetchRequest::get(self.endpoints.profile_page(&profile.handle)))
    }

    fn next_page(
        &self,
        profile: &UserProfile,
        cursor: &str,
        _count: usize,
    ) -> Result<FetchRequest, NormalizeError> {
        Ok(FetchRequest::get(
            self.endpoints.timeline_page(&profile.handle, cursor),
        ))
    }

    fn updates(&self, profile: &UserProfile, watermark: &str) -> Result<FetchRequest, NormalizeError> {
        Ok(FetchRequest::get(
            self.endpoints.timeline_updates(&profile.handle, watermark),
        ))
    }

    fn normalize(
        &self,
        payload: &[u8],
        kind: PageKind,
        limit: PageLimit,
        profile: &mut UserProfile,
    ) -> Result<NormalizedPage, NormalizeError> {
        match kind {
            PageKind::First => Ok(self.normalize_document(payload, limit, profile)),
            PageKind::Next | PageKind::Updates => {
                self.normalize_envelope(payload, kind, limit, profile)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::fixtures::*;
    use super::*;
    use crate::config::UpstreamConfig;

    fn normalizer() -> MarkupNormalizer {
        MarkupNormalizer::new(Endpoints::new(&UpstreamConfig::default()).unwrap())
    }

    fn ids(page: &NormalizedPage) -> Vec<&str> {
        page.posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_first_page_maps_posts_and_profile() {
        let html = profile_page(
            "alice",
            42,
            &[post_html("30", "alice", 42, 3000, false), post_html("20", "alice", 42, 2000, false)],
            "20",
            "30",
        );
        let mut profile = UserProfile::new("alice");

        let page = normalizer()
            .normalize(html.as_bytes(), PageKind::First, PageLimit::new(10, None), &mut profile)
            .unwrap();

        assert_eq!(ids(&page), vec!["30", "20"]);
        assert_eq!(page.cursor.as_deref(), Some("20"));
        assert!(!page.age_floor_reached);

        let post = &page.posts[0];
        assert_eq!(post.author.username, "alice");
        assert_eq!(post.author.display_name, "alice name");
        assert_eq!(post.author.uid, 42);
        assert_eq!(post.author.avatar_url, "https://pbs/alice_normal.jpg");
        assert_eq!(post.created_at, Utc.timestamp_opt(3000, 0).unwrap());
        assert_eq!(post.permalink, "/alice/status/30");
        assert_eq!(post.conversation_id, "30");
        assert_eq!(post.body, "post 30 by [~~@~~**friend**](/friend)");
        assert_eq!(
            post.stats,
            PostStats {
                reply_count: 1,
                repost_count: 2,
                like_count: 3
            }
        );
        assert_eq!(
            post.full_size_avatar.as_deref(),
            Some("https://pbs/alice_400x400.jpg")
        );

        assert_eq!(profile.rest_id.as_deref(), Some("42"));
        assert_eq!(profile.display_name.as_deref(), Some("alice name"));
        assert_eq!(profile.bio.as_deref(), Some("Bio of alice"));
        assert_eq!(profile.counters.statuses, 120);
        assert_eq!(profile.counters.followers, 45);
        assert_eq!(profile.cursor.top.as_deref(), Some("30"));
        assert_eq!(profile.cursor.bottom.as_deref(), Some("20"));
    }

    #[test]
    fn test_first_page_truncates_with_pinned_first() {
        let html = profile_page(
            "alice",
            42,
            &[
                post_html("5", "alice", 42, 500, true),
                post_html("30", "alice", 42, 3000, false),
                post_html("20", "alice", 42, 2000, false),
            ],
            "20",
            "30",
        );
        let mut profile = UserProfile::new("alice");

        let page = normalizer()
            .normalize(html.as_bytes(), PageKind::First, PageLimit::new(2, None), &mut profile)
            .unwrap();

        assert_eq!(ids(&page), vec!["5", "30"]);
        assert!(page.posts[0].is_pinned);
        assert_eq!(profile.pinned_post_ids, vec!["5"]);
    }

    #[test]
    fn test_age_floor_halts_extraction() {
        let html = profile_page(
            "alice",
            42,
            &[
                post_html("30", "alice", 42, 3000, false),
                post_html("20", "alice", 42, 2000, false),
                post_html("10", "alice", 42, 1000, false),
            ],
            "10",
            "30",
        );
        let mut profile = UserProfile::new("alice");
        let floor = Some(Utc.timestamp_opt(2500, 0).unwrap());

        let page = normalizer()
            .normalize(html.as_bytes(), PageKind::First, PageLimit::new(10, floor), &mut profile)
            .unwrap();

        assert_eq!(ids(&page), vec!["30"]);
        assert!(page.age_floor_reached);
    }

    #[test]
    fn test_old_pinned_post_survives_age_floor() {
        let html = profile_page(
            "alice",
            42,
            &[post_html("5", "alice", 42, 500, true), post_html("30", "alice", 42, 3000, false)],
            "30",
            "30",
        );
        let mut profile = UserProfile::new("alice");
        let floor = Some(Utc.timestamp_opt(2500, 0).unwrap());

        let page = normalizer()
            .normalize(html.as_bytes(), PageKind::First, PageLimit::new(10, floor), &mut profile)
            .unwrap();

        assert_eq!(ids(&page), vec!["5"]);
        assert!(page.posts[0].is_pinned);
        assert!(page.age_floor_reached);
    }

    #[test]
    fn test_repost_has_no_full_size_avatar() {
        let html = profile_page("alice", 42, &[repost_html("40", "carol", "alice", 4000)], "40", "40");
        let mut profile = UserProfile::new("alice");

        let page = normalizer()
            .normalize(html.as_bytes(), PageKind::First, PageLimit::new(10, None), &mut profile)
            .unwrap();

        let post = &page.posts[0];
        assert!(post.is_repost());
        assert_eq!(post.full_size_avatar, None);
        assert_eq!(
            post.repost_of,
            Some(RepostInfo {
                original_author: "carol".into(),
                original_id: "40".into(),
                reposted_by: "alice".into(),
            })
        );
        assert_eq!(post.permalink, "/carol/status/40");
        assert_eq!(post.stats, PostStats::default());
    }

    #[test]
    fn test_malformed_post_is_skipped() {
        let broken = r#"<div data-tweet-id="99" data-screen-name="alice" data-user-id="42"></div>"#;
        let html = profile_page(
            "alice",
            42,
            &[broken.to_string(), post_html("30", "alice", 42, 3000, false)],
            "30",
            "30",
        );
        let mut profile = UserProfile::new("alice");

        let page = normalizer()
            .normalize(html.as_bytes(), PageKind::First, PageLimit::new(10, None), &mut profile)
            .unwrap();

        assert_eq!(ids(&page), vec!["30"]);
    }

    #[test]
    fn test_next_page_envelope() {
        let body = envelope(&[post_html("10", "alice", 42, 1000, false)], Some("10"), true, 0);
        let mut profile = UserProfile::new("alice");
        profile.full_size_avatar = Some("https://pbs/full.jpg".into());

        let page = normalizer()
            .normalize(body.as_bytes(), PageKind::Next, PageLimit::new(5, None), &mut profile)
            .unwrap();

        assert_eq!(ids(&page), vec!["10"]);
        assert_eq!(page.cursor.as_deref(), Some("10"));
        assert_eq!(profile.cursor.bottom.as_deref(), Some("10"));
        assert_eq!(
            page.posts[0].full_size_avatar.as_deref(),
            Some("https://pbs/full.jpg")
        );
    }

    #[test]
    fn test_next_page_without_more_items_has_no_cursor() {
        let body = envelope(&[post_html("10", "alice", 42, 1000, false)], Some("10"), false, 0);
        let mut profile = UserProfile::new("alice");

        let page = normalizer()
            .normalize(body.as_bytes(), PageKind::Next, PageLimit::new(5, None), &mut profile)
            .unwrap();

        assert_eq!(page.cursor, None);
    }

    #[test]
    fn test_numeric_min_position() {
        let body = r#"{"items_html":"","min_position":12345,"has_more_items":true}"#;
        let mut profile = UserProfile::new("alice");

        let page = normalizer()
            .normalize(body.as_bytes(), PageKind::Next, PageLimit::new(5, None), &mut profile)
            .unwrap();

        assert_eq!(page.cursor.as_deref(), Some("12345"));
        assert_eq!(page.extracted(), 0);
    }

    #[test]
    fn test_updates_without_new_items() {
        let body = envelope(&[post_html("50", "alice", 42, 5000, false)], None, false, 0);
        let mut profile = UserProfile::new("alice");
        profile.cursor.top = Some("30".into());

        let page = normalizer()
            .normalize(body.as_bytes(), PageKind::Updates, PageLimit::unbounded(), &mut profile)
            .unwrap();

        assert_eq!(page.extracted(), 0);
        assert_eq!(profile.cursor.top.as_deref(), Some("30"));
    }

    #[test]
    fn test_updates_moves_watermark_to_newest() {
        let body = envelope(
            &[
                post_html("50", "alice", 42, 5000, false),
                post_html("40", "alice", 42, 4000, false),
                post_html("35", "alice", 42, 3500, false),
            ],
            None,
            false,
            2,
        );
        let mut profile = UserProfile::new("alice");
        profile.cursor.top = Some("30".into());

        let page = normalizer()
            .normalize(body.as_bytes(), PageKind::Updates, PageLimit::unbounded(), &mut profile)
            .unwrap();

        assert_eq!(ids(&page), vec!["50", "40"]);
        assert_eq!(profile.cursor.top.as_deref(), Some("50"));
    }

    #[test]
    fn test_invalid_envelope() {
        let mut profile = UserProfile::new("alice");
        let result = normalizer().normalize(
            b"<html>",
            PageKind::Next,
            PageLimit::new(5, None),
            &mut profile,
        );
        assert!(matches!(result, Err(NormalizeError::InvalidJson(_))));
    }

    #[test]
    fn test_requests() {
        let n = normalizer();
        let profile = UserProfile::new("alice");
        assert_eq!(n.first_page(&profile, 5).unwrap().url, "https://twitter.com/alice");
        assert!(n.next_page(&profile, "10", 5).unwrap().url.contains("max_position=10"));
        assert!(n.updates(&profile, "30").unwrap().url.contains("min_position=30"));
        assert!(!n.requires_identity());
    }
}
