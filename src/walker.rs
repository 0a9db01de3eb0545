//! Bounded pagination over one user's timeline.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{order_posts, Post, UserProfile};
use crate::fetcher::{FetchRequest, FetchResult, Fetcher};
use crate::normalizer::{NormalizeError, NormalizedPage, NormalizerStrategy, PageKind, PageLimit};

/// Where in a walk a user became unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStage {
    Request,
    FirstPage,
    NextPage,
    Updates,
    Normalize,
}

impl fmt::Display for WalkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            WalkStage::Request => "request",
            WalkStage::FirstPage => "first page",
            WalkStage::NextPage => "next page",
            WalkStage::Updates => "updates",
            WalkStage::Normalize => "normalize",
        };
        f.write_str(stage)
    }
}

impl From<PageKind> for WalkStage {
    fn from(kind: PageKind) -> Self {
        match kind {
            PageKind::First => WalkStage::FirstPage,
            PageKind::Next => WalkStage::NextPage,
            PageKind::Updates => WalkStage::Updates,
        }
    }
}

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("@{handle} unavailable at {stage}: {reason}")]
    UserUnavailable {
        handle: String,
        stage: WalkStage,
        reason: String,
    },
}

impl WalkError {
    fn unavailable(profile: &UserProfile, stage: WalkStage, reason: impl fmt::Display) -> Self {
        WalkError::UserUnavailable {
            handle: profile.handle.clone(),
            stage,
            reason: reason.to_string(),
        }
    }
}

pub struct PaginationWalker {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    strategy: Arc<dyn NormalizerStrategy>,
    timeout: Duration,
}

impl PaginationWalker {
    pub fn new(
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        strategy: Arc<dyn NormalizerStrategy>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            strategy,
            timeout,
        }
    }

    pub fn strategy(&self) -> &dyn NormalizerStrategy {
        self.strategy.as_ref()
    }

    /// Collect up to `max_count` posts, newest first with pinned posts on top.
    ///
    /// The first page gets twice the normal timeout. Walking stops when the
    /// budget is spent, the age floor is reached, upstream offers no further
    /// cursor, a page brings nothing new or a cursor comes back unchanged.
    pub async fn walk(
        &self,
        profile: &mut UserProfile,
        max_count: usize,
        age_floor: Option<DateTime<Utc>>,
    ) -> Result<Vec<Post>, WalkError> {
        let mut posts = Vec::new();
        if max_count == 0 {
            return Ok(posts);
        }

        let mut seen = HashSet::new();
        let mut remaining = max_count;
        let mut previous_cursor: Option<String> = None;
        let mut kind = PageKind::First;
        let mut timeout = self.timeout.saturating_mul(2);
        let mut request = self.request(profile, self.strategy.first_page(profile, remaining))?;

        loop {
            let limit = PageLimit::new(remaining, age_floor);
            let page = self.page(profile, &request, kind, limit, timeout).await?;

            let mut fresh = 0;
            for post in page.posts {
                if seen.insert(post.id.clone()) {
                    posts.push(post);
                    fresh += 1;
                }
            }
            remaining = max_count.saturating_sub(posts.len());
            tracing::info!(handle = %profile.handle, fresh, remaining, "Fetched timeline page");

            let cursor = match page.cursor {
                _ if remaining == 0 => break,
                _ if page.age_floor_reached => break,
                None => break,
                Some(_) if fresh == 0 => {
                    tracing::debug!(handle = %profile.handle, "Page brought no new posts");
                    break;
                }
                Some(cursor) if previous_cursor.as_deref() == Some(cursor.as_str()) => {
                    tracing::debug!(handle = %profile.handle, %cursor, "Cursor did not advance");
                    break;
                }
                Some(cursor) => cursor,
            };

            request = self.request(profile, self.strategy.next_page(profile, &cursor, remaining))?;
            previous_cursor = Some(cursor);
            kind = PageKind::Next;
            timeout = self.timeout;
        }

        order_posts(&mut posts);
        Ok(posts)
    }

    /// Fetch only the first page, seeding the profile's cursors.
    pub async fn first_page(
        &self,
        profile: &mut UserProfile,
        limit: PageLimit,
    ) -> Result<NormalizedPage, WalkError> {
        let request = self.request(profile, self.strategy.first_page(profile, limit.max_count))?;
        self.page(profile, &request, PageKind::First, limit, self.timeout.saturating_mul(2))
            .await
    }

    /// Posts newer than `watermark`. The profile's top cursor moves when
    /// anything new arrives.
    pub async fn updates(
        &self,
        profile: &mut UserProfile,
        watermark: &str,
    ) -> Result<Vec<Post>, WalkError> {
        let request = self.request(profile, self.strategy.updates(profile, watermark))?;
        let page = self
            .page(profile, &request, PageKind::Updates, PageLimit::unbounded(), self.timeout)
            .await?;
        Ok(page.posts)
    }

    fn request(
        &self,
        profile: &UserProfile,
        request: Result<FetchRequest, NormalizeError>,
    ) -> Result<FetchRequest, WalkError> {
        request.map_err(|e| WalkError::unavailable(profile, WalkStage::Request, e))
    }

    async fn page(
        &self,
        profile: &mut UserProfile,
        request: &FetchRequest,
        kind: PageKind,
        limit: PageLimit,
        timeout: Duration,
    ) -> Result<NormalizedPage, WalkError> {
        tracing::debug!(handle = %profile.handle, url = %request.url, ?kind, "Fetching");

        let body = match self.fetcher.fetch(request, timeout).await {
            FetchResult::Success(body) => body,
            other => return Err(WalkError::unavailable(profile, kind.into(), other)),
        };

        self.strategy
            .normalize(&body, kind, limit, profile)
            .map_err(|e| WalkError::unavailable(profile, WalkStage::Normalize, e))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::config::UpstreamConfig;
    use crate::fetcher::mock::ScriptedFetcher;
    use crate::fetcher::Endpoints;
    use crate::normalizer::markup::fixtures::{envelope, post_html, profile_page};
    use crate::normalizer::MarkupNormalizer;

    fn walker(fetcher: Arc<ScriptedFetcher>) -> PaginationWalker {
        let endpoints = Endpoints::new(&UpstreamConfig::default()).unwrap();
        PaginationWalker::new(
            fetcher,
            Arc::new(MarkupNormalizer::new(endpoints)),
            Duration::from_secs(1),
        )
    }

    fn posts(range: &[(u32, i64)]) -> Vec<String> {
        range
            .iter()
            .map(|(id, epoch)| post_html(&id.to_string(), "alice", 42, *epoch, false))
            .collect()
    }

    fn ids(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_walk_collects_exactly_max_count_across_pages() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .on_body(
                    "timeline/tweets",
                    envelope(&posts(&[(7, 700), (6, 600), (5, 500)]), Some("5"), true, 0),
                )
                .on_body(
                    "twitter.com/alice",
                    profile_page("alice", 42, &posts(&[(10, 1000), (9, 900), (8, 800)]), "8", "10"),
                ),
        );
        let mut profile = UserProfile::new("alice");

        let result = walker(fetcher.clone()).walk(&mut profile, 5, None).await.unwrap();

        assert_eq!(ids(&result), vec!["10", "9", "8", "7", "6"]);
        assert!(result.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let calls = fetcher.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, Duration::from_secs(2));
        assert_eq!(calls[1].1, Duration::from_secs(1));
        assert!(calls[1].0.url.contains("max_position=8"));
    }

    #[tokio::test]
    async fn test_walk_stops_at_age_floor() {
        let fetcher = Arc::new(ScriptedFetcher::new().on_body(
            "twitter.com/alice",
            profile_page("alice", 42, &posts(&[(10, 1000), (9, 900), (8, 800)]), "8", "10"),
        ));
        let mut profile = UserProfile::new("alice");
        let floor = Some(Utc.timestamp_opt(850, 0).unwrap());

        let result = walker(fetcher.clone()).walk(&mut profile, 10, floor).await.unwrap();

        assert_eq!(ids(&result), vec!["10", "9"]);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_walk_terminates_on_empty_pages_claiming_more() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .on_body("timeline/tweets", envelope(&[], Some("1"), true, 0))
                .on_body(
                    "twitter.com/alice",
                    profile_page("alice", 42, &posts(&[(3, 300), (2, 200)]), "2", "3"),
                ),
        );
        let mut profile = UserProfile::new("alice");

        let result = walker(fetcher.clone()).walk(&mut profile, 10, None).await.unwrap();

        assert_eq!(ids(&result), vec!["3", "2"]);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_walk_stops_on_repeated_cursor() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .on_body("timeline/tweets", envelope(&posts(&[(1, 100)]), Some("2"), true, 0))
                .on_body(
                    "twitter.com/alice",
                    profile_page("alice", 42, &posts(&[(3, 300), (2, 200)]), "2", "3"),
                ),
        );
        let mut profile = UserProfile::new("alice");

        let result = walker(fetcher.clone()).walk(&mut profile, 10, None).await.unwrap();

        assert_eq!(ids(&result), vec!["3", "2", "1"]);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_walk_without_cursor_is_single_page() {
        let fetcher = Arc::new(ScriptedFetcher::new().on_body(
            "twitter.com/alice",
            profile_page("alice", 42, &posts(&[(3, 300)]), "", "3"),
        ));
        let mut profile = UserProfile::new("alice");

        let result = walker(fetcher.clone()).walk(&mut profile, 10, None).await.unwrap();

        assert_eq!(ids(&result), vec!["3"]);
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_walk_puts_pinned_first() {
        let mut page = vec![post_html("1", "alice", 42, 100, true)];
        page.extend(posts(&[(3, 300), (2, 200)]));
        let fetcher = Arc::new(
            ScriptedFetcher::new().on_body("twitter.com/alice", profile_page("alice", 42, &page, "", "3")),
        );
        let mut profile = UserProfile::new("alice");

        let result = walker(fetcher).walk(&mut profile, 10, None).await.unwrap();

        assert_eq!(ids(&result), vec!["1", "3", "2"]);
        assert!(result[0].is_pinned);
    }

    #[tokio::test]
    async fn test_walk_not_found_is_user_unavailable() {
        let fetcher =
            Arc::new(ScriptedFetcher::new().on("twitter.com/carol", vec![FetchResult::NotFound]));
        let mut profile = UserProfile::new("carol");

        let result = walker(fetcher).walk(&mut profile, 5, None).await;

        match result {
            Err(WalkError::UserUnavailable { handle, stage, .. }) => {
                assert_eq!(handle, "carol");
                assert_eq!(stage, WalkStage::FirstPage);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_walk_timeout_on_next_page() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .on("timeline/tweets", vec![FetchResult::Timeout])
                .on_body(
                    "twitter.com/alice",
                    profile_page("alice", 42, &posts(&[(3, 300)]), "3", "3"),
                ),
        );
        let mut profile = UserProfile::new("alice");

        let result = walker(fetcher).walk(&mut profile, 5, None).await;
        assert!(matches!(
            result,
            Err(WalkError::UserUnavailable { stage: WalkStage::NextPage, .. })
        ));
    }

    #[tokio::test]
    async fn test_walk_invalid_envelope_is_normalize_failure() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .on_body("timeline/tweets", "<html>rate limited</html>")
                .on_body(
                    "twitter.com/alice",
                    profile_page("alice", 42, &posts(&[(3, 300)]), "3", "3"),
                ),
        );
        let mut profile = UserProfile::new("alice");

        let result = walker(fetcher).walk(&mut profile, 5, None).await;
        assert!(matches!(
            result,
            Err(WalkError::UserUnavailable { stage: WalkStage::Normalize, .. })
        ));
    }

    #[tokio::test]
    async fn test_walk_stops_at_age_floor_on_next_page() {
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .on_body(
                    "timeline/tweets",
                    envelope(&posts(&[(7, 700), (6, 600), (5, 500)]), Some("5"), true, 0),
                )
                .on_body(
                    "twitter.com/alice",
                    profile_page("alice", 42, &posts(&[(10, 1000), (9, 900), (8, 800)]), "8", "10"),
                ),
        );
        let mut profile = UserProfile::new("alice");
        let floor = Some(Utc.timestamp_opt(650, 0).unwrap());

        let result = walker(fetcher.clone()).walk(&mut profile, 10, floor).await.unwrap();

        assert_eq!(ids(&result), vec!["10", "9", "8", "7"]);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_first_page_timeout_saturates() {
        let fetcher = Arc::new(ScriptedFetcher::new().on_body(
            "twitter.com/alice",
            profile_page("alice", 42, &posts(&[(3, 300)]), "", "3"),
        ));
        let endpoints = Endpoints::new(&UpstreamConfig::default()).unwrap();
        let walker = PaginationWalker::new(
            fetcher.clone(),
            Arc::new(MarkupNormalizer::new(endpoints)),
            Duration::MAX,
        );
        let mut profile = UserProfile::new("alice");

        walker.walk(&mut profile, 5, None).await.unwrap();

        assert_eq!(fetcher.calls()[0].1, Duration::MAX);
    }

    mod structured {
        use super::*;
        use crate::auth::Credentials;
        use crate::normalizer::timeline::fixtures::{cursor_entry, document, tweet, tweet_entry, user};
        use crate::normalizer::TimelineNormalizer;

        const T3: &str = "Wed Oct 10 20:19:24 +0000 2018";
        const T2: &str = "Tue Oct 09 20:19:24 +0000 2018";
        const T1: &str = "Mon Oct 08 20:19:24 +0000 2018";

        fn walker(fetcher: Arc<ScriptedFetcher>) -> PaginationWalker {
            let endpoints = Endpoints::new(&UpstreamConfig::default()).unwrap();
            let credentials = Credentials {
                bearer: "b".into(),
                guest: "g".into(),
            };
            PaginationWalker::new(
                fetcher,
                Arc::new(TimelineNormalizer::new(endpoints, credentials)),
                Duration::from_secs(1),
            )
        }

        fn profile() -> UserProfile {
            let mut profile = UserProfile::new("alice");
            profile.rest_id = Some("42".into());
            profile
        }

        fn page(tweets: &[(&str, &str)], bottom: &str) -> FetchResult {
            let mut entries: Vec<_> = tweets.iter().map(|(id, _)| tweet_entry(id)).collect();
            entries.push(cursor_entry("Bottom", bottom));
            let body = document(
                tweets.iter().map(|(id, at)| tweet(id, "42", at)).collect(),
                vec![user("42", "alice")],
                entries,
                None,
            );
            FetchResult::Success(body.into_bytes())
        }

        #[tokio::test]
        async fn test_follows_bottom_cursor_until_page_brings_nothing() {
            let fetcher = Arc::new(ScriptedFetcher::new().on(
                "timeline/profile/42.json",
                vec![
                    page(&[("3", T3), ("2", T2)], "B1"),
                    page(&[("1", T1)], "B2"),
                    page(&[], "B3"),
                ],
            ));
            let mut profile = profile();

            let result = walker(fetcher.clone()).walk(&mut profile, 10, None).await.unwrap();

            assert_eq!(ids(&result), vec!["3", "2", "1"]);
            let calls = fetcher.calls();
            assert_eq!(calls.len(), 3);
            assert!(!calls[0].0.url.contains("cursor="));
            assert!(calls[1].0.url.contains("cursor=B1"));
            assert!(calls[2].0.url.contains("cursor=B2"));
        }

        #[tokio::test]
        async fn test_stops_when_bottom_cursor_repeats() {
            let fetcher = Arc::new(ScriptedFetcher::new().on(
                "timeline/profile/42.json",
                vec![page(&[("3", T3), ("2", T2)], "B1"), page(&[("1", T1)], "B1")],
            ));
            let mut profile = profile();

            let result = walker(fetcher.clone()).walk(&mut profile, 10, None).await.unwrap();

            assert_eq!(ids(&result), vec!["3", "2", "1"]);
            assert_eq!(fetcher.calls().len(), 2);
        }

        #[tokio::test]
        async fn test_stops_on_empty_page_with_same_cursor() {
            let fetcher = Arc::new(ScriptedFetcher::new().on(
                "timeline/profile/42.json",
                vec![page(&[("3", T3)], "B1"), page(&[], "B1")],
            ));
            let mut profile = profile();

            let result = walker(fetcher.clone()).walk(&mut profile, 10, None).await.unwrap();

            assert_eq!(ids(&result), vec!["3"]);
            assert_eq!(fetcher.calls().len(), 2);
        }
    }
}
