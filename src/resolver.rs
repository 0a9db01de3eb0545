//! Handle to profile resolution over the GraphQL "user by screen name" call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::auth::Credentials;
use crate::domain::{ProfileCounters, UserProfile};
use crate::fetcher::{Endpoints, FetchRequest, FetchResult, Fetcher};
use crate::normalizer::timeline::full_size;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("User @{0} does not exist")]
    UserNotFound(String),

    #[error("Could not reach upstream for @{handle}: {reason}")]
    Unavailable { handle: String, reason: String },

    #[error("Malformed profile response for @{handle}: {reason}")]
    MalformedResponse { handle: String, reason: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserResponse {
    data: Option<UserData>,
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserData {
    user: Option<RawUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawUser {
    id: Option<String>,
    rest_id: Option<String>,
    legacy: Option<Legacy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Legacy {
    screen_name: Option<String>,
    name: Option<String>,
    description: Option<String>,
    url: Option<String>,
    profile_image_url_https: Option<String>,
    followers_count: Option<u64>,
    friends_count: Option<u64>,
    statuses_count: Option<u64>,
    favourites_count: Option<u64>,
    listed_count: Option<u64>,
    media_count: Option<u64>,
    pinned_tweet_ids_str: Option<Vec<String>>,
}

fn counter(handle: &str, field: &'static str, value: Option<u64>) -> u64 {
    value.unwrap_or_else(|| {
        tracing::warn!(handle, field, "Profile counter missing");
        0
    })
}

/// Build a profile from a raw response body.
fn parse_profile(handle: &str, body: &[u8]) -> Result<UserProfile, ResolveError> {
    let malformed = |reason: String| ResolveError::MalformedResponse {
        handle: handle.to_string(),
        reason,
    };

    let response: UserResponse =
        serde_json::from_slice(body).map_err(|e| malformed(e.to_string()))?;

    let Some(user) = response.data.and_then(|d| d.user) else {
        if !response.errors.is_empty() {
            tracing::debug!(handle, errors = response.errors.len(), "Upstream reported errors");
        }
        return Err(ResolveError::UserNotFound(handle.to_string()));
    };

    let rest_id = user
        .rest_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed("missing rest_id".into()))?;
    let legacy = user.legacy.unwrap_or_default();
    let screen_name = legacy
        .screen_name
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("missing screen_name".into()))?;

    let mut profile = UserProfile::new(&screen_name);
    profile.id = user.id;
    profile.rest_id = Some(rest_id);
    profile.display_name = legacy.name;
    profile.bio = legacy.description;
    profile.homepage = legacy.url;
    if profile.homepage.is_none() {
        tracing::warn!(handle, "Profile has no homepage URL");
    }

    match legacy.profile_image_url_https {
        Some(avatar) => {
            profile.full_size_avatar = Some(full_size(&avatar));
            profile.avatar_url = Some(avatar);
        }
        None => tracing::warn!(handle, "Profile has no avatar"),
    }

    profile.counters = ProfileCounters {
        followers: counter(handle, "followers_count", legacy.followers_count),
        friends: counter(handle, "friends_count", legacy.friends_count),
        statuses: counter(handle, "statuses_count", legacy.statuses_count),
        favourites: counter(handle, "favourites_count", legacy.favourites_count),
        listed: counter(handle, "listed_count", legacy.listed_count),
        media: counter(handle, "media_count", legacy.media_count),
    };

    match legacy.pinned_tweet_ids_str {
        Some(ids) => ids.iter().for_each(|id| profile.add_pinned(id)),
        None => tracing::warn!(handle, "Profile has no pinned post list"),
    }

    Ok(profile)
}

/// Resolves handles to profiles, caching each result for the session.
pub struct IdentityResolver {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    endpoints: Endpoints,
    credentials: Credentials,
    timeout: Duration,
    cache: HashMap<String, UserProfile>,
}

impl IdentityResolver {
    pub fn new(
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        endpoints: Endpoints,
        credentials: Credentials,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            endpoints,
            credentials,
            timeout,
            cache: HashMap::new(),
        }
    }

    pub async fn resolve(&mut self, handle: &str) -> Result<UserProfile, ResolveError> {
        let key = UserProfile::normalize_handle(handle);
        if let Some(profile) = self.cache.get(&key) {
            tracing::debug!(handle = %key, "Profile served from cache");
            return Ok(profile.clone());
        }

        let request = self
            .credentials
            .authorize(FetchRequest::get(self.endpoints.user_by_screen_name(&key)));

        let profile = match self.fetcher.fetch(&request, self.timeout).await {
            FetchResult::Success(body) => parse_profile(&key, &body)?,
            FetchResult::NotFound => return Err(ResolveError::UserNotFound(key)),
            other => {
                return Err(ResolveError::Unavailable {
                    handle: key,
                    reason: other.to_string(),
                })
            }
        };

        tracing::info!(handle = %key, rest_id = ?profile.rest_id, "Resolved user");
        self.cache.insert(key, profile.clone());
        Ok(profile)
    }
}
