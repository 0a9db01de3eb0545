use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::app::error::{FeederError, Result};
use crate::auth::TokenStore;
use crate::config::{Config, Protocol};
use crate::domain::{Post, UserProfile};
use crate::fetcher::{Endpoints, Fetcher, HttpFetcher};
use crate::normalizer::{MarkupNormalizer, NormalizerStrategy, TimelineNormalizer};
use crate::resolver::IdentityResolver;
use crate::walker::PaginationWalker;

pub struct AppContext {
    pub config: Config,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new(&config.fetch)?);
        Ok(Self { config, fetcher })
    }

    pub fn with_fetcher(config: Config, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self { config, fetcher }
    }

    /// Build a client for the configured protocol. Token failures are fatal here.
    pub async fn client(&self) -> Result<TimelineClient> {
        TimelineClient::connect(&self.config, self.fetcher.clone()).await
    }
}

/// One user's profile and the posts collected for it.
#[derive(Debug, Clone)]
pub struct UserTimeline {
    pub profile: UserProfile,
    pub posts: Vec<Post>,
}

#[derive(Debug)]
pub struct UserFailure {
    pub handle: String,
    pub error: FeederError,
}

/// Result of walking several users. Failures never abort the batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub timelines: Vec<UserTimeline>,
    pub failures: Vec<UserFailure>,
}

/// Session-scoped timeline access: resolver cache and walker for one protocol.
pub struct TimelineClient {
    walker: PaginationWalker,
    resolver: Option<IdentityResolver>,
}

impl TimelineClient {
    pub async fn connect(config: &Config, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Result<Self> {
        let endpoints = Endpoints::new(&config.upstream)?;
        let timeout = config.fetch.timeout();

        let (strategy, resolver): (Arc<dyn NormalizerStrategy>, Option<IdentityResolver>) =
            match config.upstream.protocol {
                Protocol::Legacy => {
                    let strategy: Arc<dyn NormalizerStrategy> =
                        Arc::new(MarkupNormalizer::new(endpoints));
                    (strategy, None)
                }
                Protocol::Structured => {
                    let mut tokens = TokenStore::new(
                        fetcher.clone(),
                        endpoints.clone(),
                        timeout,
                        config.upstream.bearer_token.clone(),
                    );
                    let credentials = tokens.acquire().await.map_err(|e| {
                        tracing::error!(error = %e, "Could not obtain API credentials");
                        e
                    })?;
                    let resolver = IdentityResolver::new(
                        fetcher.clone(),
                        endpoints.clone(),
                        credentials.clone(),
                        timeout,
                    );
                    let strategy: Arc<dyn NormalizerStrategy> =
                        Arc::new(TimelineNormalizer::new(endpoints, credentials));
                    (strategy, Some(resolver))
                }
            };

        tracing::info!(protocol = strategy.name(), "Timeline client ready");
        Ok(Self {
            walker: PaginationWalker::new(fetcher, strategy, timeout),
            resolver,
        })
    }

    pub fn walker(&self) -> &PaginationWalker {
        &self.walker
    }

    /// Profile to walk for `handle`, resolved upstream when the protocol needs it.
    pub async fn profile(&mut self, handle: &str) -> Result<UserProfile> {
        match &mut self.resolver {
            Some(resolver) if self.walker.strategy().requires_identity() => {
                Ok(resolver.resolve(handle).await?)
            }
            _ => Ok(UserProfile::new(handle)),
        }
    }

    pub async fn walk(
        &mut self,
        handle: &str,
        max_count: usize,
        age_floor: Option<DateTime<Utc>>,
    ) -> Result<UserTimeline> {
        let mut profile = self.profile(handle).await?;
        let posts = self.walker.walk(&mut profile, max_count, age_floor).await?;
        Ok(UserTimeline { profile, posts })
    }

    /// Walk each handle in turn, collecting failures alongside results.
    pub async fn walk_all(
        &mut self,
        handles: &[String],
        max_count: usize,
        age_floor: Option<DateTime<Utc>>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for handle in handles {
            match self.walk(handle, max_count, age_floor).await {
                Ok(timeline) => {
                    tracing::info!(handle = %timeline.profile.handle, posts = timeline.posts.len(), "Walked timeline");
                    outcome.timelines.push(timeline);
                }
                Err(error) => {
                    tracing::warn!(handle = %handle, error = %error, "Skipping unavailable user");
                    outcome.failures.push(UserFailure {
                        handle: handle.clone(),
                        error,
                    });
                }
            }
        }

        outcome
    }
}
