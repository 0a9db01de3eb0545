//! Periodic polling for posts newer than each user's watermark.
//!
//! The poller owns the watched profiles. Nothing is persisted; interrupting
//! the loop drops all state.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, MissedTickBehavior};

use crate::app::{Result, TimelineClient};
use crate::domain::{order_posts, Post, UserProfile};
use crate::normalizer::PageLimit;

/// Newest known position for a user
pub type Watermark = String;

/// Receives each tick's new posts.
#[async_trait]
pub trait UpdateSink: Send {
    async fn deliver(&mut self, updates: BTreeMap<String, Vec<Post>>);
}

struct Watched {
    profile: UserProfile,
    watermark: Watermark,
}

pub struct UpdatePoller {
    client: TimelineClient,
    watched: BTreeMap<String, Watched>,
}

impl UpdatePoller {
    pub fn new(client: TimelineClient) -> Self {
        Self {
            client,
            watched: BTreeMap::new(),
        }
    }

    /// Seed a watermark for each handle from its first page. Handles that
    /// cannot be reached, or expose no watermark, are dropped.
    pub async fn initialize(&mut self, handles: &[String]) -> BTreeMap<String, Watermark> {
        for handle in handles {
            match self.seed(handle).await {
                Ok(Some(watched)) => {
                    tracing::info!(handle = %watched.profile.handle, watermark = %watched.watermark, "Watching");
                    self.watched.insert(watched.profile.handle.clone(), watched);
                }
                Ok(None) => {
                    tracing::warn!(handle = %handle, "No watermark on first page, not watching");
                }
                Err(e) => {
                    tracing::warn!(handle = %handle, error = %e, "Dropping user from watch list");
                }
            }
        }
        self.watermarks()
    }

    async fn seed(&mut self, handle: &str) -> Result<Option<Watched>> {
        let mut profile = self.client.profile(handle).await?;
        self.client
            .walker()
            .first_page(&mut profile, PageLimit::new(1, None))
            .await?;

        Ok(profile.cursor.top.clone().map(|watermark| Watched { profile, watermark }))
    }

    pub fn watermarks(&self) -> BTreeMap<String, Watermark> {
        self.watched
            .iter()
            .map(|(handle, w)| (handle.clone(), w.watermark.clone()))
            .collect()
    }

    /// One pass over every watched user. Users without new posts are absent
    /// from the result.
    pub async fn poll_once(&mut self) -> BTreeMap<String, Vec<Post>> {
        let mut updates = BTreeMap::new();
        let walker = self.client.walker();

        for (handle, watched) in self.watched.iter_mut() {
            let mut posts = match walker.updates(&mut watched.profile, &watched.watermark).await {
                Ok(posts) => posts,
                Err(e) => {
                    tracing::warn!(handle = %handle, error = %e, "Update check failed");
                    continue;
                }
            };
            if posts.is_empty() {
                continue;
            }

            match watched.profile.cursor.top.clone() {
                Some(top) if top != watched.watermark => watched.watermark = top,
                _ => {
                    // No new top marker; fall back to the newest post
                    if let Some(newest) = newest_id(&posts) {
                        tracing::warn!(handle = %handle, watermark = %newest, "Update page carried no top marker");
                        watched.profile.cursor.top = Some(newest.clone());
                        watched.watermark = newest;
                    }
                }
            }
            order_posts(&mut posts);
            tracing::info!(handle = %handle, new = posts.len(), watermark = %watched.watermark, "New posts");
            updates.insert(handle.clone(), posts);
        }

        updates
    }

    /// Poll every `period` until interrupted with Ctrl-C.
    pub async fn run(&mut self, period: Duration, sink: &mut dyn UpdateSink) -> Result<()> {
        self.run_until(period, sink, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Poll every `period` until `shutdown` completes.
    ///
    /// `shutdown` is polled for the whole run, so an interrupt that arrives
    /// while a tick is being polled or delivered ends the loop after that tick.
    pub async fn run_until<F>(
        &mut self,
        period: Duration,
        sink: &mut dyn UpdateSink,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.tick().await; // first tick completes immediately
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Interrupted, stopping watch");
                    break;
                }
                _ = timer.tick() => {
                    let updates = self.poll_once().await;
                    if !updates.is_empty() {
                        sink.deliver(updates).await;
                    }
                }
            }
        }

        Ok(())
    }
}

fn newest_id(posts: &[Post]) -> Option<String> {
    posts
        .iter()
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
        .map(|p| p.id.clone())
}
