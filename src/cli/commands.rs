use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::{AppContext, BatchOutcome, Result, TimelineClient};
use crate::domain::Post;
use crate::notify::{announcement, Notifier};
use crate::poller::{UpdatePoller, UpdateSink};
use crate::render::{render_post, sort_for_display};

/// Options shared by the dump and watch phases.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_count: usize,
    pub age_floor: Option<DateTime<Utc>>,
    pub strip: bool,
    pub interval: Duration,
}

/// Walk every handle and print the collected posts, oldest first.
pub async fn dump_timelines(
    client: &mut TimelineClient,
    handles: &[String],
    options: &RunOptions,
) -> BatchOutcome {
    let outcome = client
        .walk_all(handles, options.max_count, options.age_floor)
        .await;

    for post in sort_for_display(&outcome.timelines) {
        println!("{}", render_post(post, options.strip));
    }

    for failure in &outcome.failures {
        tracing::warn!(handle = %failure.handle, error = %failure.error, "User omitted from output");
    }

    outcome
}

/// Prints new posts as they arrive and optionally notifies.
pub struct PrintSink {
    strip: bool,
    notifier: Option<Box<dyn Notifier>>,
}

impl PrintSink {
    pub fn new(strip: bool, notifier: Option<Box<dyn Notifier>>) -> Self {
        Self { strip, notifier }
    }
}

#[async_trait]
impl UpdateSink for PrintSink {
    async fn deliver(&mut self, updates: BTreeMap<String, Vec<Post>>) {
        for (handle, posts) in &updates {
            let mut ordered: Vec<&Post> = posts.iter().collect();
            ordered.sort_by_key(|p| p.created_at);
            for post in &ordered {
                println!("{}", render_post(post, self.strip));
            }

            if let (Some(notifier), Some(newest)) = (&self.notifier, ordered.last()) {
                let (title, body) = announcement(handle, newest);
                tracing::debug!(channel = notifier.name(), handle = %handle, "Sending notification");
                notifier.notify(&title, &body).await;
            }
        }
    }
}

/// Poll the given handles until interrupted.
pub async fn watch(
    client: TimelineClient,
    handles: &[String],
    options: &RunOptions,
    sink: &mut dyn UpdateSink,
) -> Result<()> {
    let mut poller = UpdatePoller::new(client);
    let watermarks = poller.initialize(handles).await;

    if watermarks.is_empty() {
        tracing::error!("No available info to get updates");
        return Ok(());
    }

    tracing::info!(users = watermarks.len(), interval = ?options.interval, "Watching for new posts");
    poller.run(options.interval, sink).await
}

/// Full run: dump every timeline, then watch when asked to.
pub async fn run(
    ctx: &AppContext,
    handles: &[String],
    options: &RunOptions,
    watch_sink: Option<PrintSink>,
) -> Result<()> {
    let mut client = ctx.client().await?;
    dump_timelines(&mut client, handles, options).await;

    if let Some(mut sink) = watch_sink {
        watch(client, handles, options, &mut sink).await?;
    }

    Ok(())
}
