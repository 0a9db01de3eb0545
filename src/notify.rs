//! New-post notifications.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::Post;
use crate::render::format_body;

/// A destination for "new post" alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, title: &str, body: &str);
}

/// Writes each notification to a terminal stream, ringing the bell first.
///
/// Output goes straight to the stream so it shows regardless of the log filter.
pub struct ConsoleNotifier<W> {
    out: Mutex<W>,
}

impl ConsoleNotifier<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> ConsoleNotifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<W: Write + Send + 'static> Notifier for ConsoleNotifier<W> {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn notify(&self, title: &str, body: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = writeln!(out, "\x07{}: {}", title, body.trim_end()).and_then(|_| out.flush());
        if let Err(e) = written {
            tracing::warn!(error = %e, "Could not write notification");
        }
    }
}

/// Title and plain-text body announcing `post` from `handle`.
pub fn announcement(handle: &str, post: &Post) -> (String, String) {
    (
        format!("New post from @{}", handle),
        format_body(&post.body, false, true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::post::fixtures::post;

    #[test]
    fn test_announcement_is_plain_text() {
        let mut p = post("1", "alice", 100);
        p.body = "hi [~~@~~**bob**](/bob)".into();

        let (title, body) = announcement("alice", &p);
        assert_eq!(title, "New post from @alice");
        assert_eq!(body.trim_end(), "hi  @bob");
    }

    #[tokio::test]
    async fn test_console_notifier_writes_visible_line() {
        let notifier = ConsoleNotifier::new(Vec::new());
        assert_eq!(notifier.name(), "console");

        notifier.notify("New post from @alice", "hello there\n").await;
        notifier.notify("New post from @bob", "second").await;

        let written = String::from_utf8(notifier.into_inner()).unwrap();
        assert_eq!(
            written,
            "\x07New post from @alice: hello there\n\x07New post from @bob: second\n"
        );
    }
}
