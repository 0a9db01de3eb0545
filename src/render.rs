//! Plain-text presentation of collected posts.

use std::fmt::Write;
use std::sync::LazyLock;

use chrono::Local;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;

use crate::app::UserTimeline;
use crate::domain::Post;

pub const WEB_ROOT: &str = "https://twitter.com";

static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[~~@~~\*\*([^*]+)\*\*\]\(([^)]+)\)").expect("Invalid mention pattern")
});
static HASHTAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[~~#~~\*\*([^*]+)\*\*\]\(([^)]+)\)").expect("Invalid hashtag pattern")
});
static PICTURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pic\.twitter\.com/.+").expect("Invalid picture pattern"));
static TRAILING_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n+$").expect("Invalid newline pattern"));

/// Turn upstream mention and hashtag markup into absolute links.
pub fn rewrite_links(text: &str) -> String {
    let text = MENTION.replace_all(text, format!("[@$1]({}$2)", WEB_ROOT));
    HASHTAG
        .replace_all(&text, format!("[#$1]({}$2)", WEB_ROOT))
        .into_owned()
}

/// Link and image text, with picture links made absolute.
fn inline_label(label: &str) -> String {
    let label = label.replace('\n', "");
    if PICTURE.is_match(&label) {
        format!(" https://{} ", label)
    } else {
        format!(" {} ", label)
    }
}

/// Drop all markdown formatting, keeping text, link labels and image alt text.
pub fn strip_markdown(text: &str) -> String {
    let mut out = String::new();
    // Label of the link or image currently open, if any
    let mut label: Option<String> = None;

    for event in Parser::new(text) {
        match event {
            Event::Start(Tag::Link { .. }) | Event::Start(Tag::Image { .. }) => {
                label = Some(String::new());
            }
            Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => {
                if let Some(label) = label.take() {
                    out.push_str(&inline_label(&label));
                }
            }
            Event::Text(t) | Event::Code(t) => match label.as_mut() {
                Some(label) => label.push_str(&t),
                None => out.push_str(&t),
            },
            Event::SoftBreak | Event::HardBreak => match label.as_mut() {
                Some(label) => label.push('\n'),
                None => out.push('\n'),
            },
            Event::End(TagEnd::Paragraph) => out.push_str("\n\n"),
            _ => {}
        }
    }

    out
}

/// Prepare a post body for display.
pub fn format_body(text: &str, add_tabs: bool, strip: bool) -> String {
    let mut text = rewrite_links(text);
    if strip {
        text = strip_markdown(&text);
    }
    let text = TRAILING_NEWLINES.replace(&text, "");

    if add_tabs {
        text.lines()
            .map(|line| format!("\t{}", line))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        text.into_owned()
    }
}

/// Every post across users, oldest first so the newest ends up at the bottom.
pub fn sort_for_display(timelines: &[UserTimeline]) -> Vec<&Post> {
    let mut posts: Vec<&Post> = timelines.iter().flat_map(|t| t.posts.iter()).collect();
    posts.sort_by_key(|p| p.created_at);
    posts
}

pub fn render_post(post: &Post, strip: bool) -> String {
    let rule = "-".repeat(100);
    let mut msg = String::new();

    let _ = writeln!(msg, "{}", "=".repeat(100));
    let _ = writeln!(msg, "\n## [{}]({}{}) ", post.id, WEB_ROOT, post.permalink);
    if post.is_pinned {
        msg.push_str("Pinned post\n");
    }
    if let Some(repost) = &post.repost_of {
        let _ = writeln!(msg, "Repost from {}", repost.reposted_by);
    }
    let _ = writeln!(
        msg,
        "User: {} [@{}]({}/{})",
        post.display_author(),
        post.author.username,
        WEB_ROOT,
        post.author.username
    );
    let _ = writeln!(
        msg,
        "Date: {}",
        post.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(
        msg,
        "\n\t{}\n{}\n\t{}",
        rule,
        format_body(&post.body, true, strip),
        rule
    );
    let _ = writeln!(
        msg,
        "\t{} replies  - {} reposts  - {} likes",
        post.stats.reply_count, post.stats.repost_count, post.stats.like_count
    );

    msg
}
