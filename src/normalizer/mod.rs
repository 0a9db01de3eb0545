//! Upstream payload normalization.
//!
//! Two grammars map onto one [`Post`] model:
//!
//! - [`MarkupNormalizer`]: legacy HTML profile page and `items_html` envelopes
//! - [`TimelineNormalizer`]: structured JSON timeline with a post map and ordered entries
//!
//! Each strategy also knows how to build the requests of its protocol, so the
//! walker and poller only ever talk to the [`NormalizerStrategy`] trait.

mod extract;
pub mod markdown;
pub mod markup;
pub mod timeline;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Post, UserProfile};
use crate::fetcher::FetchRequest;

pub use markup::MarkupNormalizer;
pub use timeline::TimelineNormalizer;

pub(crate) use extract::Extractor;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Post element is missing {0}")]
    MissingField(&'static str),

    #[error("Profile has no rest id; resolve the user first")]
    MissingRestId,
}

/// Which page of the protocol a payload answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// First page of a walk; seeds the profile and its cursors
    First,
    /// Continuation page requested with a bottom cursor
    Next,
    /// New posts since the top watermark
    Updates,
}

/// Extraction budget for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimit {
    pub max_count: usize,
    pub age_floor: Option<DateTime<Utc>>,
}

impl PageLimit {
    pub fn new(max_count: usize, age_floor: Option<DateTime<Utc>>) -> Self {
        Self {
            max_count,
            age_floor,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX, None)
    }
}

/// Ordered posts extracted from one payload plus pagination signals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedPage {
    pub posts: Vec<Post>,
    /// Continuation cursor for older posts, if upstream reports more
    pub cursor: Option<String>,
    pub age_floor_reached: bool,
}

impl NormalizedPage {
    pub fn extracted(&self) -> usize {
        self.posts.len()
    }
}

/// One upstream grammar: request construction plus payload normalization.
pub trait NormalizerStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a handle must be resolved to a rest id before the first page
    fn requires_identity(&self) -> bool;

    fn first_page(&self, profile: &UserProfile, count: usize)
        -> Result<FetchRequest, NormalizeError>;

    fn next_page(
        &self,
        profile: &UserProfile,
        cursor: &str,
        count: usize,
    ) -> Result<FetchRequest, NormalizeError>;

    fn updates(&self, profile: &UserProfile, watermark: &str)
        -> Result<FetchRequest, NormalizeError>;

    /// Parse one payload. Cursor markers and profile data found in the
    /// payload are written into `profile`.
    fn normalize(
        &self,
        payload: &[u8],
        kind: PageKind,
        limit: PageLimit,
        profile: &mut UserProfile,
    ) -> Result<NormalizedPage, NormalizeError>;
}
