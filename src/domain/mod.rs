pub mod post;
pub mod profile;

pub use post::{order_posts, Author, Post, PostStats, RepostInfo};
pub use profile::{ProfileCounters, TimelineCursor, UserProfile};
