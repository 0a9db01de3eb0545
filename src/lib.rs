//! # tweetfeed
//!
//! A command-line scraper for public Twitter timelines.
//!
//! ## Architecture
//!
//! tweetfeed follows a small pipeline:
//!
//! ```text
//! TokenStore → IdentityResolver → Fetcher → Normalizer → Walker/Poller → render
//! ```
//!
//! - [`auth`]: bearer and guest token acquisition for the structured API
//! - [`resolver`]: handle to profile resolution with a session cache
//! - [`fetcher`]: single round-trip HTTP with a closed result taxonomy
//! - [`normalizer`]: legacy HTML and structured JSON payloads to one post model
//! - [`walker`]: bounded pagination per user
//! - [`poller`]: periodic update checks against per-user watermarks
//!
//! ## Quick Start
//!
//! ```bash
//! # Dump the last 10 posts of each listed account
//! tweetfeed users.txt
//!
//! # Posts since a timestamp, then keep watching
//! tweetfeed -c 50 -e 1500000000 --watch users.txt
//!
//! # Use the guest-token JSON API instead of the HTML pages
//! tweetfeed --protocol structured users.txt
//! ```

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) owns the configuration and fetcher;
/// [`TimelineClient`](app::TimelineClient) ties the resolver and walker
/// together for one protocol.
pub mod app;

/// Bearer token extraction and guest token activation.
pub mod auth;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/tweetfeed/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`Post`](domain::Post): one timeline post, protocol independent
/// - [`UserProfile`](domain::UserProfile): resolved account plus cursors
pub mod domain;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): async trait for one round trip
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`Endpoints`](fetcher::Endpoints): URL builders for both protocols
pub mod fetcher;

/// Payload normalization for both upstream grammars.
pub mod normalizer;

/// New-post notifications.
pub mod notify;

/// Watch mode: update polling against stored watermarks.
pub mod poller;

/// Plain-text rendering of posts.
pub mod render;

/// Handle resolution over the GraphQL user lookup.
pub mod resolver;

/// Pagination over one user's timeline.
pub mod walker;
