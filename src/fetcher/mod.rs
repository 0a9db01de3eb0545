pub mod endpoints;
pub mod http_fetcher;
#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

pub use endpoints::Endpoints;
pub use http_fetcher::HttpFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound request: method, URL and any extra headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }
}

/// Outcome of a single round trip. Nothing else crosses the fetcher boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Success(Vec<u8>),
    /// Upstream answered with a client error: the target does not exist
    NotFound,
    Timeout,
    TransportError(String),
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success(_))
    }
}

impl fmt::Display for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchResult::Success(body) => write!(f, "success ({} bytes)", body.len()),
            FetchResult::NotFound => write!(f, "not found"),
            FetchResult::Timeout => write!(f, "timed out"),
            FetchResult::TransportError(detail) => write!(f, "transport error: {}", detail),
        }
    }
}

#[async_trait]
pub trait Fetcher {
    /// Perform exactly one round trip. Implementations never retry.
    async fn fetch(&self, request: &FetchRequest, timeout: Duration) -> FetchResult;
}
