use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::app::Result;
use crate::config::FetchConfig;
use crate::fetcher::{FetchRequest, FetchResult, Fetcher, Method};

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    /// Map a non-success status onto the fetch taxonomy.
    fn classify_status(status: StatusCode) -> FetchResult {
        match status {
            StatusCode::REQUEST_TIMEOUT => FetchResult::Timeout,
            StatusCode::TOO_MANY_REQUESTS => {
                FetchResult::TransportError(format!("rate limited ({})", status))
            }
            s if s.is_client_error() => FetchResult::NotFound,
            s => FetchResult::TransportError(format!("unexpected status {}", s)),
        }
    }

    fn classify_error(err: reqwest::Error) -> FetchResult {
        if err.is_timeout() {
            FetchResult::Timeout
        } else {
            FetchResult::TransportError(err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest, timeout: Duration) -> FetchResult {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = match builder.timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "Request failed");
                return Self::classify_error(e);
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %request.url, %status, "Upstream refused request");
            return Self::classify_status(status);
        }

        match response.bytes().await {
            Ok(body) => FetchResult::Success(body.to_vec()),
            Err(e) => Self::classify_error(e),
        }
    }
}
