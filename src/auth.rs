//! Bearer and guest token acquisition for the structured API.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::fetcher::{Endpoints, FetchRequest, FetchResult, Fetcher};

/// 21 literal `A` followed by 83 token characters.
static BEARER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"A{21}[A-Za-z0-9%]{83}").expect("Invalid bearer token pattern")
});

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Expected exactly one bearer token in the script asset, found {matches}")]
    TokenNotFound { matches: usize },

    #[error("Script asset unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Guest token rejected: {0}")]
    GuestTokenRejected(String),
}

/// Credentials attached to every structured API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bearer: String,
    pub guest: String,
}

impl Credentials {
    /// Attach the authorization headers to a request
    pub fn authorize(&self, request: FetchRequest) -> FetchRequest {
        request
            .header("authorization", format!("Bearer {}", self.bearer))
            .header("x-guest-token", self.guest.clone())
    }
}

#[derive(Deserialize)]
struct GuestActivation {
    guest_token: serde_json::Value,
}

/// Pull the bearer token out of a script bundle.
///
/// Exactly one distinct match is accepted. Anything else means the bundle
/// format drifted and is reported instead of guessed at.
pub fn extract_bearer_token(script: &str) -> Result<String, AuthError> {
    let matches: BTreeSet<&str> = BEARER_PATTERN
        .find_iter(script)
        .map(|m| m.as_str())
        .collect();

    match matches.len() {
        1 => Ok(matches.into_iter().next().unwrap_or_default().to_string()),
        n => Err(AuthError::TokenNotFound { matches: n }),
    }
}

fn parse_guest_token(body: &[u8]) -> Result<String, AuthError> {
    let activation: GuestActivation = serde_json::from_slice(body)
        .map_err(|e| AuthError::GuestTokenRejected(format!("malformed response: {}", e)))?;

    match activation.guest_token {
        serde_json::Value::String(token) if !token.is_empty() => Ok(token),
        serde_json::Value::Number(token) => Ok(token.to_string()),
        other => Err(AuthError::GuestTokenRejected(format!(
            "unexpected guest_token value: {}",
            other
        ))),
    }
}

/// Session-scoped credential holder. Tokens are derived once per process.
pub struct TokenStore {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    endpoints: Endpoints,
    timeout: Duration,
    bearer_override: Option<String>,
    credentials: Option<Credentials>,
}

impl TokenStore {
    pub fn new(
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        endpoints: Endpoints,
        timeout: Duration,
        bearer_override: Option<String>,
    ) -> Self {
        Self {
            fetcher,
            endpoints,
            timeout,
            bearer_override,
            credentials: None,
        }
    }

    /// Return the session credentials, acquiring them on first use.
    pub async fn acquire(&mut self) -> Result<Credentials, AuthError> {
        if let Some(credentials) = &self.credentials {
            return Ok(credentials.clone());
        }

        let bearer = match &self.bearer_override {
            Some(token) => token.clone(),
            None => self.fetch_bearer().await?,
        };
        let guest = self.activate_guest(&bearer).await?;
        tracing::info!("Acquired guest token");

        let credentials = Credentials { bearer, guest };
        self.credentials = Some(credentials.clone());
        Ok(credentials)
    }

    async fn fetch_bearer(&self) -> Result<String, AuthError> {
        let request = FetchRequest::get(self.endpoints.script_asset());
        match self.fetcher.fetch(&request, self.timeout).await {
            FetchResult::Success(body) => extract_bearer_token(&String::from_utf8_lossy(&body)),
            other => Err(AuthError::AssetUnavailable(other.to_string())),
        }
    }

    async fn activate_guest(&self, bearer: &str) -> Result<String, AuthError> {
        let request = FetchRequest::post(self.endpoints.guest_activate())
            .header("authorization", format!("Bearer {}", bearer));

        match self.fetcher.fetch(&request, self.timeout).await {
            FetchResult::Success(body) => parse_guest_token(&body),
            other => Err(AuthError::GuestTokenRejected(other.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A syntactically valid 104 character bearer token
    pub fn bearer() -> String {
        format!("{}{}", "A".repeat(21), "b%3D".repeat(20) + "xyz")
    }
}
