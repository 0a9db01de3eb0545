use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::resolver::ResolveError;
use crate::walker::WalkError;

#[derive(Error, Debug)]
pub enum FeederError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Could not resolve user: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Timeline walk failed: {0}")]
    Walk(#[from] WalkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FeederError>;
