//! Shared HTTP client for remote backends

use reqwest::Client;
use thiserror::Error;

use crate::config::HttpConfig;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Build the client cloned into every remote resolver
pub fn build_client(config: &HttpConfig) -> Result<Client, HttpClientError> {
    let client = Client::builder()
        .connect_timeout(config.connect_timeout.as_duration())
        .timeout(config.request_timeout.as_duration())
        .user_agent(&config.user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;

    Ok(client)
}
