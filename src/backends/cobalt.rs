//! Remote resolver backed by a cobalt API instance

use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ResolutionError;
use crate::messages::ResolvedLinks;

#[derive(Debug, Serialize)]
struct CobaltRequest<'a> {
    url: &'a str,
}

/// Response body of the cobalt API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CobaltResponse {
    /// redirect, tunnel, local-processing, picker, error
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub picker: Option<Vec<PickerItem>>,
    /// Newer instances describe failures here instead of in `url`
    #[serde(default)]
    pub error: Option<CobaltErrorInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PickerItem {
    /// photo, video or gif
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CobaltErrorInfo {
    #[serde(default)]
    pub code: String,
}

impl CobaltResponse {
    /// Map a decoded response onto links or a resolution error
    pub fn into_links(self) -> Result<ResolvedLinks, ResolutionError> {
        match self.status.as_str() {
            "error" => Err(ResolutionError::Service(self.diagnostic())),
            "local-processing" => Err(ResolutionError::LocalProcessing(self.diagnostic())),
            "redirect" | "tunnel" => self
                .url
                .filter(|u| !u.is_empty())
                .and_then(|u| ResolvedLinks::new(vec![u]))
                .ok_or(ResolutionError::NoLinks),
            "picker" => {
                let links = self
                    .picker
                    .unwrap_or_default()
                    .into_iter()
                    .map(|item| item.url)
                    .filter(|url| !url.is_empty())
                    .collect();
                ResolvedLinks::new(links)
                    .ok_or_else(|| ResolutionError::UnexpectedStatus("picker".to_string()))
            }
            other => Err(ResolutionError::UnexpectedStatus(other.to_string())),
        }
    }

    fn diagnostic(&self) -> String {
        match (&self.url, &self.error) {
            (Some(url), _) if !url.is_empty() => url.clone(),
            (_, Some(error)) => error.code.clone(),
            _ => String::new(),
        }
    }
}

/// Resolves one URL through `POST {api_url}`
#[derive(Debug, Clone)]
pub struct CobaltResolver {
    client: Client,
    api_url: String,
    url: String,
}

impl CobaltResolver {
    pub fn new(client: Client, api_url: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn resolve(&self) -> Result<ResolvedLinks, ResolutionError> {
        debug!(api_url = %self.api_url, url = %self.url, "Sending request to cobalt");

        // `.json` sets Content-Type: application/json
        let response = self
            .client
            .post(&self.api_url)
            .header(ACCEPT, "application/json")
            .json(&CobaltRequest { url: &self.url })
            .send()
            .await
            .map_err(|e| ResolutionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                body = %body,
                "cobalt returned non-success response"
            );
            return Err(ResolutionError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let parsed: CobaltResponse = response
            .json()
            .await
            .map_err(|e| ResolutionError::Decode(e.to_string()))?;

        debug!(status = %parsed.status, "cobalt response decoded");

        parsed.into_links()
    }
}
