//! Download backends
//!
//! A [`Backend`] turns one request URL into an ordered list of media links.
//! The [`Dispatcher`] decodes a delivery body and picks the backend for the
//! topic the delivery arrived on.
//!
//! ## Variants
//!
//! - [`CobaltResolver`] - asks a cobalt API instance for direct links
//! - [`YtdlExtractor`] - runs a local yt-dlp style executable
//!
//! ## Example
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::new(Arc::new(config), http_client);
//! let (backend, request) = dispatcher.dispatch(delivery.body(), "cobalt")?;
//! let links = backend.resolve().await?;
//! ```

mod cobalt;
mod dispatcher;
mod http;
mod ytdl;

pub use cobalt::{CobaltResolver, CobaltResponse, PickerItem};
pub use dispatcher::{DispatchError, Dispatcher, Topic};
pub use http::{HttpClientError, build_client};
pub use ytdl::YtdlExtractor;

use std::time::Duration;
use thiserror::Error;

use crate::messages::ResolvedLinks;

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("cobalt service error: {0}")]
    Service(String),

    #[error("cobalt service is processing the file locally: {0}")]
    LocalProcessing(String),

    #[error("unexpected cobalt response status: {0}")]
    UnexpectedStatus(String),

    #[error("received non-success response: HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("failed to start extractor: {0}")]
    Spawn(String),

    #[error("extractor exited with {code:?}: {stderr}")]
    Extractor { code: Option<i32>, stderr: String },

    #[error("extractor timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend returned no links")]
    NoLinks,
}

/// Download backend selected per delivery
#[derive(Debug, Clone)]
pub enum Backend {
    RemoteResolver(CobaltResolver),
    LocalExtractor(YtdlExtractor),
}

impl Backend {
    pub async fn resolve(&self) -> Result<ResolvedLinks, ResolutionError> {
        match self {
            Backend::RemoteResolver(resolver) => resolver.resolve().await,
            Backend::LocalExtractor(extractor) => extractor.resolve().await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::RemoteResolver(_) => "cobalt",
            Backend::LocalExtractor(_) => "ytdl",
        }
    }
}
