use reqwest::Client;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use super::{Backend, CobaltResolver, YtdlExtractor};
use crate::config::ServicesConfig;
use crate::messages::{DecodeError, InboundRequest};

/// Topic tag a delivery arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Cobalt,
    Ytdl,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::Cobalt, Topic::Ytdl];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Cobalt => "cobalt",
            Topic::Ytdl => "ytdl",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cobalt" => Ok(Topic::Cobalt),
            "ytdl" => Ok(Topic::Ytdl),
            other => Err(DispatchError::UnsupportedTopic(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unsupported service type: {0}")]
    UnsupportedTopic(String),

    #[error("backend '{0}' is disabled")]
    BackendDisabled(Topic),
}

/// Builds the backend for a delivery from static service config
#[derive(Debug, Clone)]
pub struct Dispatcher {
    services: Arc<ServicesConfig>,
    client: Client,
}

impl Dispatcher {
    pub fn new(services: Arc<ServicesConfig>, client: Client) -> Self {
        Self { services, client }
    }

    pub fn is_enabled(&self, topic: Topic) -> bool {
        match topic {
            Topic::Cobalt => self.services.cobalt.enable,
            Topic::Ytdl => self.services.ytdl.enable,
        }
    }

    /// Decode `body`, then pick the backend for `topic`.
    ///
    /// A malformed body is reported before an unknown topic.
    pub fn dispatch(
        &self,
        body: &[u8],
        topic: &str,
    ) -> Result<(Backend, InboundRequest), DispatchError> {
        let request = InboundRequest::from_slice(body)?;
        let topic: Topic = topic.parse()?;

        if !self.is_enabled(topic) {
            return Err(DispatchError::BackendDisabled(topic));
        }

        let backend = match topic {
            Topic::Cobalt => Backend::RemoteResolver(CobaltResolver::new(
                self.client.clone(),
                self.services.cobalt.api_url.clone(),
                request.url.clone(),
            )),
            Topic::Ytdl => {
                let ytdl = &self.services.ytdl;
                Backend::LocalExtractor(YtdlExtractor::new(
                    ytdl.bin.clone(),
                    ytdl.args.clone(),
                    ytdl.timeout.as_duration(),
                    request.url.clone(),
                ))
            }
        };

        Ok((backend, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"url":"https://x/1","chat_id":"c1","message_id":7,"from_user_id":9}"#;

    fn dispatcher(cobalt: bool, ytdl: bool) -> Dispatcher {
        let mut services = ServicesConfig::default();
        services.cobalt.enable = cobalt;
        services.ytdl.enable = ytdl;
        Dispatcher::new(Arc::new(services), Client::new())
    }

    #[test]
    fn test_topic_parsing() {
        assert_eq!("cobalt".parse::<Topic>().unwrap(), Topic::Cobalt);
        assert_eq!("ytdl".parse::<Topic>().unwrap(), Topic::Ytdl);
        assert!(matches!(
            "aria2".parse::<Topic>(),
            Err(DispatchError::UnsupportedTopic(t)) if t == "aria2"
        ));
    }

    #[test]
    fn test_dispatch_cobalt() {
        let (backend, request) = dispatcher(true, true).dispatch(BODY, "cobalt").unwrap();

        assert_eq!(request.message_id, 7);
        match backend {
            Backend::RemoteResolver(resolver) => assert_eq!(resolver.url(), "https://x/1"),
            other => panic!("expected remote resolver, got {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_ytdl() {
        let (backend, _) = dispatcher(true, true).dispatch(BODY, "ytdl").unwrap();

        assert_eq!(backend.name(), "ytdl");
        assert!(matches!(backend, Backend::LocalExtractor(ref e) if e.url() == "https://x/1"));
    }

    #[test]
    fn test_decode_error_wins_over_unknown_topic() {
        let result = dispatcher(true, true).dispatch(b"not json", "aria2");
        assert!(matches!(result, Err(DispatchError::Decode(_))));
    }

    #[test]
    fn test_unknown_topic() {
        let result = dispatcher(true, true).dispatch(BODY, "gallery-dl");
        assert!(matches!(result, Err(DispatchError::UnsupportedTopic(_))));
    }

    #[test]
    fn test_disabled_backend() {
        let result = dispatcher(true, false).dispatch(BODY, "ytdl");
        assert!(matches!(result, Err(DispatchError::BackendDisabled(Topic::Ytdl))));
    }
}
