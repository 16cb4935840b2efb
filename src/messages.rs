//! Wire types exchanged with the bot over the broker

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed request body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request chat_id is empty")]
    EmptyChatId,
    #[error("request url '{0}' is not an http/https url")]
    InvalidUrl(String),
}

/// Download request published by the bot.
///
/// Unknown fields are ignored. The bot sends `null` for `chat_title` in
/// private chats and for `from_user_id` on anonymous channel posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRequest {
    pub chat_id: String,
    #[serde(default)]
    pub chat_title: Option<String>,
    pub message_id: i64,
    #[serde(default)]
    pub from_user_id: Option<i64>,
    pub url: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub replied_message_id: Option<i64>,
}

impl InboundRequest {
    /// Parse and validate a delivery body
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        let request: InboundRequest = serde_json::from_slice(body)?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<(), DecodeError> {
        if self.chat_id.trim().is_empty() {
            return Err(DecodeError::EmptyChatId);
        }

        let valid = url::Url::parse(&self.url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false);
        if !valid {
            return Err(DecodeError::InvalidUrl(self.url.clone()));
        }

        Ok(())
    }
}

/// Non-empty, ordered list of media links produced by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResolvedLinks(Vec<String>);

impl ResolvedLinks {
    /// Returns `None` for an empty list; an empty result is never a success.
    pub fn new(links: Vec<String>) -> Option<Self> {
        if links.is_empty() {
            None
        } else {
            Some(Self(links))
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

/// Event published once per successfully resolved request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessEvent {
    pub links: Vec<String>,
    pub chat_id: String,
    pub chat_title: Option<String>,
    pub message_id: i64,
    pub from_user_id: Option<i64>,
    pub replied_message_id: Option<i64>,
}

impl SuccessEvent {
    pub fn new(request: &InboundRequest, links: ResolvedLinks) -> Self {
        Self {
            links: links.into_inner(),
            chat_id: request.chat_id.clone(),
            chat_title: request.chat_title.clone(),
            message_id: request.message_id,
            from_user_id: request.from_user_id,
            replied_message_id: request.replied_message_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_minimal_request() {
        let body = br#"{"url":"https://x/1","chat_id":"c1","message_id":7,"from_user_id":9}"#;
        let request = InboundRequest::from_slice(body).unwrap();

        assert_eq!(request.chat_id, "c1");
        assert_eq!(request.message_id, 7);
        assert_eq!(request.from_user_id, Some(9));
        assert_eq!(request.chat_title, None);
        assert_eq!(request.replied_message_id, None);
    }

    #[test]
    fn test_decode_full_request_ignores_unknown_fields() {
        let body = json!({
            "chat_id": "-100123",
            "chat_title": "memes",
            "message_id": 42,
            "from_user_id": null,
            "url": "https://www.instagram.com/p/abc/",
            "timestamp": "1718000000",
            "replied_message_id": 43,
            "priority": "high"
        });
        let request = InboundRequest::from_slice(body.to_string().as_bytes()).unwrap();

        assert_eq!(request.chat_title.as_deref(), Some("memes"));
        assert_eq!(request.from_user_id, None);
        assert_eq!(request.timestamp.as_deref(), Some("1718000000"));
        assert_eq!(request.replied_message_id, Some(43));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(matches!(
            InboundRequest::from_slice(b"{not json"),
            Err(DecodeError::Json(_))
        ));
        // message_id is required
        assert!(matches!(
            InboundRequest::from_slice(br#"{"url":"https://x/1","chat_id":"c1"}"#),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_url_and_chat() {
        assert!(matches!(
            InboundRequest::from_slice(br#"{"url":"not a url","chat_id":"c1","message_id":1}"#),
            Err(DecodeError::InvalidUrl(_))
        ));
        assert!(matches!(
            InboundRequest::from_slice(br#"{"url":"file:///etc/passwd","chat_id":"c1","message_id":1}"#),
            Err(DecodeError::InvalidUrl(_))
        ));
        assert!(matches!(
            InboundRequest::from_slice(br#"{"url":"https://x/1","chat_id":"","message_id":1}"#),
            Err(DecodeError::EmptyChatId)
        ));
    }

    #[test]
    fn test_resolved_links_never_empty() {
        assert!(ResolvedLinks::new(vec![]).is_none());

        let links = ResolvedLinks::new(vec!["https://cdn/1".into(), "https://cdn/2".into()]).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links.as_slice()[1], "https://cdn/2");
    }

    #[test]
    fn test_success_event_shape() {
        let request = InboundRequest::from_slice(
            br#"{"url":"https://x/1","chat_id":"c1","message_id":7,"from_user_id":9}"#,
        )
        .unwrap();
        let links = ResolvedLinks::new(vec!["https://cdn/1.mp4".into()]).unwrap();

        let event = SuccessEvent::new(&request, links);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(
            value,
            json!({
                "links": ["https://cdn/1.mp4"],
                "chat_id": "c1",
                "chat_title": null,
                "message_id": 7,
                "from_user_id": 9,
                "replied_message_id": null
            })
        );
    }
}
