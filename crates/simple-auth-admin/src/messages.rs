//! One-time notifications carried in the session.
//!
//! Views add messages before redirecting; the next admin page drains and
//! shows them. Messages live under the `_messages` session key as a JSON
//! array, so they survive the redirect.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use simple_auth_core::AuthResult;
use simple_auth_http::HttpRequest;

/// Session key holding pending messages.
pub const MESSAGES_SESSION_KEY: &str = "_messages";

/// The severity of a message, with the usual numeric levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Debug = 10,
    Info = 20,
    Success = 25,
    Warning = 30,
    Error = 40,
}

impl MessageLevel {
    /// Returns the CSS tag class for this level.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub level: MessageLevel,
    pub text: String,
    /// Space-separated CSS class tags.
    pub tags: String,
}

impl Message {
    pub fn new(level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            tags: level.tag().to_string(),
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Queues a message in the request's session.
pub async fn add_message(
    request: &HttpRequest,
    level: MessageLevel,
    text: impl Into<String>,
) -> AuthResult<()> {
    let session = request.require_session()?;
    let mut pending = stored(session.get(MESSAGES_SESSION_KEY).await);
    pending.push(Message::new(level, text));
    session
        .set(MESSAGES_SESSION_KEY, serde_json::to_value(&pending).unwrap_or(Value::Null))
        .await;
    Ok(())
}

pub async fn success(request: &HttpRequest, text: impl Into<String>) -> AuthResult<()> {
    add_message(request, MessageLevel::Success, text).await
}

pub async fn warning(request: &HttpRequest, text: impl Into<String>) -> AuthResult<()> {
    add_message(request, MessageLevel::Warning, text).await
}

pub async fn error(request: &HttpRequest, text: impl Into<String>) -> AuthResult<()> {
    add_message(request, MessageLevel::Error, text).await
}

/// Drains the pending messages. Requests without a session have none.
pub async fn get_messages(request: &HttpRequest) -> Vec<Message> {
    let Some(session) = request.session() else {
        return Vec::new();
    };
    stored(session.remove(MESSAGES_SESSION_KEY).await)
}

fn stored(value: Option<Value>) -> Vec<Message> {
    value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use simple_auth_http::Session;

    use super::*;

    fn request() -> HttpRequest {
        let mut request = HttpRequest::builder().build();
        request.set_session(Session::new_empty(60));
        request
    }

    #[test]
    fn test_message_level_tag_and_order() {
        assert_eq!(MessageLevel::Error.tag(), "error");
        assert_eq!(MessageLevel::Success.to_string(), "success");
        assert!(MessageLevel::Info < MessageLevel::Warning);
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::new(MessageLevel::Error, "You can only log-in as one user!");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["tags"], "error");
        assert_eq!(msg.to_string(), "You can only log-in as one user!");
    }

    #[tokio::test]
    async fn test_messages_queue_and_drain() {
        let request = request();
        success(&request, "Saved.").await.unwrap();
        error(&request, "Failed.").await.unwrap();

        let messages = get_messages(&request).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].level, MessageLevel::Success);
        assert_eq!(messages[1].text, "Failed.");
        assert!(get_messages(&request).await.is_empty());
    }

    #[tokio::test]
    async fn test_messages_survive_in_shared_session() {
        let request = request();
        warning(&request, "Careful.").await.unwrap();

        let mut next = HttpRequest::builder().build();
        next.set_session(request.session().unwrap().clone());
        assert_eq!(get_messages(&next).await[0].text, "Careful.");
    }

    #[tokio::test]
    async fn test_without_session() {
        let request = HttpRequest::builder().build();
        assert!(add_message(&request, MessageLevel::Info, "x").await.is_err());
        assert!(get_messages(&request).await.is_empty());
    }
}
