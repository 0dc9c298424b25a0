//! Chat session identity and message history.
//!
//! A session id scopes one conversation for the lifetime of a client (e.g. a browser tab).
//! History lives on the client; the relay never persists it.

use serde::{Deserialize, Serialize};

/// Unique session identifier (opaque string).
pub type SessionId = String;

const SUFFIX_LEN: usize = 7;

/// Generate a session id: `<unix millis>-<7 lowercase alphanumerics>`.
/// Unique enough for concurrent visitors; not a secret.
pub fn generate_session_id() -> SessionId {
    let millis = chrono::Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", millis, &random[..SUFFIX_LEN])
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_shape() {
        let id = generate_session_id();
        let (millis, suffix) = id.split_once('-').expect("dash separator");
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn session_ids_differ() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
    }

    #[test]
    fn message_wire_format() {
        let m = ChatMessage::assistant("hello");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v, serde_json::json!({ "role": "assistant", "content": "hello" }));
    }
}
