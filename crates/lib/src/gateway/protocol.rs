//! Gateway HTTP wire types shared by the server and the polling client.

use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchOutcome;
use crate::pending::{Button, PendingReply};

fn is_false(b: &bool) -> bool {
    !*b
}

/// Response of `POST /chat` and `GET /chat/response`: either a message or `pending: true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Vec<Button>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub pending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub lead_ready: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub goodbye: bool,
}

impl ChatResponse {
    /// Poll answer while the reply is still in flight.
    pub fn still_pending() -> Self {
        Self {
            pending: true,
            ..Self::default()
        }
    }

    /// The reply, if this response carries a non-blank message.
    pub fn reply(&self) -> Option<PendingReply> {
        let message = self.message.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(PendingReply {
            message: message.to_string(),
            buttons: self.buttons.clone(),
        })
    }
}

impl From<DispatchOutcome> for ChatResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Reply(r) => Self {
                message: Some(r.message),
                buttons: r.buttons,
                pending: false,
                session_id: Some(r.session_id),
                lead_ready: r.lead_ready,
                goodbye: r.goodbye,
            },
            DispatchOutcome::Pending { session_id } => Self {
                pending: true,
                session_id: Some(session_id),
                ..Self::default()
            },
        }
    }
}

impl From<PendingReply> for ChatResponse {
    fn from(reply: PendingReply) -> Self {
        Self {
            message: Some(reply.message),
            buttons: reply.buttons,
            ..Self::default()
        }
    }
}

/// `?sessionId=` query of the callback and poll endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `{ "ok": true }` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// `{ "error": "..." }` body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ChatReply;
    use serde_json::json;

    #[test]
    fn pending_outcome_wire() {
        let r: ChatResponse = DispatchOutcome::Pending {
            session_id: "s1".to_string(),
        }
        .into();
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({ "pending": true, "sessionId": "s1" })
        );
    }

    #[test]
    fn reply_outcome_wire_omits_false_flags() {
        let r: ChatResponse = DispatchOutcome::Reply(ChatReply {
            message: "hi".to_string(),
            buttons: None,
            session_id: "s1".to_string(),
            lead_ready: false,
            goodbye: true,
        })
        .into();
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({ "message": "hi", "sessionId": "s1", "goodbye": true })
        );
    }

    #[test]
    fn still_pending_wire() {
        assert_eq!(
            serde_json::to_value(ChatResponse::still_pending()).unwrap(),
            json!({ "pending": true })
        );
    }

    #[test]
    fn blank_message_is_not_a_reply() {
        let r: ChatResponse = serde_json::from_value(json!({ "message": " " })).unwrap();
        assert!(r.reply().is_none());
    }
}
