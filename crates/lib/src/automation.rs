//! Automation webhook: forwards chat messages and lead notifications to a no-code workflow.
//!
//! A forwarded message may be answered inline (2xx JSON with `response` or `message`) or later
//! through the callback URL we pass along.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lead::LeadNotification;
use crate::lenient;
use crate::pending::{Button, PendingReply};

#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned {0}")]
    Status(reqwest::StatusCode),
}

/// Body posted to the webhook for a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardedMessage {
    pub message: String,
    pub session_id: String,
    pub callback_url: String,
}

/// Reply body as produced by the workflow, inline or through the callback.
/// `response` is the workflow's current field name; `message` is still accepted.
/// Loosely typed fields never reject the body: malformed buttons are dropped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReply {
    #[serde(default, deserialize_with = "lenient::string")]
    pub response: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient::items")]
    pub buttons: Option<Vec<Button>>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub session_id: Option<String>,
}

impl WorkflowReply {
    /// Reply text with `response` taking precedence; blank text counts as absent.
    pub fn text(&self) -> Option<&str> {
        [self.response.as_deref(), self.message.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// Parse a raw body. Anything that is not a JSON object carries no reply.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(reply) => reply,
            Err(e) => {
                log::debug!("workflow body is not a reply object: {}", e);
                Self::default()
            }
        }
    }

    pub fn into_pending_reply(self) -> Option<PendingReply> {
        let message = self.text()?.to_string();
        Some(PendingReply {
            message,
            buttons: self.buttons,
        })
    }
}

/// Outbound side of the automation integration.
#[async_trait]
pub trait AutomationHook: Send + Sync {
    /// Forward a chat message. `Some` when the workflow answered inline.
    async fn forward(&self, msg: &ForwardedMessage) -> Result<Option<PendingReply>, AutomationError>;

    /// Post a lead notification.
    async fn notify_lead(&self, lead: &LeadNotification) -> Result<(), AutomationError>;
}

/// HTTP client for the configured webhook URL.
#[derive(Clone)]
pub struct AutomationWebhook {
    url: String,
    client: reqwest::Client,
    notify_client: reqwest::Client,
}

impl AutomationWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration, notify_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            notify_client: reqwest::Client::builder()
                .timeout(notify_timeout)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl AutomationHook for AutomationWebhook {
    async fn forward(&self, msg: &ForwardedMessage) -> Result<Option<PendingReply>, AutomationError> {
        let res = self.client.post(&self.url).json(msg).send().await?;
        if !res.status().is_success() {
            return Err(AutomationError::Status(res.status()));
        }
        // Anything that is not a reply body (empty, plain "Accepted", JSON without text) means
        // the answer will come through the callback.
        let body = res.bytes().await?;
        Ok(WorkflowReply::from_body(&body).into_pending_reply())
    }

    async fn notify_lead(&self, lead: &LeadNotification) -> Result<(), AutomationError> {
        let res = self.notify_client.post(&self.url).json(lead).send().await?;
        if !res.status().is_success() {
            return Err(AutomationError::Status(res.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_field_wins_over_message() {
        let r: WorkflowReply =
            serde_json::from_str(r#"{"response":"from response","message":"from message"}"#)
                .unwrap();
        assert_eq!(r.text(), Some("from response"));
    }

    #[test]
    fn legacy_message_field_accepted() {
        let r: WorkflowReply = serde_json::from_str(r#"{"message":"legacy"}"#).unwrap();
        assert_eq!(r.text(), Some("legacy"));
    }

    #[test]
    fn blank_response_falls_back_to_message() {
        let r: WorkflowReply =
            serde_json::from_str(r#"{"response":"  ","message":"fallback"}"#).unwrap();
        assert_eq!(r.text(), Some("fallback"));
    }

    #[test]
    fn no_text_is_no_reply() {
        let r: WorkflowReply = serde_json::from_str(r#"{"buttons":[]}"#).unwrap();
        assert!(r.into_pending_reply().is_none());
    }

    #[test]
    fn loosely_typed_fields_keep_the_text() {
        let r = WorkflowReply::from_body(br#"{"response":"Ola!","buttons":"","sessionId":42}"#);
        assert_eq!(r.session_id.as_deref(), Some("42"));
        let reply = r.into_pending_reply().expect("reply");
        assert_eq!(reply.message, "Ola!");
        assert_eq!(reply.buttons, None);
    }

    #[test]
    fn malformed_buttons_are_dropped() {
        let r = WorkflowReply::from_body(
            br#"{"message":"Pick one","buttons":[{"label":"WhatsApp","action":"whatsapp"},{"label":"no action"}]}"#,
        );
        let buttons = r.into_pending_reply().and_then(|p| p.buttons).expect("buttons");
        assert_eq!(buttons.len(), 1);
        assert_eq!(buttons[0].action, "whatsapp");
    }

    #[test]
    fn plain_text_body_carries_no_reply() {
        assert!(WorkflowReply::from_body(b"Accepted").into_pending_reply().is_none());
    }

    #[test]
    fn forwarded_message_is_camel_case() {
        let m = ForwardedMessage {
            message: "hi".to_string(),
            session_id: "s1".to_string(),
            callback_url: "http://x/chat/response?sessionId=s1".to_string(),
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["sessionId"], "s1");
        assert_eq!(v["callbackUrl"], "http://x/chat/response?sessionId=s1");
    }
}
