//! Relay client: sends chat turns to the gateway and polls for late replies.
//!
//! One turn goes `Sent -> (synchronous reply | pending)`, and a pending turn goes through the
//! poll loop to `Replied` or `TimedOut`. A failed send ends the turn as `Errored`. Timed-out
//! and errored turns render a fallback message so the visitor never sees a blank answer; only
//! replied turns enter the conversation history.

mod poller;

use async_trait::async_trait;
use std::time::Duration;

use crate::dispatch::ChatRequest;
use crate::gateway::ChatResponse;
use crate::pending::PendingReply;
use crate::session::{generate_session_id, ChatMessage, SessionId};

pub use poller::{
    PollOutcome, Poller, ReplySource, Sleeper, TokioSleeper, MAX_POLL_ATTEMPTS, POLL_INTERVAL,
};

/// Rendered when no reply could be obtained.
pub const FALLBACK_MESSAGE: &str =
    "Sorry, I can't answer right now. Please try again in a moment or reach us on WhatsApp.";

/// Slightly above the relay's own upstream deadline.
const SEND_TIMEOUT: Duration = Duration::from_secs(35);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("relay request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("relay returned status {0}")]
    Status(u16),
}

/// Transport to the relay: send a message, and (via [`ReplySource`]) fetch pending replies.
#[async_trait]
pub trait RelayTransport: ReplySource {
    async fn send_message(&self, req: &ChatRequest) -> Result<ChatResponse, ClientError>;
}

/// HTTP client for a running gateway.
#[derive(Clone)]
pub struct RelayClient {
    base_url: String,
    client: reqwest::Client,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RelayTransport for RelayClient {
    /// POST /chat
    async fn send_message(&self, req: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let url = format!("{}/chat", self.base_url);
        let res = self.client.post(&url).json(req).send().await?;
        if !res.status().is_success() {
            return Err(ClientError::Status(res.status().as_u16()));
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl ReplySource for RelayClient {
    /// GET /chat/response?sessionId=
    async fn fetch_reply(&self, session_id: &str) -> Result<Option<PendingReply>, ClientError> {
        let url = format!("{}/chat/response", self.base_url);
        let res = self
            .client
            .get(&url)
            .query(&[("sessionId", session_id)])
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ClientError::Status(res.status().as_u16()));
        }
        let body: ChatResponse = res.json().await?;
        Ok(body.reply())
    }
}

/// How a reply reached the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPath {
    Synchronous,
    Polled,
}

/// Terminal state of one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Replied {
        reply: PendingReply,
        path: ReplyPath,
        lead_ready: bool,
        goodbye: bool,
    },
    TimedOut,
    Errored(String),
}

impl TurnOutcome {
    /// Text to show the visitor.
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::Replied { reply, .. } => &reply.message,
            TurnOutcome::TimedOut | TurnOutcome::Errored(_) => FALLBACK_MESSAGE,
        }
    }
}

/// Client-side conversation: session id plus the history sent along with each turn.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: SessionId,
    history: Vec<ChatMessage>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_id(generate_session_id())
    }

    pub fn with_id(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Run one turn: send, poll if the relay says pending, and record both sides in history
    /// once a reply arrived.
    pub async fn send<S: Sleeper>(
        &mut self,
        transport: &dyn RelayTransport,
        poller: &Poller<S>,
        text: &str,
    ) -> TurnOutcome {
        let req = ChatRequest {
            message: Some(text.to_string()),
            session_id: Some(self.id.clone()),
            history: self.history.clone(),
        };
        let outcome = match transport.send_message(&req).await {
            Err(e) => {
                log::warn!("chat send failed: {}", e);
                TurnOutcome::Errored(e.to_string())
            }
            Ok(resp) => match resp.reply() {
                Some(reply) => TurnOutcome::Replied {
                    reply,
                    path: ReplyPath::Synchronous,
                    lead_ready: resp.lead_ready,
                    goodbye: resp.goodbye,
                },
                None if resp.pending => {
                    let session_id = resp.session_id.as_deref().unwrap_or(&self.id);
                    match poller.poll(transport, session_id).await {
                        PollOutcome::Replied(reply) => TurnOutcome::Replied {
                            reply,
                            path: ReplyPath::Polled,
                            lead_ready: false,
                            goodbye: false,
                        },
                        PollOutcome::TimedOut => TurnOutcome::TimedOut,
                    }
                }
                None => TurnOutcome::Errored("relay answered neither a message nor pending".to_string()),
            },
        };
        // Only replied turns enter history; the fallback text is display-only.
        if let TurnOutcome::Replied { reply, .. } = &outcome {
            self.history.push(ChatMessage::user(text));
            self.history.push(ChatMessage::assistant(reply.message.clone()));
        }
        outcome
    }
}
