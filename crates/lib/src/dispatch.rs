//! Chat dispatcher: validates a visitor's message and gets it answered.
//!
//! Direct LLM mode answers synchronously from the hosted model, which replies with a JSON
//! object that may carry a lead. Webhook mode forwards the message to the automation workflow,
//! which answers inline or later through the callback endpoint (the client then polls).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::automation::{AutomationHook, AutomationWebhook, ForwardedMessage};
use crate::config::{Config, RelayMode};
use crate::error::RelayError;
use crate::lead::{Lead, LeadNotification, NotifiedLeads};
use crate::lenient;
use crate::llm::{AnthropicClient, LlmProvider};
use crate::pending::Button;
use crate::session::ChatMessage;

/// Shown when the model produced nothing usable.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, I couldn't put together an answer just now. Could you say that again in a moment?";

/// Built-in system prompt for direct mode. Must keep the JSON reply contract.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are the friendly support assistant of a digital-services agency that builds websites, online stores, automations and AI assistants for small businesses.
Answer in the visitor's language, in at most three short sentences, and ask one question at a time.
While talking, learn the visitor's name, how to contact them (email or phone), their type of business, current situation, main need, urgency, budget, and whether they decide on the purchase.
Never invent prices or promises; offer a free diagnosis call instead.

Always reply with a single JSON object and nothing else:
{"message": "<your reply to the visitor>",
 "lead": {"name": null, "contact": null, "business_type": null, "current_situation": null, "main_need": null, "urgency": null, "budget": null, "decision_maker": null, "interest": null},
 "leadReady": false,
 "goodbye": false}
Fill lead fields as you learn them and repeat known values every turn. Set "leadReady" to true once name and contact are known. Set "goodbye" to true when the visitor ends the conversation."#;

/// Body of `POST /chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Prior turns kept by the client; only used in direct LLM mode.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatMessage>,
}

/// A reply available right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub message: String,
    pub buttons: Option<Vec<Button>>,
    pub session_id: String,
    pub lead_ready: bool,
    pub goodbye: bool,
}

/// Result of dispatching one message: a reply, or a marker telling the client to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Reply(ChatReply),
    Pending { session_id: String },
}

/// Integration that answers the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveMode {
    DirectLlm,
    Webhook,
}

impl ActiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveMode::DirectLlm => "llm",
            ActiveMode::Webhook => "webhook",
        }
    }
}

/// Shape the model is asked to answer with. Fields of the wrong shape decode as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructuredReply {
    #[serde(default, deserialize_with = "lenient::string")]
    message: Option<String>,
    #[serde(default, deserialize_with = "lenient::best_effort")]
    lead: Option<Lead>,
    #[serde(default, deserialize_with = "lenient::flag", alias = "lead_ready")]
    lead_ready: Option<bool>,
    #[serde(default, deserialize_with = "lenient::flag")]
    goodbye: Option<bool>,
}

/// What the dispatcher makes of one raw model answer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ModelTurn {
    message: String,
    lead: Option<Lead>,
    lead_ready: bool,
    goodbye: bool,
}

/// Cut the JSON object out of a model answer that may be fenced or wrapped in prose.
fn json_candidate(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(start) = s.find("```") {
        let after = &s[start + 3..];
        // Skip the info string (e.g. "json") up to the end of the fence line.
        let body = after.find('\n').map(|i| &after[i + 1..]).unwrap_or(after);
        s = body.find("```").map(|end| &body[..end]).unwrap_or(body).trim();
    }
    match (s.find('{'), s.rfind('}')) {
        (Some(a), Some(b)) if a < b => &s[a..=b],
        _ => s,
    }
}

fn parse_structured_reply(raw: &str) -> Result<StructuredReply, serde_json::Error> {
    serde_json::from_str(json_candidate(raw))
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Turn raw model output into a reply. Never yields a blank message.
fn interpret_model_output(raw: &str) -> ModelTurn {
    match parse_structured_reply(raw) {
        Ok(reply) => ModelTurn {
            message: non_blank(reply.message.as_deref())
                .unwrap_or(APOLOGY_MESSAGE)
                .to_string(),
            lead: reply.lead,
            lead_ready: reply.lead_ready.unwrap_or(false),
            goodbye: reply.goodbye.unwrap_or(false),
        },
        Err(e) => {
            log::debug!("model output is not the JSON reply shape ({}), using raw text", e);
            ModelTurn {
                message: non_blank(Some(raw)).unwrap_or(APOLOGY_MESSAGE).to_string(),
                lead: None,
                lead_ready: false,
                goodbye: false,
            }
        }
    }
}

/// `<base>/chat/response?sessionId=<id>`, keeping any path prefix of the base URL.
fn callback_url(base: &str, session_id: &str) -> Result<String, RelayError> {
    let mut url = reqwest::Url::parse(base.trim())
        .map_err(|e| RelayError::configuration(format!("invalid public base URL {}: {}", base, e)))?;
    let path = format!("{}/chat/response", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("sessionId", session_id);
    Ok(url.to_string())
}

/// Answers chat messages through the configured integration.
pub struct Dispatcher {
    mode: RelayMode,
    llm: Option<Arc<dyn LlmProvider>>,
    automation: Option<Arc<dyn AutomationHook>>,
    public_base_url: Option<String>,
    system_prompt: String,
    notified: Arc<NotifiedLeads>,
}

impl Dispatcher {
    /// A dispatcher with no integrations; add them with the `with_*` methods.
    pub fn new(mode: RelayMode) -> Self {
        Self {
            mode,
            llm: None,
            automation: None,
            public_base_url: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            notified: Arc::new(NotifiedLeads::new(Duration::from_secs(3600))),
        }
    }

    /// Build clients for whatever the config provides. Missing pieces surface per request.
    pub fn from_config(config: &Config) -> Self {
        let mut d = Self::new(config.relay.mode)
            .with_lead_retention(Duration::from_secs(config.relay.lead_retention_secs));
        if let Some(key) = config.llm.api_key.clone() {
            let client = AnthropicClient::new(
                key,
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.max_tokens,
                Duration::from_secs(config.llm.timeout_secs),
            );
            log::info!("llm provider configured (model {})", client.model());
            d = d.with_llm(Arc::new(client));
        }
        if let Some(url) = config.automation.webhook_url.clone() {
            let hook = AutomationWebhook::new(
                url,
                Duration::from_secs(config.automation.timeout_secs),
                Duration::from_secs(config.automation.notify_timeout_secs),
            );
            log::info!("automation webhook configured");
            d = d.with_automation(Arc::new(hook));
        }
        if let Some(base) = config.gateway.public_base_url.clone() {
            d = d.with_public_base_url(base);
        }
        if let Some(prompt) = config.llm.system_prompt.clone() {
            d = d.with_system_prompt(prompt);
        }
        d
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_automation(mut self, hook: Arc<dyn AutomationHook>) -> Self {
        self.automation = Some(hook);
        self
    }

    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_lead_retention(mut self, retention: Duration) -> Self {
        self.notified = Arc::new(NotifiedLeads::new(retention));
        self
    }

    pub fn has_automation(&self) -> bool {
        self.automation.is_some()
    }

    /// Resolve which integration answers, or fail when the needed one is not configured.
    pub fn active_mode(&self) -> Result<ActiveMode, RelayError> {
        match self.mode {
            RelayMode::Llm if self.llm.is_some() => Ok(ActiveMode::DirectLlm),
            RelayMode::Llm => Err(RelayError::configuration(
                "LLM API key is not configured (set ANTHROPIC_API_KEY)",
            )),
            RelayMode::Webhook if self.automation.is_some() => Ok(ActiveMode::Webhook),
            RelayMode::Webhook => Err(RelayError::configuration(
                "automation webhook URL is not configured (set AUTOMATION_WEBHOOK_URL)",
            )),
            RelayMode::Auto if self.llm.is_some() => Ok(ActiveMode::DirectLlm),
            RelayMode::Auto if self.automation.is_some() => Ok(ActiveMode::Webhook),
            RelayMode::Auto => Err(RelayError::configuration(
                "no chat integration configured (set ANTHROPIC_API_KEY or AUTOMATION_WEBHOOK_URL)",
            )),
        }
    }

    /// Handle one chat message. `origin` is the request's own origin, used for the callback
    /// URL when no public base URL is configured.
    pub async fn dispatch(
        &self,
        req: ChatRequest,
        origin: Option<&str>,
    ) -> Result<DispatchOutcome, RelayError> {
        let (message, session_id) = match (
            non_blank(req.message.as_deref()),
            non_blank(req.session_id.as_deref()),
        ) {
            (Some(m), Some(s)) => (m.to_string(), s.to_string()),
            _ => return Err(RelayError::validation("message and sessionId are required")),
        };

        let result = match self.active_mode()? {
            ActiveMode::DirectLlm => self
                .reply_from_llm(session_id, message, req.history)
                .await
                .map(DispatchOutcome::Reply),
            ActiveMode::Webhook => self.forward_to_webhook(session_id, message, origin).await,
        };
        if let Err(ref e) = result {
            log::warn!("chat dispatch failed: {}", e);
        }
        result
    }

    async fn reply_from_llm(
        &self,
        session_id: String,
        message: String,
        mut history: Vec<ChatMessage>,
    ) -> Result<ChatReply, RelayError> {
        let Some(llm) = self.llm.as_ref() else {
            return Err(RelayError::configuration("LLM API key is not configured"));
        };
        history.push(ChatMessage::user(message));
        let raw = llm.complete(&self.system_prompt, &history).await?;
        let turn = interpret_model_output(&raw);
        if let Some(lead) = turn.lead.filter(Lead::is_complete) {
            self.spawn_lead_notification(session_id.clone(), lead);
        }
        Ok(ChatReply {
            message: turn.message,
            buttons: None,
            session_id,
            lead_ready: turn.lead_ready,
            goodbye: turn.goodbye,
        })
    }

    async fn forward_to_webhook(
        &self,
        session_id: String,
        message: String,
        origin: Option<&str>,
    ) -> Result<DispatchOutcome, RelayError> {
        let Some(hook) = self.automation.as_ref() else {
            return Err(RelayError::configuration(
                "automation webhook URL is not configured",
            ));
        };
        let base = self.public_base_url.as_deref().or(origin).ok_or_else(|| {
            RelayError::configuration("public base URL is not configured (set PUBLIC_BASE_URL)")
        })?;
        let forwarded = ForwardedMessage {
            callback_url: callback_url(base, &session_id)?,
            message,
            session_id,
        };
        match hook.forward(&forwarded).await? {
            Some(reply) => Ok(DispatchOutcome::Reply(ChatReply {
                message: reply.message,
                buttons: reply.buttons,
                session_id: forwarded.session_id,
                lead_ready: false,
                goodbye: false,
            })),
            None => {
                log::debug!(
                    "webhook accepted message for session {}, awaiting callback",
                    forwarded.session_id
                );
                Ok(DispatchOutcome::Pending {
                    session_id: forwarded.session_id,
                })
            }
        }
    }

    /// Post a lead notification in the background, once per session. Failures are logged only.
    fn spawn_lead_notification(&self, session_id: String, lead: Lead) {
        let Some(hook) = self.automation.clone() else {
            log::debug!("lead complete for session {} but no webhook to notify", session_id);
            return;
        };
        let notified = self.notified.clone();
        tokio::spawn(async move {
            if !notified.first_notification(&session_id).await {
                return;
            }
            let payload = LeadNotification::from_lead(&lead, Utc::now());
            match hook.notify_lead(&payload).await {
                Ok(()) => log::info!("lead notification sent for session {}", session_id),
                Err(e) => log::warn!("lead notification for session {} failed: {}", session_id, e),
            }
        });
    }

    /// Forward a lead submitted directly by the client (`POST /notify`).
    pub async fn notify_lead(&self, lead: &Lead) -> Result<(), RelayError> {
        let Some(hook) = self.automation.as_ref() else {
            return Err(RelayError::configuration(
                "automation webhook URL is not configured",
            ));
        };
        let payload = LeadNotification::from_lead(lead, Utc::now());
        hook.notify_lead(&payload).await.map_err(|e| {
            log::warn!("lead notification failed: {}", e);
            RelayError::from(e)
        })
    }
}
