//! Lead extracted from a conversation and the notification sent for it.
//!
//! The LLM fills the lead progressively across turns. Once name and contact are known the
//! lead is complete and a notification is posted to the automation webhook, at most once per
//! session within the retention window.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::lenient;

/// Placeholder for fields the visitor never mentioned.
pub const NOT_MENTIONED: &str = "não mencionado";

const NOTIFICATION_SOURCE: &str = "chatbot";

/// Contact and interest data gathered during a chat. Accepts snake_case and camelCase keys;
/// numbers and booleans are kept as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub contact: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", alias = "businessType")]
    pub business_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", alias = "currentSituation")]
    pub current_situation: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", alias = "mainNeed")]
    pub main_need: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub urgency: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub budget: Option<String>,
    #[serde(default, deserialize_with = "lenient::string", alias = "decisionMaker")]
    pub decision_maker: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub interest: Option<String>,
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl Lead {
    /// Name and contact are both present and non-blank.
    pub fn is_complete(&self) -> bool {
        present(&self.name) && present(&self.contact)
    }
}

/// Payload posted to the automation webhook for a lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadNotification {
    pub name: String,
    pub contact: String,
    pub business_type: String,
    pub current_situation: String,
    pub main_need: String,
    pub urgency: String,
    pub budget: String,
    pub decision_maker: String,
    pub interest: String,
    pub timestamp: String,
    pub source: String,
}

fn or_placeholder(field: &Option<String>) -> String {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(NOT_MENTIONED)
        .to_string()
}

impl LeadNotification {
    pub fn from_lead(lead: &Lead, now: DateTime<Utc>) -> Self {
        Self {
            name: or_placeholder(&lead.name),
            contact: or_placeholder(&lead.contact),
            business_type: or_placeholder(&lead.business_type),
            current_situation: or_placeholder(&lead.current_situation),
            main_need: or_placeholder(&lead.main_need),
            urgency: or_placeholder(&lead.urgency),
            budget: or_placeholder(&lead.budget),
            decision_maker: or_placeholder(&lead.decision_maker),
            interest: or_placeholder(&lead.interest),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            source: NOTIFICATION_SOURCE.to_string(),
        }
    }
}

/// Remembers which sessions already had their lead notified.
pub struct NotifiedLeads {
    inner: Mutex<HashMap<String, Instant>>,
    retention: Duration,
}

impl NotifiedLeads {
    pub fn new(retention: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Record the session and return true if it was not notified within the retention window.
    /// Expired records are pruned on every call.
    pub async fn first_notification(&self, session_id: &str) -> bool {
        let now = Instant::now();
        let mut g = self.inner.lock().await;
        g.retain(|_, at| now.duration_since(*at) < self.retention);
        if g.contains_key(session_id) {
            return false;
        }
        g.insert(session_id.to_string(), now);
        true
    }
}
