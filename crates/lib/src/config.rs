//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.agency-chat/config.json`) and environment.
//! Every section is optional; a missing file means defaults. Secrets and upstream URLs are
//! usually supplied through the environment and are only required when a request needs them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Hosted LLM provider used in direct mode.
    #[serde(default)]
    pub llm: LlmConfig,

    /// No-code automation webhook (chat forwarding and lead notifications).
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Relay behaviour: mode selection and retention windows.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Gateway bind, port, and public origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 15151).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Origin the automation webhook uses to reach us (e.g. "https://example.com").
    /// Overridden by PUBLIC_BASE_URL env. When absent the request's Host header is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
}

fn default_gateway_port() -> u16 {
    15151
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl GatewayConfig {
    /// `http://<bind>:<port>` for local clients; IPv6 literals are bracketed.
    pub fn local_url(&self) -> String {
        let bind = self.bind.trim();
        match bind.parse::<std::net::IpAddr>() {
            Ok(std::net::IpAddr::V6(_)) => format!("http://[{}]:{}", bind, self.port),
            _ => format!("http://{}:{}", bind, self.port),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            public_base_url: None,
        }
    }
}

/// LLM provider settings (Anthropic Messages API or a compatible endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// API key. Overridden by ANTHROPIC_API_KEY env. Direct mode is only available when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL (default https://api.anthropic.com). Overridden by ANTHROPIC_BASE_URL env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model id. Overridden by ANTHROPIC_MODEL env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Replaces the built-in system prompt. The model must still answer with the JSON reply shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_llm_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            system_prompt: None,
        }
    }
}

/// Automation webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationConfig {
    /// Webhook URL. Overridden by AUTOMATION_WEBHOOK_URL env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Deadline for forwarding a chat message.
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
    /// Deadline for posting a lead notification.
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
}

fn default_webhook_timeout_secs() -> u64 {
    25
}

fn default_notify_timeout_secs() -> u64 {
    5
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_webhook_timeout_secs(),
            notify_timeout_secs: default_notify_timeout_secs(),
        }
    }
}

/// Which integration answers chat messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Direct LLM when an API key is configured, else the webhook when its URL is configured.
    #[default]
    Auto,
    /// Always call the LLM provider.
    Llm,
    /// Always forward to the automation webhook.
    Webhook,
}

/// Relay mode and retention windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    #[serde(default)]
    pub mode: RelayMode,
    /// How long an unread callback reply is kept (default 300 s).
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    /// Window during which a session's lead is notified at most once (default 3600 s).
    #[serde(default = "default_lead_retention_secs")]
    pub lead_retention_secs: u64,
}

fn default_pending_ttl_secs() -> u64 {
    300
}

fn default_lead_retention_secs() -> u64 {
    3600
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::default(),
            pending_ttl_secs: default_pending_ttl_secs(),
            lead_retention_secs: default_lead_retention_secs(),
        }
    }
}

/// Read a non-blank env var, trimmed.
fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| non_blank(&s))
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Env value wins over the config value; blank values on either side count as absent.
fn env_or(key: &str, configured: Option<&String>) -> Option<String> {
    env_non_empty(key).or_else(|| configured.and_then(|s| non_blank(s)))
}

/// Resolve the LLM API key: env ANTHROPIC_API_KEY overrides config.
pub fn resolve_llm_api_key(config: &Config) -> Option<String> {
    env_or("ANTHROPIC_API_KEY", config.llm.api_key.as_ref())
}

/// Resolve the LLM base URL: env ANTHROPIC_BASE_URL overrides config.
pub fn resolve_llm_base_url(config: &Config) -> Option<String> {
    env_or("ANTHROPIC_BASE_URL", config.llm.base_url.as_ref())
}

/// Resolve the LLM model: env ANTHROPIC_MODEL overrides config.
pub fn resolve_llm_model(config: &Config) -> Option<String> {
    env_or("ANTHROPIC_MODEL", config.llm.model.as_ref())
}

/// Resolve the automation webhook URL: env AUTOMATION_WEBHOOK_URL overrides config.
pub fn resolve_webhook_url(config: &Config) -> Option<String> {
    env_or("AUTOMATION_WEBHOOK_URL", config.automation.webhook_url.as_ref())
}

/// Resolve the public origin used for callback URLs: env PUBLIC_BASE_URL overrides config.
pub fn resolve_public_base_url(config: &Config) -> Option<String> {
    env_or("PUBLIC_BASE_URL", config.gateway.public_base_url.as_ref())
}

/// Fold environment overrides into the config so the rest of the crate reads one source.
pub fn apply_env_overrides(config: &mut Config) {
    config.llm.api_key = resolve_llm_api_key(config);
    config.llm.base_url = resolve_llm_base_url(config);
    config.llm.model = resolve_llm_model(config);
    config.automation.webhook_url = resolve_webhook_url(config);
    config.gateway.public_base_url = resolve_public_base_url(config);
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("AGENCY_CHAT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".agency-chat").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Environment overrides are applied before returning. Returns the config and the path used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config);
    Ok((config, path))
}
