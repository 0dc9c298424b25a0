//! Relay error taxonomy. Each class maps to one HTTP status at the gateway.

use crate::automation::AutomationError;
use crate::llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed or missing client input (400).
    #[error("{0}")]
    Validation(String),
    /// A required secret or upstream URL is not configured (500).
    #[error("{0}")]
    Configuration(String),
    /// LLM provider or webhook unreachable, timed out, or non-2xx (502).
    #[error("{0}")]
    Upstream(String),
}

impl RelayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Configuration(_) => 500,
            Self::Upstream(_) => 502,
        }
    }
}

impl From<LlmError> for RelayError {
    fn from(e: LlmError) -> Self {
        Self::Upstream(format!("could not get a reply from the language model: {}", e))
    }
}

impl From<AutomationError> for RelayError {
    fn from(e: AutomationError) -> Self {
        Self::Upstream(format!("could not reach the automation webhook: {}", e))
    }
}
