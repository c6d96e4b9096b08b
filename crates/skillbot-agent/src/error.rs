use thiserror::Error;

/// Failure of the external model capability.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Unavailable(String),
    #[error("model API returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),
}

/// Terminal failure of one agent invocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    #[error("step budget of {max_steps} exhausted without a final answer")]
    BudgetExceeded { max_steps: usize },
    #[error("model requested unknown tool '{0}' twice in a row")]
    RepeatedUnknownTool(String),
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("invocation cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::BudgetExceeded { .. } => "budget_exceeded",
            AgentError::RepeatedUnknownTool(_) => "repeated_unknown_tool",
            AgentError::ModelUnavailable(_) => "model_unavailable",
            AgentError::Cancelled => "cancelled",
        }
    }
}

impl From<ModelError> for AgentError {
    fn from(e: ModelError) -> Self {
        AgentError::ModelUnavailable(e.to_string())
    }
}
