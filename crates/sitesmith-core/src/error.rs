use thiserror::Error;

#[derive(Debug, Error)]
pub enum SitesmithError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Generation errors
    #[error("Generator exceeded max turns ({0})")]
    MaxTurnsExceeded(usize),

    #[error("Generator exceeded max duration ({0}s)")]
    MaxDurationExceeded(u64),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Artifact store errors
    #[error("Store error: {0}")]
    Store(String),

    // Workflow errors
    #[error("Workflow error: {0}")]
    Workflow(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SitesmithError>;
