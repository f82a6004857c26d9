// src/error.rs
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum DraftsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Resource not found")]
    ResourceNotFound,

    #[error("Tool not found")]
    ToolNotFound,

    #[error("Method not found")]
    MethodNotFound,

    #[error("Parse error")]
    ParseError,

    #[error("Internal error: {0}")]
    InternalError(String),

    /// A required identifying parameter was missing. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No callback arrived within the correlation window.
    #[error("Timeout waiting for callback: {0}")]
    Timeout(String),

    /// Drafts reported an error or the user cancelled the operation.
    #[error("Drafts returned an error: {0}")]
    External(String),

    /// The callback server was stopped while the request was outstanding.
    #[error("Callback server shutting down")]
    Shutdown,

    /// The OS refused to open the x-callback-url.
    #[error("Failed to launch Drafts: {0}")]
    Launch(String),
}

impl DraftsError {
    /// Whether the invoker's retry loop should try again with a fresh attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DraftsError::Timeout(_) | DraftsError::External(_) | DraftsError::Launch(_)
        )
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            DraftsError::InvalidInput(_) => "invalid_input",
            DraftsError::InvalidParams(_) => "invalid_params",
            DraftsError::Validation(_) => "validation_failed",
            DraftsError::ResourceNotFound => "not_found",
            DraftsError::ToolNotFound => "tool_not_found",
            DraftsError::MethodNotFound => "method_not_found",
            DraftsError::ParseError => "parse_error",
            DraftsError::Timeout(_) => "timeout",
            DraftsError::External(_) => "app_error",
            DraftsError::Launch(_) => "launch_failed",
            DraftsError::Shutdown => "shutting_down",
            DraftsError::Database(_) => "store_error",
            _ => "internal_error",
        }
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let (code, message) = match self {
            DraftsError::ResourceNotFound => (-32602, "Resource not found".to_string()),
            DraftsError::ToolNotFound => (-32602, "Tool not found".to_string()),
            DraftsError::InvalidParams(msg) => (-32602, msg.to_string()),
            DraftsError::InvalidInput(msg) => (-32602, msg.to_string()),
            DraftsError::Validation(msg) => (-32602, msg.to_string()),
            DraftsError::MethodNotFound => (-32601, "Method not found".to_string()),
            DraftsError::ParseError => (-32700, "Parse error".to_string()),
            DraftsError::InternalError(msg) => (-32603, msg.to_string()),
            err => (-32603, err.to_string()),
        };

        json!({
            "code": code,
            "message": message,
        })
    }
}
