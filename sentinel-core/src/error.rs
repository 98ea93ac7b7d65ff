//! Error types for sentinel-core

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using sentinel Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for sentinel
///
/// Parse outcomes (`Parsed`, `ParseFailed`, `EmptyOutput`) are deliberately
/// absent: they are [`crate::state::ParseStatus`] values on the execution
/// record, never errors.
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(sentinel::config))]
    Config(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(sentinel::database))]
    Database(#[from] rusqlite::Error),

    #[error("Docker error: {0}")]
    #[diagnostic(code(sentinel::docker))]
    Docker(#[from] bollard::errors::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(sentinel::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(sentinel::serde))]
    Serde(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    #[diagnostic(code(sentinel::toml))]
    Toml(#[from] toml::de::Error),

    // -- input errors -------------------------------------------------------
    #[error("Invalid target: {0}")]
    #[diagnostic(code(sentinel::invalid_target))]
    InvalidTarget(String),

    #[error("Intent schema violation: {0}")]
    #[diagnostic(code(sentinel::intent_schema))]
    IntentSchemaViolation(String),

    #[error("Unknown intent: {0}")]
    #[diagnostic(code(sentinel::unknown_intent))]
    UnknownIntent(String),

    // -- policy errors ------------------------------------------------------
    #[error("Denied by execution policy: {reason}")]
    #[diagnostic(code(sentinel::policy_denied))]
    PolicyDenied { reason: String },

    #[error("Confirmation required: {reason}")]
    #[diagnostic(code(sentinel::confirmation_required))]
    ConfirmationRequired { reason: String },

    // -- build errors -------------------------------------------------------
    #[error("Command build failed: {reason}")]
    #[diagnostic(code(sentinel::command_build))]
    CommandBuild { reason: String },

    // -- execution errors ---------------------------------------------------
    #[error("Authorization denied (exit code {code})")]
    #[diagnostic(code(sentinel::authorization_denied))]
    AuthorizationDenied { code: i32 },

    #[error("Tool not found: {0}")]
    #[diagnostic(code(sentinel::tool_not_found))]
    ToolNotFound(String),

    #[error("Execution timed out after {seconds}s")]
    #[diagnostic(code(sentinel::timed_out))]
    TimedOut { seconds: u64 },

    #[error("Process crashed (terminated by signal)")]
    #[diagnostic(code(sentinel::crashed))]
    Crashed,

    #[error("Execution cancelled")]
    #[diagnostic(code(sentinel::cancelled))]
    Cancelled,

    #[error("Tool exited with code {code}")]
    #[diagnostic(code(sentinel::nonzero_exit))]
    NonZeroExit { code: i32 },

    #[error("Privilege escalation unavailable on this host")]
    #[diagnostic(code(sentinel::privilege_unavailable))]
    PrivilegeUnavailable,

    // -- store errors -------------------------------------------------------
    #[error("Invalid entity id for kind {kind}: {id}")]
    #[diagnostic(code(sentinel::invalid_id))]
    InvalidId { kind: String, id: String },

    #[error("Constraint violation: {0}")]
    #[diagnostic(code(sentinel::constraint))]
    ConstraintViolation(String),

    // -- external errors ----------------------------------------------------
    #[error("LLM provider unavailable: {0}")]
    #[diagnostic(code(sentinel::llm_unavailable))]
    LlmUnavailable(String),

    #[error("Runtime probe failed: {0}")]
    #[diagnostic(code(sentinel::runtime_probe))]
    RuntimeProbeFailed(String),
}

impl Error {
    /// Short machine-readable kind used on the `ToolError` event.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Docker(_) => "docker",
            Error::Io(_) => "io",
            Error::Serde(_) => "serde",
            Error::Toml(_) => "toml",
            Error::InvalidTarget(_) => "invalid_target",
            Error::IntentSchemaViolation(_) => "intent_schema_violation",
            Error::UnknownIntent(_) => "unknown_intent",
            Error::PolicyDenied { .. } => "policy_denied",
            Error::ConfirmationRequired { .. } => "confirmation_required",
            Error::CommandBuild { .. } => "command_build",
            Error::AuthorizationDenied { .. } => "authorization_denied",
            Error::ToolNotFound(_) => "tool_not_found",
            Error::TimedOut { .. } => "timed_out",
            Error::Crashed => "crashed",
            Error::Cancelled => "cancelled",
            Error::NonZeroExit { .. } => "nonzero_exit",
            Error::PrivilegeUnavailable => "privilege_unavailable",
            Error::InvalidId { .. } => "invalid_id",
            Error::ConstraintViolation(_) => "constraint_violation",
            Error::LlmUnavailable(_) => "llm_unavailable",
            Error::RuntimeProbeFailed(_) => "runtime_probe_failed",
        }
    }
}
