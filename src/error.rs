use std::time::Duration;

use async_openai::error::OpenAIError;
use thiserror::Error;

/// Errors produced while talking to the hosted assistant or serving a session
#[derive(Debug, Error)]
pub enum AduChatError {
    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] OpenAIError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown role '{0}' (expected Applicant or Planner)")]
    InvalidRole(String),

    #[error("Run ended with status {status}: {message}")]
    RunFailed { status: String, message: String },

    #[error("File batch ended with status {status}")]
    BatchFailed { status: String },

    #[error("Assistant message contained no text content")]
    EmptyContent,

    #[error("Timed out waiting for {what} after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("Cancelled while waiting for {what}")]
    Cancelled { what: String },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AduChatError>;
