//! Application-wide error types.

use thiserror::Error;

use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("llm error: {0}")]
    Llm(#[from] ProviderError),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("lookup error: {0}")]
    Lookup(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("workflow error: {0}")]
    Workflow(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
