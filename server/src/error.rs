use crate::questions::QuestionError;
use shared::ProtocolError;

/// Failures that stop the server, either at construction or while running.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("failed to load questions: {0}")]
    Questions(#[from] QuestionError),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}
