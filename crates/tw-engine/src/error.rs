/// Domain errors raised by session operations.
///
/// Collapsed to the fixed short-message vocabulary at the wire boundary by
/// `tw-transport`; never surfaced to clients with their `Display` verbatim
/// beyond that vocabulary.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not authorized")]
    AuthDenied,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("token expired")]
    TokenExpired,
}

pub type EngineResult<T> = Result<T, EngineError>;
