#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The session's pending-operation cap was already reached.
    #[error("session is busy")]
    Busy,
    /// Waited past the lock-acquire timeout.
    #[error("timed out waiting for session lock")]
    Timeout,
    /// No unused 6-character id found within the attempt budget.
    #[error("session id space exhausted")]
    IdExhausted,
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
