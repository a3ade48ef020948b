//! Fixed, non-sensitive error vocabulary surfaced to clients via the `error`
//! event. Internal error detail never crosses this boundary verbatim.

use tw_engine::EngineError;
use tw_registry::RegistryError;
use tw_store::StoreError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid request")]
    Validation,
    #[error("Game not found")]
    NotFound,
    #[error("Not authorized")]
    AuthDenied,
    #[error("Player already claimed")]
    Conflict,
    #[error("Token expired")]
    TokenExpired,
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Server busy, try again")]
    Busy,
    #[error("Request timed out")]
    Timeout,
    #[error("Connection buffer full")]
    BufferOverflow,
    #[error("Storage error")]
    Storage,
}

impl TransportError {
    /// The literal string sent in the `error` event payload's `message` field.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid request",
            Self::NotFound => "Game not found",
            Self::AuthDenied => "Not authorized",
            Self::Conflict => "Player already claimed",
            Self::TokenExpired => "Token expired",
            Self::RateLimited => "Rate limit exceeded",
            Self::Busy => "Server busy, try again",
            Self::Timeout => "Request timed out",
            Self::BufferOverflow => "Connection buffer full",
            Self::Storage => "Storage error",
        }
    }
}

impl From<EngineError> for TransportError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation(_) => Self::Validation,
            EngineError::NotFound(_) => Self::NotFound,
            EngineError::AuthDenied => Self::AuthDenied,
            EngineError::Conflict(_) => Self::Conflict,
            EngineError::TokenExpired => Self::TokenExpired,
        }
    }
}

impl From<RegistryError> for TransportError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(_) => Self::NotFound,
            RegistryError::Engine(inner) => inner.into(),
            RegistryError::Coordinator(inner) => match inner {
                tw_coordinator::CoordinatorError::Busy => Self::Busy,
                tw_coordinator::CoordinatorError::Timeout => Self::Timeout,
                tw_coordinator::CoordinatorError::IdExhausted => Self::Storage,
            },
            RegistryError::Store(inner) => match inner {
                StoreError::Storage(_) => Self::Storage,
            },
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
