#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Engine(#[from] tw_engine::EngineError),
    #[error(transparent)]
    Coordinator(#[from] tw_coordinator::CoordinatorError),
    #[error(transparent)]
    Store(#[from] tw_store::StoreError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
