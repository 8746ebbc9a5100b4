use thiserror::Error;

/// Typed errors library code returns; callers branch on these. Application
/// glue (CLI, runner orchestration) wraps these in `eyre::Result` with
/// `.wrap_err(...)` context instead of matching on variants.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(#[from] forge_store::StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pinned profile unavailable: {0}")]
    PinnedProfileUnavailable(String),
    #[error("channel error")]
    Channel,
}

pub type AppResult<T> = Result<T, AppError>;
