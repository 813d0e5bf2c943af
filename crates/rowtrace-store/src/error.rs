use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage failed. Callers recover by evaluating without
    /// the cache; this is a warning-level condition, not a run failure.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The caller's run was cancelled while waiting for another run's
    /// in-flight computation of the same fingerprint.
    #[error("cancelled while waiting on an in-flight computation")]
    Cancelled,
}
