use thiserror::Error;

pub type Result<T> = std::result::Result<T, KernelError>;

/// A kernel-level failure. These abort the whole run — dropped rows are
/// a designed outcome, kernel errors are not.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error(transparent)]
    Expr(#[from] rowtrace_core::expr::ExprError),

    #[error("execution error: {0}")]
    Exec(String),
}

impl From<rowtrace_core::error::Error> for KernelError {
    fn from(e: rowtrace_core::error::Error) -> Self {
        KernelError::Exec(e.to_string())
    }
}
