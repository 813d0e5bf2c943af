use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("duplicate column '{0}' in output shape")]
    DuplicateColumn(String),

    #[error("duplicate binding '{0}'")]
    DuplicateBinding(String),

    #[error("unknown node {0}")]
    UnknownNode(u32),

    #[error("type error: {0}")]
    Type(String),

    #[error("malformed plan: {0}")]
    Malformed(String),

    #[error("plan contains a cycle")]
    Cycle,

    #[error("plan description error: {0}")]
    Description(String),
}

impl From<rowtrace_core::expr::ExprError> for PlanError {
    fn from(e: rowtrace_core::expr::ExprError) -> Self {
        match e {
            rowtrace_core::expr::ExprError::UnknownColumn { name, .. } => {
                PlanError::UnknownColumn(name)
            }
            other => PlanError::Type(other.to_string()),
        }
    }
}
