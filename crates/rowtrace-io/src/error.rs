use thiserror::Error;

pub type Result<T> = std::result::Result<T, IoError>;

#[derive(Debug, Error)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("cannot parse '{value}' as {dtype} (column '{column}', row {row})")]
    Parse {
        column: String,
        row: usize,
        value: String,
        dtype: String,
    },

    #[error("unknown table '{0}'")]
    UnknownTable(String),
}

impl From<rowtrace_core::error::Error> for IoError {
    fn from(e: rowtrace_core::error::Error) -> Self {
        IoError::Schema(e.to_string())
    }
}
