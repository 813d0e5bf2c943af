use rowtrace_core::id::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("matrix dimensions do not agree: {0}")]
    Dimensions(String),

    #[error("row index {row} out of range for {side} size {size}")]
    IndexOutOfRange {
        side: &'static str,
        row: u32,
        size: u32,
    },

    #[error("no matrix recorded for edge ({node}, input {input})")]
    MissingEdge { node: NodeId, input: usize },

    #[error("no trace recorded for node {0}")]
    MissingNode(NodeId),
}
