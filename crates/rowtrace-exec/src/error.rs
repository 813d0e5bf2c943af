use rowtrace_core::id::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

/// Why a run failed. Every variant aborts the run; a cache problem is
/// deliberately absent — it is recovered by evaluating without the
/// cache and surfaced only as a warning.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A declared input has no binding, or a binding names no input.
    #[error("unbound input: {0}")]
    UnboundInput(String),

    /// A bound table's shape disagrees with the declared schema.
    #[error("schema mismatch for input '{input}': {detail}")]
    SchemaMismatch { input: String, detail: String },

    /// The plan has no topological order. Unreachable for well-formed
    /// compiler output; checked defensively.
    #[error("plan contains a cycle")]
    CyclicPlan,

    /// A kernel failed; the node identity is attached.
    #[error("operation {node} failed: {source}")]
    Operation {
        node: NodeId,
        #[source]
        source: rowtrace_ops::KernelError,
    },

    /// The run's cancel token fired.
    #[error("run cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}
