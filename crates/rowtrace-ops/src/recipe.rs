//! Row-construction metadata reported by kernels.
//!
//! One recipe per input edge. The lineage tracker derives the edge's
//! dependency matrix purely from this, so a kernel must report exactly
//! how each output row was built — never an approximation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowRecipe {
    /// No output row reads this input (a constant edge).
    Constant,
    /// Every output row reads every input row (an unkeyed aggregate).
    Broadcast,
    /// Output row i is built from input row i; lengths are equal.
    Identity,
    /// Output row i is built from exactly input row `sources[i]`.
    Gather { sources: Vec<u32> },
    /// Output row i is built from an explicit, possibly empty, set of
    /// input rows (sorted ascending).
    GatherMulti { sources: Vec<Vec<u32>> },
}

impl RowRecipe {
    pub fn gather(sources: Vec<u32>) -> Self {
        RowRecipe::Gather { sources }
    }

    pub fn gather_multi(sources: Vec<Vec<u32>>) -> Self {
        RowRecipe::GatherMulti { sources }
    }
}
