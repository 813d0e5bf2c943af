//! Dependency matrices.
//!
//! A matrix describes, for one (node, input) edge, which input rows each
//! output row was built from. It is stored as the cheapest structural
//! class that represents the relation *exactly* — never an approximation:
//!
//! - `Null`     — no output row reads this input.
//! - `Uniform`  — every output row reads every input row.
//! - `Direct`   — output row i reads exactly input row i.
//! - `OneToOne` — a permutation: one source per row, not positional.
//! - `Sparse`   — explicit small sets per output row.
//! - `Dense`    — a bitset; used once the sets pass half density.

use serde::{Deserialize, Serialize};

use rowtrace_ops::recipe::RowRecipe;

use crate::error::{Result, TraceError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyMatrix {
    Null {
        outputs: u32,
        inputs: u32,
    },
    Uniform {
        outputs: u32,
        inputs: u32,
    },
    Direct {
        rows: u32,
    },
    OneToOne {
        sources: Vec<u32>,
    },
    Sparse {
        inputs: u32,
        rows: Vec<Vec<u32>>,
    },
    Dense {
        outputs: u32,
        inputs: u32,
        /// Row-major bitset, `words_per_row = ceil(inputs / 64)`.
        words: Vec<u64>,
    },
}

impl DependencyMatrix {
    pub fn outputs(&self) -> u32 {
        match self {
            DependencyMatrix::Null { outputs, .. }
            | DependencyMatrix::Uniform { outputs, .. }
            | DependencyMatrix::Dense { outputs, .. } => *outputs,
            DependencyMatrix::Direct { rows } => *rows,
            DependencyMatrix::OneToOne { sources } => sources.len() as u32,
            DependencyMatrix::Sparse { rows, .. } => rows.len() as u32,
        }
    }

    pub fn inputs(&self) -> u32 {
        match self {
            DependencyMatrix::Null { inputs, .. }
            | DependencyMatrix::Uniform { inputs, .. }
            | DependencyMatrix::Sparse { inputs, .. }
            | DependencyMatrix::Dense { inputs, .. } => *inputs,
            DependencyMatrix::Direct { rows } => *rows,
            DependencyMatrix::OneToOne { sources } => sources.len() as u32,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            DependencyMatrix::Null { .. } => "null",
            DependencyMatrix::Uniform { .. } => "uniform",
            DependencyMatrix::Direct { .. } => "direct",
            DependencyMatrix::OneToOne { .. } => "one_to_one",
            DependencyMatrix::Sparse { .. } => "sparse",
            DependencyMatrix::Dense { .. } => "dense",
        }
    }

    /// Input rows one output row depends on, ascending.
    pub fn deps_of(&self, row: u32) -> Result<Vec<u32>> {
        if row >= self.outputs() {
            return Err(TraceError::IndexOutOfRange {
                side: "output",
                row,
                size: self.outputs(),
            });
        }
        Ok(match self {
            DependencyMatrix::Null { .. } => Vec::new(),
            DependencyMatrix::Uniform { inputs, .. } => (0..*inputs).collect(),
            DependencyMatrix::Direct { .. } => vec![row],
            DependencyMatrix::OneToOne { sources } => vec![sources[row as usize]],
            DependencyMatrix::Sparse { rows, .. } => rows[row as usize].clone(),
            DependencyMatrix::Dense { inputs, words, .. } => {
                let per_row = Self::words_per_row(*inputs);
                let base = row as usize * per_row;
                let mut out = Vec::new();
                for (w, &word) in words[base..base + per_row].iter().enumerate() {
                    let mut bits = word;
                    while bits != 0 {
                        let bit = bits.trailing_zeros();
                        out.push((w as u32) * 64 + bit);
                        bits &= bits - 1;
                    }
                }
                out
            }
        })
    }

    pub fn contains(&self, output: u32, input: u32) -> bool {
        match self {
            DependencyMatrix::Null { .. } => false,
            DependencyMatrix::Uniform { outputs, inputs } => output < *outputs && input < *inputs,
            DependencyMatrix::Direct { rows } => output < *rows && output == input,
            DependencyMatrix::OneToOne { sources } => {
                sources.get(output as usize) == Some(&input)
            }
            DependencyMatrix::Sparse { rows, .. } => rows
                .get(output as usize)
                .is_some_and(|r| r.binary_search(&input).is_ok()),
            DependencyMatrix::Dense {
                inputs, words, ..
            } => {
                if output >= self.outputs() || input >= *inputs {
                    return false;
                }
                let per_row = Self::words_per_row(*inputs);
                let word = words[output as usize * per_row + (input / 64) as usize];
                word & (1u64 << (input % 64)) != 0
            }
        }
    }

    /// Union of `deps_of` over a set of output rows, ascending — the
    /// primitive the lazy lineage walk is built on.
    pub fn map_rows(&self, rows: &[u32]) -> Result<Vec<u32>> {
        match self {
            // Cheap exits for the classes where per-row enumeration is
            // avoidable.
            DependencyMatrix::Null { .. } => Ok(Vec::new()),
            DependencyMatrix::Uniform { inputs, .. } => {
                if rows.is_empty() {
                    Ok(Vec::new())
                } else {
                    Ok((0..*inputs).collect())
                }
            }
            _ => {
                let mut out = Vec::new();
                for &row in rows {
                    out.extend(self.deps_of(row)?);
                }
                out.sort_unstable();
                out.dedup();
                Ok(out)
            }
        }
    }

    /// Derive the matrix for one edge from the kernel's recipe.
    pub fn classify(recipe: &RowRecipe, outputs: u32, inputs: u32) -> Result<Self> {
        match recipe {
            RowRecipe::Constant => Ok(DependencyMatrix::Null { outputs, inputs }),
            RowRecipe::Broadcast => {
                if outputs == 0 || inputs == 0 {
                    Ok(DependencyMatrix::Null { outputs, inputs })
                } else {
                    Ok(DependencyMatrix::Uniform { outputs, inputs })
                }
            }
            RowRecipe::Identity => {
                if outputs != inputs {
                    return Err(TraceError::Dimensions(format!(
                        "identity recipe over {outputs} output and {inputs} input rows"
                    )));
                }
                Ok(DependencyMatrix::Direct { rows: outputs })
            }
            RowRecipe::Gather { sources } => {
                if sources.len() as u32 != outputs {
                    return Err(TraceError::Dimensions(format!(
                        "gather recipe lists {} rows for {} outputs",
                        sources.len(),
                        outputs
                    )));
                }
                for &src in sources {
                    if src >= inputs {
                        return Err(TraceError::IndexOutOfRange {
                            side: "input",
                            row: src,
                            size: inputs,
                        });
                    }
                }
                Ok(Self::from_single_sources(sources.clone(), inputs))
            }
            RowRecipe::GatherMulti { sources } => {
                if sources.len() as u32 != outputs {
                    return Err(TraceError::Dimensions(format!(
                        "gather recipe lists {} rows for {} outputs",
                        sources.len(),
                        outputs
                    )));
                }
                let mut rows = sources.clone();
                for row in &mut rows {
                    row.sort_unstable();
                    row.dedup();
                    if let Some(&src) = row.last() {
                        if src >= inputs {
                            return Err(TraceError::IndexOutOfRange {
                                side: "input",
                                row: src,
                                size: inputs,
                            });
                        }
                    }
                }
                Ok(Self::from_row_sets(inputs, rows))
            }
        }
    }

    /// Normalize a one-source-per-row relation to its cheapest class.
    fn from_single_sources(sources: Vec<u32>, inputs: u32) -> Self {
        let outputs = sources.len() as u32;
        if outputs == inputs {
            if sources.iter().enumerate().all(|(i, &s)| s == i as u32) {
                return DependencyMatrix::Direct { rows: outputs };
            }
            let mut seen = vec![false; inputs as usize];
            if sources.iter().all(|&s| {
                let hit = &mut seen[s as usize];
                !std::mem::replace(hit, true)
            }) {
                return DependencyMatrix::OneToOne { sources };
            }
        }
        DependencyMatrix::Sparse {
            inputs,
            rows: sources.into_iter().map(|s| vec![s]).collect(),
        }
    }

    /// Normalize explicit row sets (sorted, deduped) to the cheapest
    /// class that represents them exactly.
    pub fn from_row_sets(inputs: u32, rows: Vec<Vec<u32>>) -> Self {
        let outputs = rows.len() as u32;
        let pairs: usize = rows.iter().map(Vec::len).sum();

        if pairs == 0 {
            return DependencyMatrix::Null { outputs, inputs };
        }
        if inputs > 0 && rows.iter().all(|r| r.len() as u32 == inputs) {
            return DependencyMatrix::Uniform { outputs, inputs };
        }
        if rows.iter().all(|r| r.len() == 1) {
            return Self::from_single_sources(rows.into_iter().map(|r| r[0]).collect(), inputs);
        }
        let cells = outputs as usize * inputs as usize;
        if cells > 0 && pairs * 2 > cells {
            let per_row = Self::words_per_row(inputs);
            let mut words = vec![0u64; outputs as usize * per_row];
            for (o, row) in rows.iter().enumerate() {
                for &i in row {
                    words[o * per_row + (i / 64) as usize] |= 1u64 << (i % 64);
                }
            }
            return DependencyMatrix::Dense {
                outputs,
                inputs,
                words,
            };
        }
        DependencyMatrix::Sparse { inputs, rows }
    }

    fn words_per_row(inputs: u32) -> usize {
        (inputs as usize).div_ceil(64)
    }

    /// Compose two edges: `down` relates a node's output rows to a mid
    /// table's rows, `up` relates the mid table's rows to rows of an
    /// input further upstream. The result relates the node's output rows
    /// to the upstream input's rows, re-normalized to the cheapest class.
    pub fn compose(down: &Self, up: &Self) -> Result<Self> {
        if down.inputs() != up.outputs() {
            return Err(TraceError::Dimensions(format!(
                "compose of {}x{} with {}x{}",
                down.outputs(),
                down.inputs(),
                up.outputs(),
                up.inputs()
            )));
        }
        let outputs = down.outputs();
        let inputs = up.inputs();

        // Identities and annihilators first.
        if matches!(down, DependencyMatrix::Null { .. })
            || matches!(up, DependencyMatrix::Null { .. })
        {
            return Ok(DependencyMatrix::Null { outputs, inputs });
        }
        if matches!(down, DependencyMatrix::Direct { .. }) {
            return Ok(up.clone());
        }
        if matches!(up, DependencyMatrix::Direct { .. }) {
            return Ok(down.clone());
        }
        if let (DependencyMatrix::OneToOne { sources: a }, DependencyMatrix::OneToOne { sources: b }) =
            (down, up)
        {
            let sources = a.iter().map(|&m| b[m as usize]).collect();
            return Ok(Self::from_single_sources(sources, inputs));
        }

        // A uniform downstream edge gives every output row the same
        // upstream set.
        if let DependencyMatrix::Uniform { .. } = down {
            let all_mid: Vec<u32> = (0..down.inputs()).collect();
            let set = up.map_rows(&all_mid)?;
            let rows = vec![set; outputs as usize];
            return Ok(Self::from_row_sets(inputs, rows));
        }

        let mut rows = Vec::with_capacity(outputs as usize);
        for o in 0..outputs {
            let mid = down.deps_of(o)?;
            rows.push(up.map_rows(&mid)?);
        }
        Ok(Self::from_row_sets(inputs, rows))
    }
}
