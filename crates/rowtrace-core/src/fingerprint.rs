//! Content fingerprints.
//!
//! A fingerprint identifies one node's computation: operation kind and
//! parameters, the ordered fingerprints of its inputs, and — for source
//! nodes — a digest of the bound data. Two nodes with identical
//! fingerprints produce bit-identical tables, which is what makes the
//! result store safe.
//!
//! `SCHEME_VERSION` is folded into every fingerprint and names the cache
//! subdirectory on disk, so changing the scheme yields a clean full miss
//! rather than corruption.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::table::Table;

/// Bump when the preimage layout changes in any way.
pub const SCHEME_VERSION: u32 = 1;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn to_hex(self) -> String {
        let mut s = String::with_capacity(64);
        for b in self.0 {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            out[i] = (hi * 16 + lo) as u8;
        }
        Some(Self(out))
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Digest any serde-serializable value via its canonical JSON bytes.
pub fn digest_serde<T: Serialize>(value: &T) -> Result<Fingerprint> {
    let bytes = serde_json::to_vec(value).map_err(|e| Error::Hash(e.to_string()))?;
    Ok(Fingerprint(*blake3::hash(&bytes).as_bytes()))
}

/// Digest of a concrete table's contents (schema and every value).
pub fn table_digest(table: &Table) -> Result<Fingerprint> {
    digest_serde(table)
}

/// Incremental builder for node fingerprints. Every field is length- or
/// tag-delimited through JSON framing, so preimages cannot collide by
/// concatenation.
pub struct FingerprintBuilder {
    hasher: blake3::Hasher,
}

impl FingerprintBuilder {
    pub fn new() -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&SCHEME_VERSION.to_le_bytes());
        Self { hasher }
    }

    pub fn update_serde<T: Serialize>(mut self, value: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(value).map_err(|e| Error::Hash(e.to_string()))?;
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(&bytes);
        Ok(self)
    }

    pub fn update_fingerprint(mut self, fp: &Fingerprint) -> Self {
        self.hasher.update(&fp.0);
        self
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(*self.hasher.finalize().as_bytes())
    }
}

impl Default for FingerprintBuilder {
    fn default() -> Self {
        Self::new()
    }
}
