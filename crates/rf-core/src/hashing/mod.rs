//! Canonicalización JSON y hashes.

mod canonical_json;
mod hash;

pub use canonical_json::to_canonical_json;
pub use hash::{blake3_hex, fingerprint_json, sha256_hex};
