//! blake3 para fingerprints, SHA-256 para checksums de artifacts.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::to_canonical_json;

pub fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Fingerprint de un documento JSON: blake3 de su forma canónica.
pub fn fingerprint_json(value: &Value) -> String {
    blake3_hex(to_canonical_json(value).as_bytes())
}

pub fn sha256_hex(content: &[u8]) -> String {
    Sha256::digest(content).iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_of_empty_input_is_well_known() {
        assert_eq!(sha256_hex(b""),
                   "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        assert_eq!(fingerprint_json(&json!({"a": 1, "b": [true]})),
                   fingerprint_json(&json!({"b": [true], "a": 1})));
        assert_ne!(fingerprint_json(&json!({"a": 1})), fingerprint_json(&json!({"a": 2})));
    }
}
