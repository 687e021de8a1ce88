use sha2::{Digest, Sha256};

/// Hash raw bytes to a lowercase SHA-256 hex string.
///
/// Model sources and rendered artifacts are addressed by this fingerprint,
/// so identical bytes always map to the same reference.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Check that a string is a well-formed lowercase SHA-256 hex fingerprint.
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
