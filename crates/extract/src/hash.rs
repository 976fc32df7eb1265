use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Lowercase hex SHA-256 of a document's bytes. Two uploads of the same
/// invoice share a digest whatever their file names.
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data).iter().fold(String::with_capacity(64), |mut hex, b| {
        let _ = write!(hex, "{b:02x}");
        hex
    })
}
