// deskboot-aio/src/checksum.rs
use deskboot_common::error::{BootError, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Verifies the SHA256 checksum of an in-memory payload such as a downloaded script.
pub fn verify_sha256(label: &str, content: &[u8], expected: &str) -> Result<()> {
    let actual = hex::encode(Sha256::digest(content));

    debug!("Calculated SHA256 for {}: {} ({} bytes)", label, actual, content.len());
    debug!("Expected SHA256:   {}", expected);

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(BootError::Checksum(format!(
            "Checksum mismatch for {label}: expected {expected}, got {actual}"
        )))
    }
}
