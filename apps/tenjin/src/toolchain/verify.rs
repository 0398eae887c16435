//! Checksum verification for downloaded artifacts.
//!
//! Artifacts such as the sysroot tarball run to hundreds of megabytes, so the
//! hash is computed by streaming the file in fixed-size chunks.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::TenjinError;

/// Read buffer size used while hashing.
const CHUNK_SIZE: usize = 8192;

/// Verifies that a file matches the expected SHA256 checksum.
///
/// On mismatch the file is deleted before the error is returned, so a corrupt
/// artifact never stays at a path a later run could mistake for a good download.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be opened or read
/// - The computed checksum does not match (`TenjinError::ChecksumMismatch`)
pub fn verify_checksum(file_path: &Path, expected: &str) -> Result<()> {
    let computed = compute_sha256(file_path)?;
    let expected = expected.to_lowercase();

    if computed != expected {
        if let Err(e) = std::fs::remove_file(file_path) {
            debug!("could not remove {}: {e}", file_path.display());
        }
        return Err(TenjinError::checksum_mismatch(file_path, expected, computed).into());
    }

    debug!("checksum ok for {}", file_path.display());
    Ok(())
}

/// Computes the SHA256 hash of a file as a lowercase hex string.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn compute_sha256(file_path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(file_path)
        .with_context(|| format!("Failed to open file for checksum: {}", file_path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).with_context(|| {
            format!("Failed to read file for checksum: {}", file_path.display())
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
