use std::path::Path;

use crate::error::{HashError, HashResult};

/// Returns the hex-encoded blake3 digest of `data`.
///
/// # Example
///
/// ```
/// use strata_utils::hash::checksum_bytes;
///
/// let digest = checksum_bytes(b"hello world\n");
/// assert_eq!(digest.len(), 64);
/// ```
pub fn checksum_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Calculates the blake3 checksum of a file, hex-encoded.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
pub fn calculate_checksum<P: AsRef<Path>>(file_path: P) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(file_path).map_err(|err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    })?;
    Ok(hasher.finalize().to_hex().to_string())
}
