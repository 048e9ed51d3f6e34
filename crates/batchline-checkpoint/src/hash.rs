//! Blake3 keys for checkpoint entries

/// Checkpoint key for a file path: blake3 hex digest of the path string.
///
/// Keeps map keys a fixed 64 characters regardless of how deep the path is.
pub fn path_key(path: &str) -> String {
    blake3::hash(path.as_bytes()).to_hex().to_string()
}

/// Return the first 8 characters of a key.
pub fn short_key(key: &str) -> &str {
    &key[..key.len().min(8)]
}
