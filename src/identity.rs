//! Content-addressed node identifiers for formats without native ids.
//!
//! An id is the SHA-256 hex digest of `parent_id NUL label NUL position`.
//! Ids are not stable across edits: renaming a node or changing its ordinal
//! position yields a new id, and so does any change to its parent's id.

use sha2::{Digest, Sha256};

const SEPARATOR: &[u8] = b"\0";

/// Derive the id of a node from its parent id, label and position.
pub fn derive_id(parent_id: &str, label: &str, position: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_id.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(label.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(position.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
