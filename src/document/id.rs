//! Markup-safe identifiers
//!
//! Labels (test ids, group titles) become node ids by normalizing every
//! character outside `[A-Za-z0-9_]` to `-`, collapsing runs of `-`, trimming
//! them from both ends and lowercasing. Normalization alone maps distinct
//! labels onto the same id ("a b" and "a-b"), so the first six hex digits of
//! the SHA-256 of the raw label are appended.

use sha2::{Digest, Sha256};

/// Number of hash hex digits appended to every identifier
const HASH_PREFIX_LEN: usize = 6;

/// Convert an arbitrary label into a collision-resistant, markup-safe id
pub fn to_valid_dom_id(label: &str) -> String {
    let mut id = String::with_capacity(label.len() + HASH_PREFIX_LEN + 2);

    for c in label.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            id.push(c.to_ascii_lowercase());
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }

    let trimmed = id.trim_matches('-');
    let mut id = if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", trimmed)
    } else {
        trimmed.to_string()
    };

    id.push('-');
    id.push_str(&label_hash(label)[..HASH_PREFIX_LEN]);
    id
}

/// Hex SHA-256 of a label
pub fn label_hash(label: &str) -> String {
    hex::encode(Sha256::digest(label.as_bytes()))
}
