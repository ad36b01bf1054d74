//! Logical hierarchy paths and the key prefixes derived from them.

use crate::error::{ZarrError, ZarrResult};

/// Canonicalise a logical path.
///
/// Backslashes become `/`, leading/trailing slashes are stripped and runs of
/// slashes collapse to one. `.` and `..` segments are rejected. The root path
/// normalises to the empty string.
pub fn normalize(path: &str) -> ZarrResult<String> {
    let replaced = path.replace('\\', "/");
    let segments: Vec<&str> = replaced.split('/').filter(|s| !s.is_empty()).collect();
    for segment in &segments {
        if *segment == "." || *segment == ".." {
            return Err(ZarrError::InvalidPath {
                path: path.to_string(),
                reason: format!("segment {segment:?} is not allowed"),
            });
        }
    }
    Ok(segments.join("/"))
}

/// Key prefix for a logical path: the normalised path plus a trailing `/`,
/// or `""` for the root.
pub fn key_prefix(path: &str) -> ZarrResult<String> {
    let normalized = normalize(path)?;
    Ok(prefix_of_normalized(&normalized))
}

pub(crate) fn prefix_of_normalized(normalized: &str) -> String {
    if normalized.is_empty() {
        String::new()
    } else {
        format!("{normalized}/")
    }
}

/// Every strict ancestor of a normalised path, root first.
pub(crate) fn ancestors(normalized: &str) -> Vec<String> {
    if normalized.is_empty() {
        return Vec::new();
    }
    let segments: Vec<&str> = normalized.split('/').collect();
    (0..segments.len())
        .map(|n| segments[..n].join("/"))
        .collect()
}

/// Join a normalised parent path and a child name.
pub(crate) fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    }
}
