//! Classification of raw listing entries.
//!
//! The store marks collections by suffixing their key with `/`. That suffix is the only
//! type signal a listing carries.

use super::NodeKind;

/// Separator between path segments in the store.
pub const SEPARATOR: char = '/';

/// Split a raw listing entry into its display name and kind.
///
/// Exactly one trailing separator is stripped from collection keys.
#[must_use]
pub fn classify(raw: &str) -> (&str, NodeKind) {
    match raw.strip_suffix(SEPARATOR) {
        Some(name) => (name, NodeKind::Directory),
        None => (raw, NodeKind::File),
    }
}

/// Whether `name` can be appended to a path without leaving its parent.
#[must_use]
pub fn is_valid_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(SEPARATOR)
}
