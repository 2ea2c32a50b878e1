//! Request path standardization.
//!
//! Paths arriving from the transport are already percent-decoded. Before any
//! routing decision they are reduced to their non-empty segments, which fixes
//! the slash policy: duplicate slashes collapse, a leading slash is implied and
//! a trailing slash is dropped.

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Rebuild the canonical form of a path (`"//a/b/"` becomes `"/a/b"`).
pub fn standardize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
