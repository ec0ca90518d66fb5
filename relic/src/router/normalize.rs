//! Canonical request paths.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A canonicalized path: an ordered sequence of non-empty segments plus a
/// trailing-slash flag.
///
/// Construction resolves `.` and `..` segments and collapses empty segments,
/// so a `NormalizedPath` never contains a dot segment and normalizing twice
/// is the same as normalizing once. `..` underflow past the root is
/// truncated at the root.
///
/// Percent-encoding is deliberately left untouched: an encoded `%2F` must
/// not be interpreted as a segment separator, so decoding is the business of
/// whoever consumes the segments.
///
/// Equality and hashing consider the segment sequence only; the
/// trailing-slash flag is carried for faithful rendering, not identity.
#[derive(Clone, Debug, Default)]
pub struct NormalizedPath {
    segments: Vec<String>,
    trailing_slash: bool,
}

impl NormalizedPath {
    /// Normalize the given path.
    pub fn parse(path: &str) -> Self {
        let trailing_slash = path.ends_with('/') && !path.chars().all(|c| c == '/');
        let mut segments = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other.to_owned()),
            }
        }
        NormalizedPath {
            segments,
            trailing_slash,
        }
    }

    /// Build a path directly from segments.
    ///
    /// The segments are taken as-is; callers are expected to hand in segments
    /// that already satisfy the non-empty, non-dot invariant (e.g. a slice of
    /// an existing `NormalizedPath`).
    pub fn from_segments(segments: Vec<String>, trailing_slash: bool) -> Self {
        NormalizedPath {
            segments,
            trailing_slash,
        }
    }

    /// The path segments, in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether the original path ended with a `/` (and was not just `/`).
    pub fn trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// `true` for the root path `/`.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// `true` when the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// A new path holding `self`'s segments followed by `other`'s.
    pub fn join(&self, other: &NormalizedPath) -> NormalizedPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        NormalizedPath {
            segments,
            trailing_slash: other.trailing_slash,
        }
    }
}

impl From<&str> for NormalizedPath {
    fn from(path: &str) -> Self {
        NormalizedPath::parse(path)
    }
}

impl PartialEq for NormalizedPath {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for NormalizedPath {}

impl Hash for NormalizedPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        if self.trailing_slash {
            f.write_str("/")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_dot_segments() {
        let path = NormalizedPath::parse("/a/./b/../c");
        assert_eq!(path.segments(), ["a", "c"]);
    }

    #[test]
    fn collapses_empty_segments() {
        let path = NormalizedPath::parse("//a///b//");
        assert_eq!(path.segments(), ["a", "b"]);
        assert!(path.trailing_slash());
    }

    #[test]
    fn dot_dot_truncates_at_root() {
        let path = NormalizedPath::parse("/../../etc/passwd");
        assert_eq!(path.segments(), ["etc", "passwd"]);
    }

    #[test]
    fn root() {
        let path = NormalizedPath::parse("/");
        assert!(path.is_root());
        assert!(!path.trailing_slash());
        assert_eq!(path.to_string(), "/");
    }

    #[test]
    fn idempotent() {
        for raw in ["/a/../b/./c//", "/", "", "/x/y", "a/b/.."] {
            let once = NormalizedPath::parse(raw);
            let twice = NormalizedPath::parse(&once.to_string());
            assert_eq!(once, twice, "normalizing {raw:?} twice diverged");
            assert_eq!(once.trailing_slash(), twice.trailing_slash());
        }
    }

    #[test]
    fn percent_encoding_is_preserved() {
        let path = NormalizedPath::parse("/a%2Fb/c");
        assert_eq!(path.segments(), ["a%2Fb", "c"]);
    }

    #[test]
    fn equality_ignores_trailing_slash() {
        assert_eq!(NormalizedPath::parse("/a/b"), NormalizedPath::parse("/a/b/"));
    }

    #[test]
    fn display_round_trip() {
        assert_eq!(NormalizedPath::parse("/a//b/").to_string(), "/a/b/");
        assert_eq!(NormalizedPath::parse("x/y").to_string(), "/x/y");
    }
}
