//! Normalized hierarchical paths.
//!
//! A [`NodePath`] always has a single leading slash and never a trailing
//! slash (except the root `/` itself). Equality is exact string equality
//! after normalization, so `"/a/b/"` and `"a/b"` name the same node.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::PathError;

const SEPARATOR: char = '/';

/// A normalized, slash-separated path to a node in the remote tree.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodePath(String);

impl NodePath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self(SEPARATOR.to_string())
    }

    /// Parse and normalize a path.
    ///
    /// Leading and trailing slashes are normalized. Empty interior segments
    /// (`/a//b`), relative segments (`.` and `..`) and NUL characters are
    /// rejected.
    pub fn new(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        if raw.contains('\0') {
            return Err(PathError::InvalidCharacter {
                path: raw.to_string(),
                character: '\0',
            });
        }

        let trimmed = raw.trim_start_matches(SEPARATOR).trim_end_matches(SEPARATOR);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        for segment in trimmed.split(SEPARATOR) {
            if segment.is_empty() {
                return Err(PathError::EmptySegment(raw.to_string()));
            }
            if segment == "." || segment == ".." {
                return Err(PathError::RelativeSegment(raw.to_string()));
            }
        }

        Ok(Self(format!("{SEPARATOR}{trimmed}")))
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// The last segment of the path (empty for the root).
    pub fn name(&self) -> &str {
        match self.0.rfind(SEPARATOR) {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// The immediate parent, or `None` for the root.
    pub fn parent(&self) -> Option<NodePath> {
        self.parent_str().map(|p| Self(p.to_string()))
    }

    fn parent_str(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(SEPARATOR) {
            Some(0) => Some("/"),
            Some(idx) => Some(&self.0[..idx]),
            None => None,
        }
    }

    /// Build the path of a direct child called `name`.
    pub fn child(&self, name: &str) -> Result<NodePath, PathError> {
        if name.is_empty() || name.contains(SEPARATOR) {
            return Err(PathError::InvalidName(name.to_string()));
        }
        if self.is_root() {
            Self::new(&format!("{SEPARATOR}{name}"))
        } else {
            Self::new(&format!("{}{SEPARATOR}{name}", self.0))
        }
    }

    /// Check whether `other` is a direct child of this path.
    ///
    /// This is an exact match on the immediate parent: `/test/onely` is not
    /// a child of `/test/one`, and `/test` is not a child of `/t`.
    pub fn is_parent_of(&self, other: &NodePath) -> bool {
        other.parent_str() == Some(self.as_str())
    }

    /// Check whether `other` lies strictly below this path at any depth.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        if self == other {
            return false;
        }
        if self.is_root() {
            return true;
        }
        other
            .0
            .strip_prefix(self.as_str())
            .is_some_and(|rest| rest.starts_with(SEPARATOR))
    }

    /// Number of segments below the root (`/` is 0, `/a/b` is 2).
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.matches(SEPARATOR).count()
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({})", self.0)
    }
}

impl FromStr for NodePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for NodePath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for NodePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<NodePath> for String {
    fn from(path: NodePath) -> Self {
        path.0
    }
}

impl AsRef<str> for NodePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodePath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> NodePath {
        NodePath::new(s).unwrap()
    }

    // ===========================================
    // Normalization Tests
    // ===========================================

    #[test]
    fn normalizes_slashes() {
        assert_eq!(p("/a/b").as_str(), "/a/b");
        assert_eq!(p("a/b").as_str(), "/a/b");
        assert_eq!(p("/a/b/").as_str(), "/a/b");
        assert_eq!(p("//a/b").as_str(), "/a/b");
        assert_eq!(p("/").as_str(), "/");
        assert_eq!(p("///").as_str(), "/");
    }

    #[test]
    fn equal_after_normalization() {
        assert_eq!(p("/test/one/"), p("test/one"));
    }

    #[test]
    fn rejects_invalid_paths() {
        assert!(matches!(NodePath::new(""), Err(PathError::Empty)));
        assert!(matches!(
            NodePath::new("/a//b"),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(
            NodePath::new("/a/../b"),
            Err(PathError::RelativeSegment(_))
        ));
        assert!(matches!(
            NodePath::new("/a/./b"),
            Err(PathError::RelativeSegment(_))
        ));
        assert!(matches!(
            NodePath::new("/a\0"),
            Err(PathError::InvalidCharacter { .. })
        ));
    }

    // ===========================================
    // Hierarchy Tests
    // ===========================================

    #[test]
    fn parent_and_name() {
        assert_eq!(p("/a/b").parent(), Some(p("/a")));
        assert_eq!(p("/a").parent(), Some(NodePath::root()));
        assert_eq!(NodePath::root().parent(), None);
        assert_eq!(p("/a/b").name(), "b");
        assert_eq!(NodePath::root().name(), "");
    }

    #[test]
    fn child_builds_paths() {
        assert_eq!(p("/a").child("b").unwrap(), p("/a/b"));
        assert_eq!(NodePath::root().child("a").unwrap(), p("/a"));
        assert!(matches!(p("/a").child(""), Err(PathError::InvalidName(_))));
        assert!(matches!(
            p("/a").child("b/c"),
            Err(PathError::InvalidName(_))
        ));
    }

    #[test]
    fn parent_match_is_exact_not_prefix() {
        let one = p("/test/one");
        assert!(p("/test").is_parent_of(&one));
        assert!(!p("/test/o").is_parent_of(&one));
        assert!(!p("/t").is_parent_of(&p("/test")));
        assert!(!p("/test").is_parent_of(&p("/test")));
        assert!(!p("/test").is_parent_of(&p("/test/one/two")));
        assert!(!one.is_parent_of(&p("/test/onely")));
        assert!(NodePath::root().is_parent_of(&p("/test")));
    }

    #[test]
    fn ancestor_match_respects_segment_boundaries() {
        assert!(p("/test").is_ancestor_of(&p("/test/one/two")));
        assert!(!p("/test").is_ancestor_of(&p("/testing")));
        assert!(!p("/test").is_ancestor_of(&p("/test")));
        assert!(NodePath::root().is_ancestor_of(&p("/x")));
        assert!(!NodePath::root().is_ancestor_of(&NodePath::root()));
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(NodePath::root().depth(), 0);
        assert_eq!(p("/a").depth(), 1);
        assert_eq!(p("/a/b/c").depth(), 3);
    }

    #[test]
    fn serde_roundtrips_as_string() {
        let json = serde_json::to_string(&p("/a/b")).unwrap();
        assert_eq!(json, "\"/a/b\"");
        let back: NodePath = serde_json::from_str("\"a/b/\"").unwrap();
        assert_eq!(back, p("/a/b"));
        assert!(serde_json::from_str::<NodePath>("\"/a//b\"").is_err());
    }
}
