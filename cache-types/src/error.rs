//! Error types for the mirror cache.

use thiserror::Error;

use crate::path::NodePath;

/// Errors produced when parsing a [`NodePath`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path string was empty.
    #[error("path must not be empty")]
    Empty,

    /// The path contained an empty segment (`//`).
    #[error("empty segment in path: {0}")]
    EmptySegment(String),

    /// The path contained a `.` or `..` segment.
    #[error("relative segment in path: {0}")]
    RelativeSegment(String),

    /// The path contained a forbidden character.
    #[error("invalid character {character:?} in path: {path}")]
    InvalidCharacter {
        /// The offending path.
        path: String,
        /// The rejected character.
        character: char,
    },

    /// A child name was empty or contained a separator.
    #[error("invalid child name: {0:?}")]
    InvalidName(String),
}

/// Errors surfaced to callers of the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The remote store was unreachable at start and readiness was required.
    #[error("cache startup failed: {0}")]
    Startup(String),

    /// The requested path is not present in the cache.
    #[error("node not present in cache: {0}")]
    NotPresent(NodePath),

    /// A path argument could not be parsed.
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// The cache has not been started.
    #[error("cache not started")]
    NotStarted,

    /// `start()` was called twice.
    #[error("cache already started")]
    AlreadyStarted,

    /// The cache has been stopped and cannot be restarted.
    #[error("cache stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CacheError::NotPresent(NodePath::new("/test/node").unwrap());
        assert_eq!(err.to_string(), "node not present in cache: /test/node");

        let err = CacheError::from(PathError::EmptySegment("/a//b".into()));
        assert_eq!(err.to_string(), "invalid path: empty segment in path: /a//b");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CacheError>();
        assert_send_sync::<PathError>();
    }
}
