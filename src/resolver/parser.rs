//! Reference token parsing.
//!
//! A reference token addresses either a task (`"<taskId>"`) or a feature
//! within a task (`"<taskId>.<featureId>"`). The separator is a literal `.`
//! and ids are not escaped, so an id containing `.` cannot be addressed;
//! id generation upstream is expected to avoid the character.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Regex for well-formed reference tokens.
/// Matches `taskId` or `taskId.featureId` with non-empty, dot-free segments.
static REF_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^.]+)(?:\.([^.]+))?$").expect("Invalid regex"));

/// The kind of entity a reference addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// A top-level task.
    Task,
    /// A feature within a task.
    Feature,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Feature => write!(f, "feature"),
        }
    }
}

/// A parsed reference address.
///
/// Doubles as the typed graph key used throughout the derived index, so a
/// task and a feature with overlapping id text can never alias each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedRef {
    /// Reference to a task.
    Task {
        /// Id of the referenced task.
        task_id: String,
    },
    /// Reference to a feature within a task.
    Feature {
        /// Id of the owning task.
        task_id: String,
        /// Id of the referenced feature.
        feature_id: String,
    },
}

impl ParsedRef {
    /// Create a task reference.
    pub fn task(task_id: impl Into<String>) -> Self {
        Self::Task {
            task_id: task_id.into(),
        }
    }

    /// Create a feature reference.
    pub fn feature(task_id: impl Into<String>, feature_id: impl Into<String>) -> Self {
        Self::Feature {
            task_id: task_id.into(),
            feature_id: feature_id.into(),
        }
    }

    /// The kind of entity addressed.
    pub fn kind(&self) -> RefKind {
        match self {
            Self::Task { .. } => RefKind::Task,
            Self::Feature { .. } => RefKind::Feature,
        }
    }

    /// Id of the task (for feature refs, the owning task).
    pub fn task_id(&self) -> &str {
        match self {
            Self::Task { task_id } | Self::Feature { task_id, .. } => task_id,
        }
    }

    /// Feature id, when this is a feature reference.
    pub fn feature_id(&self) -> Option<&str> {
        match self {
            Self::Task { .. } => None,
            Self::Feature { feature_id, .. } => Some(feature_id),
        }
    }
}

impl fmt::Display for ParsedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task { task_id } => write!(f, "{}", task_id),
            Self::Feature {
                task_id,
                feature_id,
            } => write!(f, "{}.{}", task_id, feature_id),
        }
    }
}

/// Typed compound key for features.
///
/// Replaces `"taskId.featureId"` string concatenation so that a `.` inside
/// an id cannot alias another key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureKey {
    /// Id of the owning task.
    pub task_id: String,
    /// Id of the feature within that task.
    pub feature_id: String,
}

impl FeatureKey {
    /// Create a key from its parts.
    pub fn new(task_id: impl Into<String>, feature_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            feature_id: feature_id.into(),
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.task_id, self.feature_id)
    }
}

/// Stable machine-readable codes for reference failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefErrorCode {
    /// Empty or whitespace-only token.
    Empty,
    /// Malformed token shape.
    BadFormat,
    /// The addressed task does not exist.
    TaskNotFound,
    /// The addressed feature does not exist in its task.
    FeatureNotFound,
}

impl RefErrorCode {
    /// Uppercase wire form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::BadFormat => "BAD_FORMAT",
            Self::TaskNotFound => "TASK_NOT_FOUND",
            Self::FeatureNotFound => "FEATURE_NOT_FOUND",
        }
    }
}

impl fmt::Display for RefErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error produced when a reference token cannot be parsed or resolved.
///
/// Always returned as a value, never panicked; callers render field-level
/// feedback from the carried input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefError {
    /// Token was empty or whitespace-only
    #[error("reference is empty")]
    Empty,

    /// Token shape did not match `task` or `task.feature`
    #[error("malformed reference `{token}`: expected `<task>` or `<task>.<feature>`")]
    BadFormat { token: String },

    /// The addressed task is not in the snapshot
    #[error("task `{task_id}` does not exist")]
    TaskNotFound { task_id: String },

    /// The owning task exists but the feature does not
    #[error("feature `{feature_id}` does not exist in task `{task_id}`")]
    FeatureNotFound {
        task_id: String,
        feature_id: String,
    },
}

impl RefError {
    /// The stable machine-readable code for this failure.
    pub fn code(&self) -> RefErrorCode {
        match self {
            Self::Empty => RefErrorCode::Empty,
            Self::BadFormat { .. } => RefErrorCode::BadFormat,
            Self::TaskNotFound { .. } => RefErrorCode::TaskNotFound,
            Self::FeatureNotFound { .. } => RefErrorCode::FeatureNotFound,
        }
    }
}

/// Parse a reference token into a structured address.
///
/// Total over arbitrary input: every failure comes back as a [`RefError`],
/// never a panic. Surrounding whitespace is ignored.
pub fn parse_ref(token: &str) -> Result<ParsedRef, RefError> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(RefError::Empty);
    }

    let caps = REF_TOKEN_RE.captures(trimmed).ok_or_else(|| RefError::BadFormat {
        token: token.to_string(),
    })?;

    let task_id = caps[1].to_string();
    match caps.get(2) {
        Some(feature) => Ok(ParsedRef::Feature {
            task_id,
            feature_id: feature.as_str().to_string(),
        }),
        None => Ok(ParsedRef::Task { task_id }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_task_refs() {
        assert_eq!(parse_ref("12").unwrap(), ParsedRef::task("12"));
        assert_eq!(parse_ref("  12  ").unwrap(), ParsedRef::task("12"));
    }

    #[test]
    fn parses_feature_refs() {
        assert_eq!(parse_ref("12.a").unwrap(), ParsedRef::feature("12", "a"));
        assert_eq!(
            parse_ref("12.a").unwrap().feature_id(),
            Some("a")
        );
        assert_eq!(parse_ref("12.a").unwrap().kind(), RefKind::Feature);
    }

    #[test]
    fn rejects_empty_tokens() {
        assert_eq!(parse_ref("").unwrap_err(), RefError::Empty);
        assert_eq!(parse_ref("   ").unwrap_err(), RefError::Empty);
        assert_eq!(parse_ref("").unwrap_err().code(), RefErrorCode::Empty);
    }

    #[test]
    fn rejects_malformed_tokens() {
        for token in ["a.b.c", "a.", ".a", ".", "..", "a..b"] {
            let err = parse_ref(token).unwrap_err();
            assert_eq!(err.code(), RefErrorCode::BadFormat, "token: {:?}", token);
            assert_eq!(
                err,
                RefError::BadFormat {
                    token: token.to_string()
                }
            );
        }
    }

    #[test]
    fn display_renders_canonical_tokens() {
        assert_eq!(ParsedRef::task("7").to_string(), "7");
        assert_eq!(ParsedRef::feature("7", "x").to_string(), "7.x");
        assert_eq!(FeatureKey::new("7", "x").to_string(), "7.x");
    }

    proptest! {
        /// Parsing is total: any input yields a value, never a panic.
        #[test]
        fn parse_never_panics(token in ".*") {
            let _ = parse_ref(&token);
        }

        /// Valid tokens round-trip through Display.
        #[test]
        fn valid_tokens_round_trip(
            task_id in "[^.\\s][^.]{0,8}",
            feature_id in proptest::option::of("[^.\\s][^.]{0,8}"),
        ) {
            // Inner whitespace is allowed in ids; leading/trailing is trimmed
            // by the parser, so generate ids without edge whitespace.
            let task_id = task_id.trim().to_string();
            let feature_id = feature_id.map(|f| f.trim().to_string());
            prop_assume!(!task_id.is_empty());
            prop_assume!(feature_id.as_deref() != Some(""));

            let parsed = match &feature_id {
                Some(feature_id) => ParsedRef::feature(&task_id, feature_id),
                None => ParsedRef::task(&task_id),
            };
            prop_assert_eq!(parse_ref(&parsed.to_string()).unwrap(), parsed);
        }
    }
}
