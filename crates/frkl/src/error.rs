//! Error types for configuration resolution

use std::fmt;
use std::path::PathBuf;

/// Result type alias for resolver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an error, used to pick exit codes and advice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The user's configuration is malformed, ambiguous or unresolvable.
    Configuration,
    /// An internal invariant was violated (a defect, not a config problem).
    Internal,
    /// Reading a local file or a remote location failed.
    Io,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Configuration error",
            Self::Internal => "Internal error",
            Self::Io => "I/O error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Configuration => "Fix the offending key or value in your configuration",
            Self::Internal => "This is a bug, please report it together with your configuration",
            Self::Io => "Check that the file or URL exists and is readable",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while resolving configuration sources.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unresolvable configuration.
    #[error("{message}")]
    Config {
        /// What went wrong.
        message: String,
        /// The offending key, if one can be named.
        key: Option<String>,
        /// The offending value, rendered for display.
        value: Option<String>,
    },

    /// A source location could not be expanded (unknown shape, too few parts).
    #[error("can't expand location '{location}': {reason}")]
    Abbreviation {
        /// Location as written by the user.
        location: String,
        /// Why expansion failed.
        reason: String,
    },

    /// A source includes itself, directly or through its descendants.
    #[error("configuration cycle detected: {}", .chain.join(" -> "))]
    Cycle {
        /// Ancestor chain, ending with the repeated location.
        chain: Vec<String>,
    },

    /// Template rendering of a fetched source failed.
    #[error("can't render template for '{location}': {message}")]
    Template {
        /// Where the template came from.
        location: String,
        /// Renderer message.
        message: String,
    },

    /// Reading a local file failed.
    #[error("can't read {}: {source}", .path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Fetching a remote source failed.
    #[error("can't fetch {url}: {message}")]
    Fetch {
        /// Remote URL.
        url: String,
        /// Transport message.
        message: String,
    },

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Bug(String),
}

impl Error {
    /// Shorthand for a configuration error with key and value context.
    pub fn config(
        message: impl Into<String>,
        key: impl Into<String>,
        value: impl fmt::Display,
    ) -> Self {
        Self::Config {
            message: message.into(),
            key: Some(key.into()),
            value: Some(value.to_string()),
        }
    }

    /// Configuration error without key context.
    pub fn config_msg(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            key: None,
            value: None,
        }
    }

    /// Category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. }
            | Self::Abbreviation { .. }
            | Self::Cycle { .. }
            | Self::Template { .. } => ErrorCategory::Configuration,
            Self::Read { .. } | Self::Fetch { .. } => ErrorCategory::Io,
            Self::Bug(_) => ErrorCategory::Internal,
        }
    }

    /// Whether this error means the user's configuration must change.
    pub fn is_config(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::config_msg("bad").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            Error::Cycle {
                chain: vec!["a".into(), "a".into()]
            }
            .category(),
            ErrorCategory::Configuration
        );
        assert_eq!(Error::Bug("x".into()).category(), ErrorCategory::Internal);
        assert_eq!(
            Error::Fetch {
                url: "https://x".into(),
                message: "404".into()
            }
            .category(),
            ErrorCategory::Io
        );
    }

    #[test]
    fn test_cycle_display() {
        let err = Error::Cycle {
            chain: vec!["a.yml".into(), "b.yml".into(), "a.yml".into()],
        };
        assert_eq!(
            err.to_string(),
            "configuration cycle detected: a.yml -> b.yml -> a.yml"
        );
    }

    #[test]
    fn test_config_carries_key_and_value() {
        match Error::config("Key not allowed", "foo", "bar") {
            Error::Config { key, value, .. } => {
                assert_eq!(key.as_deref(), Some("foo"));
                assert_eq!(value.as_deref(), Some("bar"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
