//! Error types for materialization and execution

use std::fmt;

/// Result type alias for declarative operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error category, one per way an invocation can end badly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed, ambiguous or unresolvable configuration.
    Configuration,
    /// A run failed, or the engine could not be driven.
    Execution,
    /// An internal invariant was violated.
    Internal,
    /// Reading configuration failed.
    Io,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Configuration error",
            Self::Execution => "Execution failed",
            Self::Internal => "Internal error",
            Self::Io => "I/O error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Configuration => "Fix the offending key or value in your configuration",
            Self::Execution => "Check the task output above, or re-run with --details",
            Self::Internal => "This is a bug, please report it together with your configuration",
            Self::Io => "Check that the file or URL exists and is readable",
        }
    }

    /// Process exit code for this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Execution | Self::Io => 1,
            Self::Configuration => 2,
            Self::Internal => 3,
        }
    }
}

impl From<frkl::ErrorCategory> for ErrorCategory {
    fn from(category: frkl::ErrorCategory) -> Self {
        match category {
            frkl::ErrorCategory::Configuration => Self::Configuration,
            frkl::ErrorCategory::Internal => Self::Internal,
            frkl::ErrorCategory::Io => Self::Io,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors raised while binding, materializing and executing tasks.
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

    /// A run reported failure; later runs were not started.
    #[error("run #{run} failed")]
    RunFailed {
        /// One-based run index.
        run: usize,
    },

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Bug(String),

    /// Resolving configuration sources failed.
    #[error(transparent)]
    Resolve(#[from] frkl::Error),

    /// The execution engine could not be prepared or driven.
    #[error(transparent)]
    Engine(#[from] anyhow::Error),
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

    /// Category of this error.
    ///
    /// Engine errors carrying one of our own errors report its category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::Configuration,
            Self::RunFailed { .. } => ErrorCategory::Execution,
            Self::Bug(_) => ErrorCategory::Internal,
            Self::Resolve(e) => e.category().into(),
            Self::Engine(e) => e
                .downcast_ref::<Error>()
                .map_or(ErrorCategory::Execution, Error::category),
        }
    }

    /// The offending key and value of a configuration error, if any.
    pub fn context(&self) -> Option<(Option<&str>, Option<&str>)> {
        match self {
            Self::Config { key, value, .. } => Some((key.as_deref(), value.as_deref())),
            Self::Resolve(frkl::Error::Config { key, value, .. }) => {
                Some((key.as_deref(), value.as_deref()))
            }
            _ => None,
        }
    }
}
