//! Error handling for the BCI pipeline
//!
//! Two failure classes exist: configuration errors are fatal and raised
//! synchronously at the offending call, transport errors are retried or
//! logged by the stream loop. A degenerate computation result (e.g. outlier
//! trimming that removes everything) is `None`, never an error.

use std::fmt;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type shared by all pipeline crates
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PipelineError {
    /// Invalid configuration: bad axis, shape mismatch, invalid Welch
    /// width, taper/width disagreement. Fatal, never retried.
    Configuration {
        /// Description of the configuration error
        message: String,
    },

    /// Buffer transport failure: connect, header, wait, fetch or publish.
    /// Retried during connection, logged and skipped while streaming.
    Transport {
        /// Description of the transport error
        message: String,
    },
}

impl PipelineError {
    /// Configuration error from anything displayable
    pub fn configuration(message: impl Into<String>) -> Self {
        PipelineError::Configuration { message: message.into() }
    }

    /// Transport error from anything displayable
    pub fn transport(message: impl Into<String>) -> Self {
        PipelineError::Transport { message: message.into() }
    }

    /// True for errors the stream loop may retry
    pub fn is_transport(&self) -> bool {
        matches!(self, PipelineError::Transport { .. })
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Configuration { message } => {
                write!(f, "Invalid configuration: {}", message)
            }
            PipelineError::Transport { message } => {
                write!(f, "Transport error: {}", message)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::error::PipelineError::Configuration {
            message: format!($($arg)*),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PipelineError::configuration("axis must be 0 or 1, got -1");
        let display = format!("{}", error);
        assert!(display.contains("Invalid configuration"));
        assert!(display.contains("axis"));
    }

    #[test]
    fn test_error_classification() {
        assert!(PipelineError::transport("connection refused").is_transport());
        assert!(!PipelineError::configuration("bad shape").is_transport());
    }

    #[test]
    fn test_config_error_macro() {
        let error = config_error!("expected {} elements, got {}", 4, 6);
        assert_eq!(
            error,
            PipelineError::Configuration {
                message: "expected 4 elements, got 6".to_string()
            }
        );
    }
}
