//! Error handling for LedVis-RS
//!
//! Each subsystem defines its own error enum next to the code that raises it
//! (codec, stream, mapping). This module ties them together into a single
//! [`LedVisError`] for callers that only want one type, plus a `Result`
//! alias and a small context extension trait.

use thiserror::Error;

use crate::mapping::MappingError;
use crate::protocol::{ProtocolError, ValidationError};
use crate::stream::StreamError;

/// Main error type for LedVis-RS operations
#[derive(Error, Debug)]
pub enum LedVisError {
    /// A frame failed wire-format validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A frame could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Streaming connection errors
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Position layout errors
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<LedVisError>,
    },
}

impl LedVisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        LedVisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for LedVis-RS operations
pub type Result<T> = std::result::Result<T, LedVisError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<LedVisError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameType;

    #[test]
    fn test_error_display() {
        let err = LedVisError::Config("capacity must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: capacity must be at least 1"
        );
    }

    #[test]
    fn test_error_with_context() {
        let err = LedVisError::Config("bad".to_string());
        let with_ctx = err.with_context("Failed to load config");
        assert!(with_ctx.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_validation_error_converts() {
        let res: std::result::Result<(), ValidationError> = Err(ValidationError::SizeMismatch {
            frame_type: FrameType::LedData,
            expected: 544,
            actual: 10,
        });
        let err = res.context("decoding frame").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("decoding frame"));
        assert!(text.contains("544"));
    }

    #[test]
    fn test_layout_error_keeps_source_under_context() {
        use crate::mapping::{compute_positions, PositionConfig};
        use std::error::Error as _;

        let config = PositionConfig {
            radius: -1.0,
            ..PositionConfig::default()
        };
        let err = compute_positions(&config)
            .context("computing LED layout")
            .unwrap_err();
        assert!(err.to_string().contains("computing LED layout"));
        assert!(matches!(
            &err,
            LedVisError::WithContext { source, .. }
                if matches!(**source, LedVisError::Mapping(MappingError::InvalidRadius(_)))
        ));
        assert!(err.source().unwrap().to_string().contains("radius"));
    }
}
