//! Error types for schema-validated encoding and decoding.
//!
//! Every failure in the codec path is raised synchronously at the point of detection and
//! never retried internally. The caller decides whether to abort the stream or skip the
//! current message.
//!
//! ## Error Categories
//!
//! - **Decoding Errors**: schema/type-identity mismatch, unknown field, premature end of a
//!   composite, out-of-range union selector
//! - **Encoding Errors**: no open composite scope for a field, missing type information
//! - **End of Stream**: a primitive read exhausted the underlying stream
//! - **Limit Exceeded**: a length prefix is above the configured cap
//! - **Format Errors**: container magic, sync-marker or compression codec problems
//! - **Schema Errors**: schema compilation or schema JSON parsing failures
//!
//! ## Recovery
//!
//! ```rust
//! use opcua_avro::CodecError;
//!
//! let error = CodecError::decoding("expected org.opcfoundation.ua.Int32, found string");
//! if error.is_message_local() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for codec operations.
pub type Result<T, E = CodecError> = std::result::Result<T, E>;

/// Main error type for codec operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    #[error("Decoding failed: {reason}")]
    Decoding { reason: String },

    #[error("Encoding failed: {reason}")]
    Encoding { reason: String },

    #[error("Unexpected end of stream while reading {context}")]
    EndOfStream { context: String },

    #[error("{what} length {length} exceeds the configured limit of {limit}")]
    LimitExceeded { what: String, length: u64, limit: u64 },

    #[error("Container format error: {reason}")]
    Format { reason: String },

    #[error("Schema error in {context}: {details}")]
    Schema { context: String, details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("I/O error during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl CodecError {
    /// Returns whether the failure is confined to the current message.
    ///
    /// Message-local errors leave the underlying stream usable once the caller re-synchronises
    /// (for example at the next container block). Stream-level errors do not.
    pub fn is_message_local(&self) -> bool {
        match self {
            CodecError::Decoding { .. } => true,
            CodecError::Encoding { .. } => true,
            CodecError::LimitExceeded { .. } => true,
            CodecError::EndOfStream { .. } => false,
            CodecError::Format { .. } => false,
            CodecError::Schema { .. } => false,
            CodecError::Config { .. } => false,
            CodecError::Io { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            CodecError::Decoding { .. } => vec![
                "Check that the reader schema matches the writer schema",
                "Verify the call sequence follows the record field order",
                "Skip the message and continue with the next block",
            ],
            CodecError::Encoding { .. } => vec![
                "Check that every written field exists in the schema",
                "Provide structure type information for extension objects",
                "Close composite scopes in the order they were opened",
            ],
            CodecError::EndOfStream { .. } => vec![
                "Check whether the producer truncated the stream",
                "Verify the message boundaries of the transport",
            ],
            CodecError::LimitExceeded { .. } => vec![
                "Increase the configured length limit",
                "Verify the length prefix is not corrupted",
            ],
            CodecError::Format { .. } => vec![
                "Verify the file is an object container file",
                "Check for corruption around the reported block",
                "Use a supported compression codec (null or deflate)",
            ],
            CodecError::Schema { .. } => vec![
                "Check the type descriptions for missing dependencies",
                "Verify names escape to distinct symbols",
            ],
            CodecError::Config { .. } => vec![
                "Use positive values for every configured limit",
                "Check the configuration file syntax",
            ],
            CodecError::Io { .. } => vec![
                "Check the underlying stream is still open",
                "Verify file permissions and free disk space",
            ],
        }
    }

    /// Helper constructor for decoding errors.
    pub fn decoding(reason: impl Into<String>) -> Self {
        CodecError::Decoding { reason: reason.into() }
    }

    /// Helper constructor for encoding errors.
    pub fn encoding(reason: impl Into<String>) -> Self {
        CodecError::Encoding { reason: reason.into() }
    }

    /// Helper constructor for end-of-stream errors.
    pub fn end_of_stream(context: impl Into<String>) -> Self {
        CodecError::EndOfStream { context: context.into() }
    }

    /// Helper constructor for length limit errors.
    pub fn limit_exceeded(what: impl Into<String>, length: u64, limit: u64) -> Self {
        CodecError::LimitExceeded { what: what.into(), length, limit }
    }

    /// Helper constructor for container format errors.
    pub fn format(reason: impl Into<String>) -> Self {
        CodecError::Format { reason: reason.into() }
    }

    /// Helper constructor for schema errors.
    pub fn schema(context: impl Into<String>, details: impl Into<String>) -> Self {
        CodecError::Schema { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        CodecError::Config { reason: reason.into() }
    }

    /// Helper constructor for I/O errors with operation context.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            return CodecError::EndOfStream { context: operation.into() };
        }
        CodecError::Io { operation: operation.into(), source }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::io("stream access", err)
    }
}

/// A divergence between the call sequence and the schema being traversed.
///
/// Raised by [`SchemaTraverser`](crate::SchemaTraverser). Decoders surface it as
/// [`CodecError::Decoding`], encoders as [`CodecError::Encoding`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SchemaViolation(pub String);

impl SchemaViolation {
    pub fn new(message: impl Into<String>) -> Self {
        SchemaViolation(message.into())
    }
}

impl From<SchemaViolation> for CodecError {
    fn from(violation: SchemaViolation) -> Self {
        CodecError::Decoding { reason: violation.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(test)]
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            what in "\\w+",
            length in 0u64..u64::MAX,
            limit in 0u64..u64::MAX
          ) {
            let decoding = CodecError::decoding(reason.clone());
            let encoding = CodecError::encoding(reason.clone());
            let format = CodecError::format(reason.clone());
            let limit_error = CodecError::limit_exceeded(what.clone(), length, limit);

            prop_assert!(decoding.to_string().contains(&reason));
            prop_assert!(encoding.to_string().contains(&reason));
            prop_assert!(format.to_string().contains(&reason));

            let limit_msg = limit_error.to_string();
            prop_assert!(limit_msg.contains(&what));
            prop_assert!(limit_msg.contains(&length.to_string()));
            prop_assert!(limit_msg.contains(&limit.to_string()));
          }

          #[test]
          fn violations_lift_into_decoding_errors(message in ".*") {
            let lifted: CodecError = SchemaViolation::new(message.clone()).into();
            match lifted {
              CodecError::Decoding { reason } => prop_assert_eq!(reason, message),
              other => prop_assert!(false, "Expected Decoding, got {:?}", other),
            }
          }
        }
    }

    #[test]
    fn unexpected_eof_maps_to_end_of_stream() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: CodecError = eof.into();
        assert!(matches!(err, CodecError::EndOfStream { .. }));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CodecError::io("opening container", denied);
        match err {
            CodecError::Io { operation, source } => {
                assert_eq!(operation, "opening container");
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            other => panic!("Expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<CodecError>();
        assert_send_sync_static::<SchemaViolation>();

        let error = CodecError::format("bad magic");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_methods_work() {
        let decoding = CodecError::decoding("field mismatch");
        let format = CodecError::format("sync marker mismatch");

        assert!(decoding.is_message_local());
        assert!(!format.is_message_local());
        assert!(!CodecError::end_of_stream("varint").is_message_local());

        for error in [decoding, format, CodecError::config("zero limit")] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }
    }
}
