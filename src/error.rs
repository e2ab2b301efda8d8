//! Error types for schema construction, record access and dispatch.
//!
//! All errors implement the `std::error::Error` trait and carry structured
//! context (field names, offsets, sizes) for debugging.
//!
//! ## Error Categories
//!
//! - **Schema Errors**: duplicate names, bad parents, container overflows,
//!   mutation of a sealed source
//! - **Cardinality Errors**: requesting a packet shape the source does not produce
//! - **Deserialization Errors**: malformed wire bytes or records whose shape
//!   diverges from the live schema
//! - **Access Errors**: reads of truncated slots, writes wider than a field
//! - **Subscriber Errors**: failures returned by dispatch callbacks, preserved verbatim
//!
//! ## Recovery
//!
//! ```rust
//! use fieldstream::DataSourceError;
//!
//! let error = DataSourceError::duplicate_field("pid");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::SourceKind;

/// Boxed error returned by subscriber callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for data source operations.
pub type Result<T, E = DataSourceError> = std::result::Result<T, E>;

/// Dispatch stage a subscriber failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Data,
    Array,
    Packet,
}

impl std::fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStage::Data => f.write_str("data"),
            DispatchStage::Array => f.write_str("array"),
            DispatchStage::Packet => f.write_str("packet"),
        }
    }
}

/// Main error type for data source operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DataSourceError {
    #[error("field {name:?} already exists")]
    DuplicateField { name: String },

    #[error("invalid parent for field {field:?}: {reason}")]
    InvalidParent { field: String, reason: String },

    #[error(
        "field {field:?} exceeds size of container (offs {offs}, size {size}, container size {container_size})"
    )]
    ContainerOverflow { field: String, offs: u32, size: u32, container_size: u32 },

    #[error("unknown field id {id}")]
    UnknownField { id: u32 },

    #[error("schema error: {reason}")]
    Schema { reason: String },

    #[error("data source {source_name:?} is sealed; fields cannot be added after dispatch started")]
    Sealed { source_name: String },

    #[error("only {expected} data sources can {operation}")]
    CardinalityMismatch { expected: SourceKind, operation: &'static str },

    #[error("deserialization failed in {context}")]
    Deserialization {
        context: &'static str,
        #[source]
        source: Option<prost::DecodeError>,
    },

    #[error("payload does not match schema: {details}")]
    PayloadMismatch { details: String },

    #[error("invalid size for field {field:?}: need {needed} bytes, slot holds {available}")]
    InvalidSize { field: String, needed: usize, available: usize },

    #[error("value for field {field:?} is {width} bytes wide, field size is {size}")]
    ValueTooWide { field: String, width: usize, size: usize },

    #[error("type conversion error: {details}")]
    TypeConversion { details: String },

    #[error("field {field:?} has no payload storage")]
    NoPayload { field: String },

    #[error("{stage} subscriber (priority {priority}) failed")]
    Subscriber {
        stage: DispatchStage,
        priority: i32,
        #[source]
        source: BoxError,
    },

    #[error("configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("provider error: {reason}")]
    Provider {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl DataSourceError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Only provider failures are transient; everything else describes a
    /// schema or input that will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataSourceError::Provider { .. } => true,
            DataSourceError::DuplicateField { .. }
            | DataSourceError::InvalidParent { .. }
            | DataSourceError::ContainerOverflow { .. }
            | DataSourceError::UnknownField { .. }
            | DataSourceError::Schema { .. }
            | DataSourceError::Sealed { .. }
            | DataSourceError::CardinalityMismatch { .. }
            | DataSourceError::Deserialization { .. }
            | DataSourceError::PayloadMismatch { .. }
            | DataSourceError::InvalidSize { .. }
            | DataSourceError::ValueTooWide { .. }
            | DataSourceError::TypeConversion { .. }
            | DataSourceError::NoPayload { .. }
            | DataSourceError::Subscriber { .. }
            | DataSourceError::File { .. }
            | DataSourceError::Config { .. } => false,
        }
    }

    /// Returns true for errors raised while building or mutating the schema.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            DataSourceError::DuplicateField { .. }
                | DataSourceError::InvalidParent { .. }
                | DataSourceError::ContainerOverflow { .. }
                | DataSourceError::UnknownField { .. }
                | DataSourceError::Schema { .. }
                | DataSourceError::Sealed { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            DataSourceError::DuplicateField { .. } => vec![
                "Choose a unique field name",
                "Look the field up with get_field before adding it",
            ],
            DataSourceError::InvalidParent { .. } => vec![
                "Reference parents by their index inside the same batch",
                "Check the parent chain for cycles",
            ],
            DataSourceError::ContainerOverflow { .. } => vec![
                "Increase the declared container size",
                "Verify member offsets and sizes",
            ],
            DataSourceError::UnknownField { .. } => vec!["Check field indices in the descriptor"],
            DataSourceError::Schema { .. } => vec![
                "Check field flags and kinds",
                "Verify the descriptor was produced by a compatible sender",
            ],
            DataSourceError::Sealed { .. } => vec![
                "Add all fields during setup, before the first emit",
                "Create a new data source for a new schema",
            ],
            DataSourceError::CardinalityMismatch { .. } => vec![
                "Create packets matching the data source kind",
                "Use array subscribers only on array data sources",
            ],
            DataSourceError::Deserialization { .. } => vec![
                "Verify the sender uses the same wire format",
                "Check the transport for truncation",
            ],
            DataSourceError::PayloadMismatch { .. } => vec![
                "Verify sender and receiver share the same schema",
                "Rebuild the receiver schema from the sender's descriptor",
            ],
            DataSourceError::InvalidSize { .. } => vec![
                "Verify the record was produced for this schema",
                "Write the container slot before reading members",
            ],
            DataSourceError::ValueTooWide { .. } => vec![
                "Truncate the value to the field size",
                "Declare a larger field size",
            ],
            DataSourceError::TypeConversion { .. } => vec![
                "Use the Rust type matching the field kind",
                "Use get_value for dynamically typed access",
            ],
            DataSourceError::NoPayload { .. } => {
                vec!["Empty fields carry no data; read their children instead"]
            }
            DataSourceError::Subscriber { .. } => vec![
                "Inspect the subscriber error source",
                "Decide retry or skip in the embedding pipeline",
            ],
            DataSourceError::File { .. } => {
                vec!["Check the file exists and is readable", "Check file permissions"]
            }
            DataSourceError::Config { .. } => {
                vec!["Validate the YAML against the documented layout", "Check field kinds"]
            }
            DataSourceError::Provider { .. } => vec![
                "Retry after a short backoff",
                "Check the upstream producer is still running",
            ],
        }
    }

    /// Helper constructor for duplicate field errors.
    pub fn duplicate_field(name: impl Into<String>) -> Self {
        DataSourceError::DuplicateField { name: name.into() }
    }

    /// Helper constructor for generic schema errors.
    pub fn schema(reason: impl Into<String>) -> Self {
        DataSourceError::Schema { reason: reason.into() }
    }

    /// Helper constructor for payload/schema mismatches on deserialized records.
    pub fn payload_mismatch(details: impl Into<String>) -> Self {
        DataSourceError::PayloadMismatch { details: details.into() }
    }

    /// Helper constructor for provider failures.
    pub fn provider(reason: impl Into<String>) -> Self {
        DataSourceError::Provider { reason: reason.into(), source: None }
    }

    /// Helper constructor for provider failures with source.
    pub fn provider_with_source(reason: impl Into<String>, source: BoxError) -> Self {
        DataSourceError::Provider { reason: reason.into(), source: Some(source) }
    }

    /// Unwraps the exact error a subscriber returned, if this is a subscriber failure.
    pub fn into_subscriber_error(self) -> Result<BoxError, Self> {
        match self {
            DataSourceError::Subscriber { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}

impl From<prost::DecodeError> for DataSourceError {
    fn from(err: prost::DecodeError) -> Self {
        DataSourceError::Deserialization { context: "wire message", source: Some(err) }
    }
}

impl From<serde_yaml_ng::Error> for DataSourceError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        DataSourceError::Config { context: "YAML".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_messages_contain_their_context(
                name in "[a-z_]{1,16}",
                offs in 0u32..4096,
                size in 1u32..64,
                container_size in 0u32..4096,
            ) {
                let dup = DataSourceError::duplicate_field(name.clone());
                prop_assert!(dup.to_string().contains(&name));

                let overflow = DataSourceError::ContainerOverflow {
                    field: name.clone(),
                    offs,
                    size,
                    container_size,
                };
                let msg = overflow.to_string();
                prop_assert!(msg.contains(&name));
                prop_assert!(msg.contains(&container_size.to_string()));

                let invalid = DataSourceError::InvalidSize {
                    field: name.clone(),
                    needed: (offs + size) as usize,
                    available: 0,
                };
                prop_assert!(invalid.to_string().contains(&(offs + size).to_string()));
            }

            #[test]
            fn subscriber_source_survives_wrapping(message in ".*") {
                let err = DataSourceError::Subscriber {
                    stage: DispatchStage::Data,
                    priority: 0,
                    source: Box::new(std::io::Error::other(message.clone())),
                };
                let source = std::error::Error::source(&err).map(|s| s.to_string());
                prop_assert_eq!(source, Some(message.clone()));

                let inner = err.into_subscriber_error().unwrap();
                prop_assert_eq!(inner.to_string(), message);
            }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<DataSourceError>();

        let error = DataSourceError::schema("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn classification_methods() {
        assert!(DataSourceError::provider("gone").is_retryable());
        assert!(!DataSourceError::duplicate_field("pid").is_retryable());

        assert!(DataSourceError::duplicate_field("pid").is_schema_error());
        assert!(DataSourceError::Sealed { source_name: "events".into() }.is_schema_error());
        assert!(!DataSourceError::payload_mismatch("x").is_schema_error());

        for err in [
            DataSourceError::duplicate_field("pid"),
            DataSourceError::UnknownField { id: 4 },
            DataSourceError::NoPayload { field: "p".into() },
            DataSourceError::provider("gone"),
        ] {
            let suggestions = err.recovery_suggestions();
            assert!(!suggestions.is_empty());
            assert!(suggestions.iter().all(|s| s.len() > 5));
        }
    }

    #[test]
    fn non_subscriber_errors_are_returned_untouched() {
        let err = DataSourceError::UnknownField { id: 7 };
        match err.into_subscriber_error() {
            Err(DataSourceError::UnknownField { id }) => assert_eq!(id, 7),
            _ => panic!("Expected UnknownField back"),
        }
    }

    #[test]
    fn decode_errors_convert_to_deserialization() {
        // field 1, varint wire type, value missing
        let decode = <u32 as prost::Message>::decode(&[0x08u8][..]).unwrap_err();
        let err: DataSourceError = decode.into();
        assert!(matches!(err, DataSourceError::Deserialization { source: Some(_), .. }));
    }

    #[test]
    fn cardinality_message_names_kind() {
        let err = DataSourceError::CardinalityMismatch {
            expected: SourceKind::Array,
            operation: "create array packets",
        };
        assert_eq!(err.to_string(), "only array data sources can create array packets");
    }
}
