//! Error types for the static pod installer
//!
//! Errors carry the resource kind, namespace and name they relate to so the
//! single failure event emitted at the end of an install is actionable on its own.
//! Only [`Error::TransientConnection`] is retried; every other variant is fatal
//! for the current install.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for installer operations
#[derive(Debug, Error)]
pub enum Error {
    /// Non-transient Kubernetes API error (4xx other than 404, decode failures, auth)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Malformed or incomplete install request
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The offending option (e.g. "--revision")
        field: Option<String>,
    },

    /// The API server could not be reached or was temporarily unavailable
    #[error("transient connection error during {operation}: {message}")]
    TransientConnection {
        /// Operation that was attempted (e.g. "get secret kube-system/etcd-7")
        operation: String,
        /// Description of the failure
        message: String,
    },

    /// A required resource does not exist for this revision
    #[error("required {kind} {namespace}/{name} (prefix {prefix:?}) not found")]
    MissingRequiredResource {
        /// Resource kind ("secret", "configmap")
        kind: String,
        /// Namespace the resource was looked up in
        namespace: String,
        /// Revision-independent prefix
        prefix: String,
        /// Revisioned name that was looked up
        name: String,
    },

    /// An optional resource exists but carries no content keys
    #[error("optional {kind} {namespace}/{name} exists but has no content")]
    EmptyResource {
        /// Resource kind ("secret", "configmap")
        kind: String,
        /// Namespace of the resource
        namespace: String,
        /// Revisioned name of the resource
        name: String,
    },

    /// The pod template was fetched but is unusable
    #[error("malformed pod template {name}: {message}")]
    MalformedTemplate {
        /// Revisioned name of the template configmap
        name: String,
        /// Description of what's wrong
        message: String,
    },

    /// A pod mutation rejected the manifest
    #[error("pod mutation #{index} ({name}) failed: {message}")]
    Mutation {
        /// Position of the mutation in the ordered list
        index: usize,
        /// Name of the mutation
        name: String,
        /// Message returned by the mutation
        message: String,
    },

    /// The install deadline elapsed while an operation was still being retried
    #[error("deadline exceeded during {operation}{}", last_error_suffix(.last_error))]
    DeadlineExceeded {
        /// Operation that was being retried
        operation: String,
        /// Last error observed before the deadline fired
        #[source]
        last_error: Option<Box<Error>>,
    },

    /// Local filesystem failure
    #[error("io error at {}: {source}", .path.display())]
    Io {
        /// Path being created or written
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A content key that cannot be used as a single file name
    #[error("{kind} {name} has content key {key:?} that is not a valid file name")]
    InvalidContentKey {
        /// Resource kind ("secret", "configmap")
        kind: String,
        /// Revisioned name of the resource
        name: String,
        /// The rejected key
        key: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "create_client")
        context: String,
    },

    /// Several independent failures from one stage
    #[error("{} errors: {}", .errors.len(), join_errors(.errors))]
    Aggregate {
        /// The collected errors, in processing order
        errors: Vec<Error>,
    },
}

fn last_error_suffix(last_error: &Option<Box<Error>>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending option
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a transient connection error for an operation
    pub fn transient(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::TransientConnection {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a malformed template error
    pub fn malformed_template(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedTemplate {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a deadline error wrapping the last observed error, if any
    pub fn deadline_exceeded(operation: impl Into<String>, last_error: Option<Error>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
            last_error: last_error.map(Box::new),
        }
    }

    /// Create an I/O error for a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Collapse a list of stage failures into one error.
    ///
    /// Returns `None` for an empty list and the error itself when there is
    /// exactly one, so single failures keep their precise variant.
    pub fn aggregate(mut errors: Vec<Error>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Aggregate { errors }),
        }
    }

    /// Classify a kube-rs error returned by `operation`.
    ///
    /// Server-side unavailability (5xx, 429) and transport failures (connect
    /// refused, resets, client timeouts) are transient. Everything else is
    /// returned as a fatal [`Error::Kube`]. Callers handle 404 before this.
    pub fn from_kube(operation: impl Into<String>, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code >= 500 || ae.code == 429 => {
                Self::transient(operation, format!("{} ({})", ae.message, ae.code))
            }
            kube::Error::HyperError(_) | kube::Error::Service(_) => {
                Self::transient(operation, err.to_string())
            }
            _ => Self::Kube { source: err },
        }
    }

    /// Check if this error is retryable
    ///
    /// Only connection-level failures are worth retrying; a resource that is
    /// missing or malformed will not fix itself within one install.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientConnection { .. })
    }

    /// Check if this error (or any aggregated error) is a deadline expiry
    pub fn is_deadline_exceeded(&self) -> bool {
        match self {
            Error::DeadlineExceeded { .. } => true,
            Error::Aggregate { errors } => errors.iter().any(Error::is_deadline_exceeded),
            _ => false,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            Error::TransientConnection { operation, .. } => Some(operation),
            Error::DeadlineExceeded { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {code}"),
            reason: "Test".to_string(),
            code,
        })
    }

    // ==========================================================================
    // Story Tests: Error Classification During an Install
    // ==========================================================================

    /// Story: an API server restart mid-install is retried, a forbidden read is not
    #[test]
    fn story_server_unavailability_is_transient() {
        let err = Error::from_kube("get secret ns/etcd-3", api_error(503));
        assert!(err.is_retryable());
        assert_eq!(err.context(), Some("get secret ns/etcd-3"));

        let err = Error::from_kube("get secret ns/etcd-3", api_error(429));
        assert!(err.is_retryable());

        let err = Error::from_kube("get secret ns/etcd-3", api_error(403));
        assert!(!err.is_retryable());
        assert!(matches!(err, Error::Kube { .. }));
    }

    /// Story: a missing required secret names everything needed to fix it
    #[test]
    fn story_missing_resource_names_prefix_and_revision() {
        let err = Error::MissingRequiredResource {
            kind: "secret".to_string(),
            namespace: "openshift-etcd".to_string(),
            prefix: "etcd-serving".to_string(),
            name: "etcd-serving-4".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("openshift-etcd/etcd-serving-4"));
        assert!(msg.contains("\"etcd-serving\""));
        assert!(!err.is_retryable());
    }

    /// Story: running out of time reports what was being waited on
    #[test]
    fn story_deadline_wraps_last_error() {
        let last = Error::transient("get configmap ns/pod-2", "connection refused");
        let err = Error::deadline_exceeded("get configmap ns/pod-2", Some(last));
        let msg = err.to_string();
        assert!(msg.starts_with("deadline exceeded during get configmap ns/pod-2"));
        assert!(msg.contains("connection refused"));
        assert!(err.is_deadline_exceeded());
        assert!(!err.is_retryable());
        assert!(std::error::Error::source(&err).is_some());

        let bare = Error::deadline_exceeded("op", None);
        assert_eq!(bare.to_string(), "deadline exceeded during op");
    }

    #[test]
    fn aggregate_keeps_single_error_variant() {
        assert!(Error::aggregate(vec![]).is_none());

        let single = Error::aggregate(vec![Error::validation("bad")]);
        assert!(matches!(single, Some(Error::Validation { .. })));

        let many = Error::aggregate(vec![
            Error::validation("first"),
            Error::deadline_exceeded("second", None),
        ])
        .expect("two errors aggregate");
        assert!(many.to_string().starts_with("2 errors: "));
        assert!(many.to_string().contains("first; deadline exceeded during second"));
        assert!(many.is_deadline_exceeded());
    }

    #[test]
    fn validation_field_is_recorded() {
        match Error::validation_for_field("--revision", "is required") {
            Error::Validation { field, message } => {
                assert_eq!(field.as_deref(), Some("--revision"));
                assert_eq!(message, "is required");
            }
            _ => panic!("Expected Validation variant"),
        }
    }

    #[test]
    fn io_error_includes_path() {
        let err = Error::io(
            "/etc/kubernetes/manifests",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/etc/kubernetes/manifests"));
        assert!(err.to_string().contains("denied"));
    }
}
