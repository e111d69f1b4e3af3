//! Error types for the ConfigMirror operator
//!
//! Errors carry the identities needed to diagnose a failed replication from
//! the log line alone: the definition, the source object and the destination.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for ConfigMirror operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// An external call exceeded its deadline
    #[error("timed out after {seconds}s during {operation}")]
    Timeout {
        /// Operation that was cancelled (e.g., "list configmaps")
        operation: String,
        /// Deadline that elapsed
        seconds: u64,
    },

    /// The ConfigMirror that triggered the reconcile no longer exists
    #[error("configmirror {definition} not found")]
    DefinitionNotFound {
        /// `<namespace>/<name>` of the missing definition
        definition: String,
    },

    /// Validation error for a ConfigMirror spec
    #[error("validation error for {definition}: {message}")]
    Validation {
        /// Definition with invalid configuration
        definition: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.targetNamespaces")
        field: Option<String>,
    },

    /// Listing matching source objects failed
    #[error("failed to fetch configmaps in {namespace} matching {selector}: {cause}")]
    Fetch {
        /// Source namespace that was listed
        namespace: String,
        /// Rendered label selector
        selector: String,
        /// Underlying cause
        #[source]
        cause: Box<Error>,
    },

    /// Writing a replica failed
    #[error("failed to replicate {source_ref} to {destination}: {cause}")]
    Apply {
        /// `<namespace>/<name>` of the source ConfigMap
        source_ref: String,
        /// `<namespace>/<name>` of the replica
        destination: String,
        /// Underlying cause
        #[source]
        cause: Box<Error>,
    },

    /// Recording a replica in the audit store failed
    #[error("failed to record {destination} in database: {message}")]
    Persistence {
        /// `<namespace>/<name>` of the replica that was already applied
        destination: String,
        /// Underlying cause
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Startup configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Description of what is missing or malformed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "router", "runner")
        context: String,
    },
}

impl Error {
    /// Create a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>, deadline: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds: deadline.as_secs(),
        }
    }

    /// Create a definition-not-found error
    pub fn definition_not_found(definition: impl Into<String>) -> Self {
        Self::DefinitionNotFound {
            definition: definition.into(),
        }
    }

    /// Create a validation error without definition context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            definition: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with definition context and field path
    pub fn validation_for_field(
        definition: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            definition: definition.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a fetch error with namespace and selector context
    pub fn fetch(namespace: impl Into<String>, selector: impl Into<String>, cause: Error) -> Self {
        Self::Fetch {
            namespace: namespace.into(),
            selector: selector.into(),
            cause: Box::new(cause),
        }
    }

    /// Create an apply error with source and destination identity
    pub fn apply(
        source_ref: impl Into<String>,
        destination: impl Into<String>,
        cause: Error,
    ) -> Self {
        Self::Apply {
            source_ref: source_ref.into(),
            destination: destination.into(),
            cause: Box::new(cause),
        }
    }

    /// Create a persistence error for an already-applied replica
    pub fn persistence(destination: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Persistence {
            destination: destination.into(),
            message: msg.to_string(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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

    /// Check if this error is retryable
    ///
    /// A vanished definition or an invalid spec needs a change to the
    /// ConfigMirror before another attempt can succeed. Fetch and apply
    /// failures are as retryable as their cause.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409 && ae.code != 429
            ),
            Error::DefinitionNotFound { .. } => false,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Config { .. } => false,
            Error::Fetch { cause, .. } | Error::Apply { cause, .. } => cause.is_retryable(),
            Error::Timeout { .. } | Error::Persistence { .. } | Error::Internal { .. } => true,
        }
    }

    /// Get the definition identity if this error is tied to one
    pub fn definition(&self) -> Option<&str> {
        match self {
            Error::DefinitionNotFound { definition } => Some(definition),
            Error::Validation { definition, .. } => Some(definition),
            _ => None,
        }
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "kube",
            Error::Timeout { .. } => "timeout",
            Error::DefinitionNotFound { .. } => "definition_not_found",
            Error::Validation { .. } => "validation",
            Error::Fetch { .. } => "fetch",
            Error::Apply { .. } => "apply",
            Error::Persistence { .. } => "persistence",
            Error::Serialization { .. } => "serialization",
            Error::Config { .. } => "config",
            Error::Internal { .. } => "internal",
        }
    }
}
