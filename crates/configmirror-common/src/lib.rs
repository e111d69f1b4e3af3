//! Common types for ConfigMirror: CRDs, errors, selectors and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod metrics;
pub mod selector;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name this controller reports under (telemetry service name, field owner)
pub const CONTROLLER_NAME: &str = "configmirror-controller";

/// Annotation written by `kubectl apply`; never carried onto a replica
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Fully-qualified annotation marking an object as a replica
pub const MIRROR_ANNOTATION: &str = "bennsimon.github.io/mirror";

/// Fully-qualified annotation recording the replica's source namespace
pub const SOURCE_NAMESPACE_ANNOTATION: &str = "bennsimon.github.io/sourceNamespace";

/// Fully-qualified annotation recording the owning ConfigMirror
pub const MANAGED_BY_ANNOTATION: &str = "bennsimon.github.io/managed-by";

/// Field manager identity used for every replica write
pub const FIELD_OWNER: &str = "bennsimon.github.io/configmirror-controller";

/// Per-call deadline for every external call (API server and database)
pub const CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
