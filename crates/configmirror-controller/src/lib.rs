//! ConfigMirror controller
//!
//! Selector matching, replica writes, reverse routing of ConfigMap events
//! and the reconcile loop for `ConfigMirror` resources.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod engine;
pub mod matcher;
pub mod replica;
pub mod router;

#[cfg(test)]
mod test_support;

pub use client::{KubeMirrorClient, MirrorClient};
pub use controller::{error_policy, reconcile, Context, ContextBuilder};
pub use engine::{apply_replica, replicate, AppliedReplica, ApplyOutcome};
pub use matcher::fetch_matching;
pub use replica::{build_replica, merge_owned, OwnedFields};
pub use router::{classify, resolve, route, select_definitions, WatchedObject};
