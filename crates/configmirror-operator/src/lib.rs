//! ConfigMirror operator
//!
//! Replicates labelled ConfigMaps from a source namespace into target
//! namespaces as declared by `ConfigMirror` resources.

#![deny(missing_docs)]

/// Controller wiring (watches, reverse routing, run loop)
pub mod controller_runner;
/// Startup utilities (CRD install, audit store initialization)
pub mod startup;
