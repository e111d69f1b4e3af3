//! Integration tests for the ConfigMirror operator
//!
//! # Test Organization
//!
//! - `replication`: Stories about ConfigMaps being mirrored into target
//!   namespaces, kept in sync, and recreated after deletion
//!
//! # Running These Tests
//!
//! ```bash
//! # Cluster reachable through KUBECONFIG, operator deployed
//! cargo test -p configmirror-operator --test kind -- --ignored --nocapture
//! ```

mod helpers;
mod replication;
