//! Custom Resource Definitions for ConfigMirror
//!
//! This module contains the CRD definitions consumed by the operator.

mod config_mirror;

pub use config_mirror::{
    ConfigMirror, ConfigMirrorPhase, ConfigMirrorSelector, ConfigMirrorSpec, ConfigMirrorStatus,
};
