//! Startup utilities for the ConfigMirror operator

mod crds;
mod persistence;

pub use crds::{config_mirror_crd_name, ensure_crds_installed};
pub use persistence::init_persistence;
