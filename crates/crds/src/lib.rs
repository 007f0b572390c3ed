//! OLM CRD Definitions
//!
//! Kubernetes Custom Resource Definitions read and written by the OLM
//! operator.

pub mod cluster_service_version;
pub mod references;
pub mod subscription;

pub use cluster_service_version::*;
pub use references::*;
pub use subscription::*;
