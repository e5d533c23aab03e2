pub mod controller;
pub mod error;
pub mod execution;
pub mod fingerprint;
pub mod k8s;
mod macros;
pub mod reconcile;
pub mod resolve;
pub mod status;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tls;
pub mod types;
