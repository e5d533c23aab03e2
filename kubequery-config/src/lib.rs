//! Configuration management for the kubequery operator.
//!
//! Provides environment detection, configuration loading from YAML files and
//! the shared configuration types consumed by the reconciliation core and the
//! operator binary.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
