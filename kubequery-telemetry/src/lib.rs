//! Tracing setup for the kubequery operator.
//!
//! Development builds log pretty output to the terminal, production builds log
//! JSON to daily-rolling files with the operator instance injected into every
//! entry.

pub mod tracing;
