//! Kubernetes integration for the reconciliation core.
//!
//! The core reads secrets, config maps and `PostgresQuery` objects and writes the
//! query status. Consumers should depend on the trait [`K8sClient`]; the default
//! client, [`http::HttpK8sClient`], is backed by the [`kube`] crate and talks to
//! the cluster using the ambient configuration (in-cluster or local
//! `~/.kube/config`).

mod base;
pub mod http;

pub use base::*;
