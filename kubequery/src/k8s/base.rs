use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use thiserror::Error;

use crate::types::{PostgresQuery, PostgresQueryStatus};

/// Errors emitted by the Kubernetes integration.
#[derive(Debug, Error)]
pub enum K8sError {
    /// A serialization error while building a request body.
    #[error("An error occurred in serde when dealing with K8s: {0}")]
    Serde(#[from] serde_json::error::Error),
    /// An error returned by the [`kube`] client when talking to the API server.
    #[error("An error occurred with kube when dealing with K8s: {0}")]
    Kube(#[from] kube::Error),
    /// The object to update carries no name or namespace.
    #[error("The object is missing its {0}")]
    MissingMetadata(&'static str),
}

/// Client interface describing the Kubernetes operations used by the core.
///
/// Lookups return `Ok(None)` when the object does not exist, every other
/// failure is an error.
#[async_trait]
pub trait K8sClient: Send + Sync {
    /// Retrieves a [`Secret`] by name.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, K8sError>;

    /// Retrieves a [`ConfigMap`] by name.
    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, K8sError>;

    /// Retrieves the current version of a [`PostgresQuery`].
    async fn get_postgres_query(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PostgresQuery>, K8sError>;

    /// Replaces the status of `query` with `status`.
    ///
    /// The write is conditional on the resource version of `query`, so it fails
    /// if the object changed since it was read.
    async fn replace_postgres_query_status(
        &self,
        query: &PostgresQuery,
        status: &PostgresQueryStatus,
    ) -> Result<(), K8sError>;
}
