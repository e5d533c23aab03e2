use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use crate::k8s::{K8sClient, K8sError};
use crate::types::{PostgresQuery, PostgresQueryStatus};

/// [`K8sClient`] backed by the [`kube`] crate.
#[derive(Clone)]
pub struct HttpK8sClient {
    client: Client,
}

impl HttpK8sClient {
    /// Builds a client from the ambient configuration.
    pub async fn new() -> Result<HttpK8sClient, K8sError> {
        let client = Client::try_default().await?;

        Ok(HttpK8sClient { client })
    }

    pub fn from_client(client: Client) -> HttpK8sClient {
        HttpK8sClient { client }
    }

    /// Returns the underlying [`Client`].
    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

#[async_trait]
impl K8sClient for HttpK8sClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, K8sError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        Ok(secrets.get_opt(name).await?)
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, K8sError> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);

        Ok(config_maps.get_opt(name).await?)
    }

    async fn get_postgres_query(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PostgresQuery>, K8sError> {
        let queries: Api<PostgresQuery> = Api::namespaced(self.client.clone(), namespace);

        Ok(queries.get_opt(name).await?)
    }

    async fn replace_postgres_query_status(
        &self,
        query: &PostgresQuery,
        status: &PostgresQueryStatus,
    ) -> Result<(), K8sError> {
        let namespace = query
            .namespace()
            .ok_or(K8sError::MissingMetadata("namespace"))?;
        let name = query.name_any();
        let queries: Api<PostgresQuery> = Api::namespaced(self.client.clone(), &namespace);

        // The resource version turns the merge patch into a conditional write:
        // the API server answers 409 if the object moved on since it was read.
        let patch = json!({
            "metadata": { "resourceVersion": query.resource_version() },
            "status": serde_json::to_value(status)?,
        });
        queries
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;

        debug!(%namespace, %name, "replaced postgres query status");

        Ok(())
    }
}
