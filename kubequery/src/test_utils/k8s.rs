use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::ResourceExt;
use kube::api::ObjectMeta;
use kube::error::ErrorResponse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::k8s::{K8sClient, K8sError};
use crate::types::{PostgresQuery, PostgresQueryStatus};

type ObjectKey = (String, String);

fn object_key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

fn api_error(code: u16, reason: &str, message: &str) -> K8sError {
    K8sError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

#[derive(Debug, Default)]
struct Inner {
    secrets: HashMap<ObjectKey, Secret>,
    config_maps: HashMap<ObjectKey, ConfigMap>,
    queries: HashMap<ObjectKey, PostgresQuery>,
    secret_reads: HashMap<String, usize>,
    status_writes: Vec<PostgresQueryStatus>,
    failing_status_writes: usize,
    failing_query_reads: usize,
}

/// In-memory [`K8sClient`].
///
/// Status writes behave like the API server's conditional update: they are
/// rejected with a conflict when the stored query has a different resource
/// version than the one being written.
#[derive(Debug, Clone, Default)]
pub struct MemoryK8sClient {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryK8sClient {
    pub fn new() -> MemoryK8sClient {
        MemoryK8sClient::default()
    }

    pub async fn insert_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(
                data.iter()
                    .map(|(key, value)| (key.to_string(), ByteString(value.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Secret::default()
        };

        let mut inner = self.inner.lock().await;
        inner.secrets.insert(object_key(namespace, name), secret);
    }

    pub async fn insert_config_map(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(
                data.iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..ConfigMap::default()
        };

        let mut inner = self.inner.lock().await;
        inner
            .config_maps
            .insert(object_key(namespace, name), config_map);
    }

    /// Stores `query`, assigning resource version `1` when it has none.
    pub async fn insert_query(&self, mut query: PostgresQuery) {
        if query.metadata.resource_version.is_none() {
            query.metadata.resource_version = Some("1".to_string());
        }
        let key = object_key(&query.namespace().unwrap_or_default(), &query.name_any());

        let mut inner = self.inner.lock().await;
        inner.queries.insert(key, query);
    }

    /// Returns the stored version of a query.
    pub async fn query(&self, namespace: &str, name: &str) -> Option<PostgresQuery> {
        let inner = self.inner.lock().await;
        inner.queries.get(&object_key(namespace, name)).cloned()
    }

    /// Returns how many times the secret `name` was read, in any namespace.
    pub async fn secret_reads(&self, name: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.secret_reads.get(name).copied().unwrap_or(0)
    }

    /// Returns every accepted status write, oldest first.
    pub async fn status_writes(&self) -> Vec<PostgresQueryStatus> {
        let inner = self.inner.lock().await;
        inner.status_writes.clone()
    }

    /// Makes the next `count` status writes fail.
    pub async fn fail_status_writes(&self, count: usize) {
        let mut inner = self.inner.lock().await;
        inner.failing_status_writes = count;
    }

    /// Makes the next `count` query reads fail.
    pub async fn fail_query_reads(&self, count: usize) {
        let mut inner = self.inner.lock().await;
        inner.failing_query_reads = count;
    }
}

#[async_trait]
impl K8sClient for MemoryK8sClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, K8sError> {
        let mut inner = self.inner.lock().await;
        *inner.secret_reads.entry(name.to_string()).or_insert(0) += 1;

        Ok(inner.secrets.get(&object_key(namespace, name)).cloned())
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, K8sError> {
        let inner = self.inner.lock().await;

        Ok(inner.config_maps.get(&object_key(namespace, name)).cloned())
    }

    async fn get_postgres_query(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PostgresQuery>, K8sError> {
        let mut inner = self.inner.lock().await;
        if inner.failing_query_reads > 0 {
            inner.failing_query_reads -= 1;
            return Err(api_error(503, "ServiceUnavailable", "injected read failure"));
        }

        Ok(inner.queries.get(&object_key(namespace, name)).cloned())
    }

    async fn replace_postgres_query_status(
        &self,
        query: &PostgresQuery,
        status: &PostgresQueryStatus,
    ) -> Result<(), K8sError> {
        let mut inner = self.inner.lock().await;
        if inner.failing_status_writes > 0 {
            inner.failing_status_writes -= 1;
            return Err(api_error(503, "ServiceUnavailable", "injected write failure"));
        }

        let key = object_key(
            &query
                .namespace()
                .ok_or(K8sError::MissingMetadata("namespace"))?,
            &query.name_any(),
        );
        if let Some(stored) = inner.queries.get_mut(&key) {
            if stored.metadata.resource_version != query.metadata.resource_version {
                return Err(api_error(409, "Conflict", "the object has been modified"));
            }

            let version = stored
                .metadata
                .resource_version
                .as_deref()
                .and_then(|version| version.parse::<u64>().ok())
                .unwrap_or(0);
            stored.metadata.resource_version = Some((version + 1).to_string());
            stored.status = Some(status.clone());
        }

        inner.status_writes.push(status.clone());

        Ok(())
    }
}
