use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, QueryResult};
use crate::k8s::K8sClient;
use crate::resolve::{config_map_value, secret_value};
use crate::types::PostgresQuerySpec;

/// Where the SQL text of a query comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlSource {
    Secret,
    ConfigMap,
    Inline,
}

impl SqlSource {
    /// Picks the source of `spec`: a secret reference wins over a config map
    /// reference, which wins over the inline text.
    pub fn of(spec: &PostgresQuerySpec) -> SqlSource {
        if spec.sql_secret_ref.is_some() {
            SqlSource::Secret
        } else if spec.sql_config_map_ref.is_some() {
            SqlSource::ConfigMap
        } else {
            SqlSource::Inline
        }
    }
}

/// Resolves the literal SQL text of `spec` in `namespace`.
///
/// A missing object or key fails the pass, the text is never defaulted.
pub async fn resolve_sql<C>(client: &C, namespace: &str, spec: &PostgresQuerySpec) -> QueryResult<String>
where
    C: K8sClient + ?Sized,
{
    let source = SqlSource::of(spec);
    debug!(?source, "resolving sql");

    match (source, &spec.sql_secret_ref, &spec.sql_config_map_ref) {
        (SqlSource::Secret, Some(secret_ref), _) => {
            let secret = match client.get_secret(namespace, &secret_ref.name).await {
                Ok(Some(secret)) => secret,
                Ok(None) => bail!(
                    ErrorKind::ResolutionError,
                    "Failed to get sql secret",
                    format!("secret '{}' not found", secret_ref.name)
                ),
                Err(err) => bail!(ErrorKind::ResolutionError, "Failed to get sql secret", err),
            };

            let Some(value) = secret_value(&secret, &secret_ref.key) else {
                bail!(
                    ErrorKind::ResolutionError,
                    "Sql key not found in secret",
                    format!("secret '{}' has no key '{}'", secret_ref.name, secret_ref.key)
                );
            };

            sql_text(value.to_vec())
        }
        (SqlSource::ConfigMap, _, Some(config_map_ref)) => {
            let config_map = match client.get_config_map(namespace, &config_map_ref.name).await {
                Ok(Some(config_map)) => config_map,
                Ok(None) => bail!(
                    ErrorKind::ResolutionError,
                    "Failed to get sql configmap",
                    format!("config map '{}' not found", config_map_ref.name)
                ),
                Err(err) => bail!(ErrorKind::ResolutionError, "Failed to get sql configmap", err),
            };

            let Some(value) = config_map_value(&config_map, &config_map_ref.key) else {
                bail!(
                    ErrorKind::ResolutionError,
                    "Sql key not found in configmap",
                    format!(
                        "config map '{}' has no key '{}'",
                        config_map_ref.name, config_map_ref.key
                    )
                );
            };

            sql_text(value)
        }
        _ => Ok(spec.sql.clone()),
    }
}

fn sql_text(value: Vec<u8>) -> QueryResult<String> {
    match String::from_utf8(value) {
        Ok(sql) => Ok(sql),
        Err(_) => bail!(ErrorKind::ResolutionError, "Sql is not valid UTF-8"),
    }
}
