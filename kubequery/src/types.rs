//! The `PostgresQuery` custom resource.
//!
//! A `PostgresQuery` declares one SQL statement to run once against one database.
//! The `spec` is written by the user, the status is written only by the status
//! projector.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// TLS mode that turns encryption off.
pub const SSL_MODE_DISABLE: &str = "disable";

/// Declared state of a [`PostgresQuery`].
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "kubequery.cloudnexus.io",
    version = "v1alpha1",
    kind = "PostgresQuery",
    plural = "postgresqueries",
    namespaced,
    status = "PostgresQueryStatus",
    shortname = "pgq"
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresQuerySpec {
    /// Connection to the target database.
    pub connection: PostgresConnection,
    /// Inline SQL, used only when neither `sqlSecretRef` nor `sqlConfigMapRef` is set.
    #[serde(default)]
    pub sql: String,
    /// Config map key holding the SQL. Ignored when `sqlSecretRef` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_config_map_ref: Option<ConfigMapKeyRef>,
    /// Secret key holding the SQL. Takes precedence over every other source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_secret_ref: Option<SecretKeyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<QueryOptions>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresConnection {
    pub host: String,
    pub port: i32,
    pub database: String,
    pub user: String,
    pub password_secret_ref: SecretKeyRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<PostgresSsl>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresSsl {
    /// One of `disable`, `require`, `verify-ca` or `verify-full`.
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_secret_ref: Option<SecretKeyRef>,
}

impl PostgresSsl {
    pub fn is_disabled(&self) -> bool {
        self.mode == SSL_MODE_DISABLE
    }
}

/// Selects a key of a secret in the query's namespace.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// Selects a key of a config map in the query's namespace.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct ConfigMapKeyRef {
    pub name: String,
    pub key: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    /// Deadline in seconds covering connection and execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
}

/// Observed state of a [`PostgresQuery`].
///
/// Every field is always serialized so that a status write replaces all four.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresQueryStatus {
    /// Whether the statement for `idempotency_hash` ran successfully.
    #[serde(default)]
    pub executed: bool,
    /// Diagnostic of the last failed pass, empty on success.
    #[serde(default)]
    pub error: String,
    /// Short summary of the executed statement.
    #[serde(default)]
    pub result: String,
    /// Fingerprint of the last evaluated connection and SQL.
    #[serde(default)]
    pub idempotency_hash: String,
}
