use kube::api::ObjectMeta;

use crate::types::{
    ConfigMapKeyRef, PostgresConnection, PostgresQuery, PostgresQuerySpec, SecretKeyRef,
};

pub fn secret_ref(name: &str, key: &str) -> SecretKeyRef {
    SecretKeyRef {
        name: name.to_string(),
        key: key.to_string(),
    }
}

pub fn config_map_ref(name: &str, key: &str) -> ConfigMapKeyRef {
    ConfigMapKeyRef {
        name: name.to_string(),
        key: key.to_string(),
    }
}

/// Plaintext connection whose password lives in `db-creds/password`.
pub fn test_connection() -> PostgresConnection {
    PostgresConnection {
        host: "db.apps.svc".to_string(),
        port: 5432,
        database: "app".to_string(),
        user: "admin".to_string(),
        password_secret_ref: secret_ref("db-creds", "password"),
        ssl: None,
    }
}

pub fn test_query_spec(sql: &str) -> PostgresQuerySpec {
    PostgresQuerySpec {
        connection: test_connection(),
        sql: sql.to_string(),
        sql_config_map_ref: None,
        sql_secret_ref: None,
        options: None,
    }
}

pub fn test_query(namespace: &str, name: &str, spec: PostgresQuerySpec) -> PostgresQuery {
    let mut query = PostgresQuery::new(name, spec);
    query.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..ObjectMeta::default()
    };

    query
}
