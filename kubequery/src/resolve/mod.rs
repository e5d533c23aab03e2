//! Resolution of indirect references into literal values.
//!
//! [`sql`] turns the query's SQL source into statement text, [`credentials`]
//! reads the password and optional CA certificate of the connection.

pub mod credentials;
pub mod sql;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};

/// Returns the raw bytes stored under `key` in `secret`.
pub(crate) fn secret_value<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|value| value.0.as_slice())
}

/// Returns the text stored under `key` in `config_map`, looking at `data` first
/// and `binaryData` second.
pub(crate) fn config_map_value(config_map: &ConfigMap, key: &str) -> Option<Vec<u8>> {
    if let Some(value) = config_map.data.as_ref().and_then(|data| data.get(key)) {
        return Some(value.as_bytes().to_vec());
    }

    config_map
        .binary_data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|value| value.0.clone())
}
