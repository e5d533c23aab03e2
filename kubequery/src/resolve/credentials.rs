use secrecy::SecretString;
use std::fmt;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, QueryResult};
use crate::k8s::K8sClient;
use crate::resolve::secret_value;
use crate::types::{PostgresConnection, SecretKeyRef};

/// PEM-encoded CA certificates used to validate the server, held in memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct TrustAnchor(Vec<u8>);

impl TrustAnchor {
    pub fn new(pem: Vec<u8>) -> TrustAnchor {
        TrustAnchor(pem)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrustAnchor({} bytes)", self.0.len())
    }
}

/// TLS settings of a connection whose mode is not `disable`.
///
/// The mode is carried verbatim, it is only interpreted by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTls {
    pub mode: String,
    pub trust_anchor: Option<TrustAnchor>,
}

/// Secret material needed to open a session.
#[derive(Debug)]
pub struct ResolvedCredentials {
    pub password: SecretString,
    /// `None` when TLS is disabled, in which case no CA material is ever read.
    pub tls: Option<ResolvedTls>,
}

/// Resolves the password and, unless TLS is disabled, the CA certificate of
/// `connection` in `namespace`.
pub async fn resolve_credentials<C>(
    client: &C,
    namespace: &str,
    connection: &PostgresConnection,
) -> QueryResult<ResolvedCredentials>
where
    C: K8sClient + ?Sized,
{
    let password = read_secret_key(
        client,
        namespace,
        &connection.password_secret_ref,
        "Failed to get password secret",
        "Password key not found in secret",
    )
    .await?;
    let Ok(password) = String::from_utf8(password) else {
        bail!(ErrorKind::CredentialError, "Password is not valid UTF-8");
    };

    let tls = match &connection.ssl {
        Some(ssl) if !ssl.is_disabled() => {
            let trust_anchor = match &ssl.ca_secret_ref {
                Some(ca_secret_ref) => {
                    let pem = read_secret_key(
                        client,
                        namespace,
                        ca_secret_ref,
                        "Failed to get CA secret",
                        "CA key not found in secret",
                    )
                    .await?;

                    Some(TrustAnchor::new(pem))
                }
                None => None,
            };

            debug!(
                mode = %ssl.mode,
                custom_ca = trust_anchor.is_some(),
                "resolved tls settings"
            );

            Some(ResolvedTls {
                mode: ssl.mode.clone(),
                trust_anchor,
            })
        }
        _ => None,
    };

    Ok(ResolvedCredentials {
        password: password.into(),
        tls,
    })
}

async fn read_secret_key<C>(
    client: &C,
    namespace: &str,
    secret_ref: &SecretKeyRef,
    not_found: &'static str,
    key_not_found: &'static str,
) -> QueryResult<Vec<u8>>
where
    C: K8sClient + ?Sized,
{
    let secret = match client.get_secret(namespace, &secret_ref.name).await {
        Ok(Some(secret)) => secret,
        Ok(None) => bail!(
            ErrorKind::CredentialError,
            not_found,
            format!("secret '{}' not found", secret_ref.name)
        ),
        Err(err) => bail!(ErrorKind::CredentialError, not_found, err),
    };

    match secret_value(&secret, &secret_ref.key) {
        Some(value) => Ok(value.to_vec()),
        None => bail!(
            ErrorKind::CredentialError,
            key_not_found,
            format!("secret '{}' has no key '{}'", secret_ref.name, secret_ref.key)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::query::{secret_ref, test_connection};
    use crate::test_utils::k8s::MemoryK8sClient;
    use crate::types::PostgresSsl;
    use secrecy::ExposeSecret;

    const NAMESPACE: &str = "apps";

    async fn client_with_password() -> MemoryK8sClient {
        let client = MemoryK8sClient::new();
        client
            .insert_secret(NAMESPACE, "db-creds", &[("password", "s3cret")])
            .await;
        client
    }

    #[tokio::test]
    async fn resolves_password_without_tls() {
        let client = client_with_password().await;

        let credentials = resolve_credentials(&client, NAMESPACE, &test_connection())
            .await
            .unwrap();

        assert_eq!(credentials.password.expose_secret(), "s3cret");
        assert!(credentials.tls.is_none());
    }

    #[tokio::test]
    async fn missing_password_secret_is_a_credential_error() {
        let client = MemoryK8sClient::new();

        let err = resolve_credentials(&client, NAMESPACE, &test_connection())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CredentialError);
        assert_eq!(err.description(), "Failed to get password secret");
    }

    #[tokio::test]
    async fn missing_password_key_is_a_credential_error() {
        let client = MemoryK8sClient::new();
        client
            .insert_secret(NAMESPACE, "db-creds", &[("username", "admin")])
            .await;

        let err = resolve_credentials(&client, NAMESPACE, &test_connection())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CredentialError);
        assert_eq!(err.description(), "Password key not found in secret");
    }

    #[tokio::test]
    async fn disabled_tls_never_reads_the_ca_secret() {
        let client = client_with_password().await;
        let mut connection = test_connection();
        connection.ssl = Some(PostgresSsl {
            mode: "disable".to_string(),
            ca_secret_ref: Some(secret_ref("missing-ca", "ca.crt")),
        });

        let credentials = resolve_credentials(&client, NAMESPACE, &connection)
            .await
            .unwrap();

        assert!(credentials.tls.is_none());
        assert_eq!(client.secret_reads("missing-ca").await, 0);
    }

    #[tokio::test]
    async fn ca_certificate_is_kept_in_memory() {
        let client = client_with_password().await;
        client
            .insert_secret(NAMESPACE, "db-ca", &[("ca.crt", "-----BEGIN CERTIFICATE-----")])
            .await;
        let mut connection = test_connection();
        connection.ssl = Some(PostgresSsl {
            mode: "verify-full".to_string(),
            ca_secret_ref: Some(secret_ref("db-ca", "ca.crt")),
        });

        let credentials = resolve_credentials(&client, NAMESPACE, &connection)
            .await
            .unwrap();

        let tls = credentials.tls.unwrap();
        assert_eq!(tls.mode, "verify-full");
        assert_eq!(
            tls.trust_anchor.unwrap().as_bytes(),
            b"-----BEGIN CERTIFICATE-----"
        );
    }

    #[tokio::test]
    async fn tls_mode_is_passed_through_unvalidated() {
        let client = client_with_password().await;
        let mut connection = test_connection();
        connection.ssl = Some(PostgresSsl {
            mode: "prefer".to_string(),
            ca_secret_ref: None,
        });

        let credentials = resolve_credentials(&client, NAMESPACE, &connection)
            .await
            .unwrap();

        assert_eq!(
            credentials.tls,
            Some(ResolvedTls {
                mode: "prefer".to_string(),
                trust_anchor: None
            })
        );
    }

    #[tokio::test]
    async fn missing_ca_key_is_a_credential_error() {
        let client = client_with_password().await;
        client
            .insert_secret(NAMESPACE, "db-ca", &[("tls.crt", "cert")])
            .await;
        let mut connection = test_connection();
        connection.ssl = Some(PostgresSsl {
            mode: "verify-ca".to_string(),
            ca_secret_ref: Some(secret_ref("db-ca", "ca.crt")),
        });

        let err = resolve_credentials(&client, NAMESPACE, &connection)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CredentialError);
        assert_eq!(err.description(), "CA key not found in secret");
    }
}
