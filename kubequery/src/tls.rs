//! TLS configuration for Postgres sessions.
//!
//! Trust material never touches the disk: the CA certificates resolved from the
//! secret are parsed from memory straight into the rustls root store.

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{WebPkiServerVerifier, verify_server_cert_signed_by_trust_anchor};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::fmt;
use std::io::BufReader;
use std::str::FromStr;
use std::sync::{Arc, Once};

use crate::bail;
use crate::error::{ErrorKind, QueryError, QueryResult};
use crate::resolve::credentials::TrustAnchor;

/// How the server certificate is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Plaintext session.
    Disable,
    /// Encrypted session, the certificate is not checked.
    Require,
    /// Encrypted session, the certificate chain must lead to a trusted root.
    VerifyCa,
    /// Like [`TlsMode::VerifyCa`], and the certificate must match the host name.
    VerifyFull,
}

impl FromStr for TlsMode {
    type Err = QueryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "disable" => Ok(TlsMode::Disable),
            "require" => Ok(TlsMode::Require),
            "verify-ca" => Ok(TlsMode::VerifyCa),
            "verify-full" => Ok(TlsMode::VerifyFull),
            other => bail!(
                ErrorKind::ConnectionError,
                "Unsupported ssl mode",
                format!("'{other}' is not one of disable, require, verify-ca, verify-full")
            ),
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            TlsMode::Disable => "disable",
            TlsMode::Require => "require",
            TlsMode::VerifyCa => "verify-ca",
            TlsMode::VerifyFull => "verify-full",
        };

        f.write_str(mode)
    }
}

static INIT_CRYPTO: Once = Once::new();

/// Installs aws-lc-rs as the process-wide rustls crypto provider.
///
/// Needed by clients that build their TLS configuration from the default
/// provider, like the Kubernetes client.
pub fn install_crypto_provider_once() {
    INIT_CRYPTO.call_once(|| {
        rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .expect("failed to install default crypto provider");
    });
}

/// Builds the rustls client configuration for `mode`.
///
/// Returns `None` for [`TlsMode::Disable`]. The verifying modes trust
/// `trust_anchor` when given and the bundled web PKI roots otherwise.
pub fn build_client_config(
    mode: TlsMode,
    trust_anchor: Option<&TrustAnchor>,
) -> QueryResult<Option<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let Some(verifier) = server_cert_verifier(mode, trust_anchor, provider.clone())? else {
        return Ok(None);
    };

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    Ok(Some(config))
}

/// Returns the server certificate verifier implementing `mode`.
fn server_cert_verifier(
    mode: TlsMode,
    trust_anchor: Option<&TrustAnchor>,
    provider: Arc<CryptoProvider>,
) -> QueryResult<Option<Arc<dyn ServerCertVerifier>>> {
    let verifier: Arc<dyn ServerCertVerifier> = match mode {
        TlsMode::Disable => return Ok(None),
        TlsMode::Require => Arc::new(AcceptAnyServerCert { provider }),
        TlsMode::VerifyCa => {
            let roots = Arc::new(root_store(trust_anchor)?);
            Arc::new(ChainOnlyVerifier { roots, provider })
        }
        TlsMode::VerifyFull => {
            let roots = Arc::new(root_store(trust_anchor)?);
            let verifier = match WebPkiServerVerifier::builder_with_provider(roots, provider).build() {
                Ok(verifier) => verifier,
                Err(err) => bail!(
                    ErrorKind::TrustMaterialError,
                    "Failed to build certificate verifier",
                    err
                ),
            };
            verifier
        }
    };

    Ok(Some(verifier))
}

/// Loads the root certificates of `trust_anchor`, or the web PKI roots when none
/// was configured.
fn root_store(trust_anchor: Option<&TrustAnchor>) -> QueryResult<RootCertStore> {
    let mut root_store = RootCertStore::empty();

    let Some(trust_anchor) = trust_anchor else {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        return Ok(root_store);
    };

    let mut root_certs_reader = BufReader::new(trust_anchor.as_bytes());
    for cert in rustls_pemfile::certs(&mut root_certs_reader) {
        let cert = match cert {
            Ok(cert) => cert,
            Err(err) => bail!(
                ErrorKind::TrustMaterialError,
                "CA certificate is not valid PEM",
                err
            ),
        };
        root_store.add(cert)?;
    }

    if root_store.is_empty() {
        bail!(
            ErrorKind::TrustMaterialError,
            "CA secret contains no certificates"
        );
    }

    Ok(root_store)
}

/// Verifier for `require`: the session is encrypted but any certificate is
/// accepted. Handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Verifier for `verify-ca`: the chain must lead to a trusted root, the host
/// name is not checked.
#[derive(Debug)]
struct ChainOnlyVerifier {
    roots: Arc<RootCertStore>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for ChainOnlyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let cert = ParsedCertificate::try_from(end_entity)?;
        verify_server_cert_signed_by_trust_anchor(
            &cert,
            &self.roots,
            intermediates,
            now,
            self.provider.signature_verification_algorithms.all,
        )?;

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
