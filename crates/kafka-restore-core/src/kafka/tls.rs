//! TLS configuration helpers for Kafka client connections.
//!
//! The CA bundle comes from `ssl_ca_location` (or webpki-roots). The client
//! certificate and key arrive as PEM bytes from a [`CredentialResolver`] and
//! are only parsed here.
//!
//! [`CredentialResolver`]: crate::credentials::CredentialResolver

use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::debug;

use crate::config::SecurityConfig;
use crate::credentials::{self, ClientIdentity};
use crate::error::KafkaError;
use crate::Result;

/// Resolve client identity (if configured) and build the TLS config.
///
/// Returns `None` when the security protocol does not use TLS.
pub async fn client_tls_config(security: &SecurityConfig) -> Result<Option<Arc<ClientConfig>>> {
    if !security.uses_tls() {
        return Ok(None);
    }

    let identity = match &security.client_identity {
        Some(identity_config) => {
            let (resolver, scope) = credentials::from_config(identity_config);
            Some(resolver.resolve(&scope).await?)
        }
        None => None,
    };

    let ca = match &security.ssl_ca_location {
        Some(path) => Some(read_ca_file(path).await?),
        None => None,
    };

    let config = build_tls_config(
        ca.as_deref().map(|bytes| ("ssl_ca_location", bytes)),
        identity.as_ref(),
    )?;
    Ok(Some(Arc::new(config)))
}

async fn read_ca_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        KafkaError::CertificateLoad {
            source_name: path.display().to_string(),
            message: format!("Failed to open file: {}", e),
        }
        .into()
    })
}

/// Build a TLS ClientConfig.
///
/// `ca` is a named PEM bundle; without one, webpki-roots are trusted.
/// With an identity, the client authenticates (mTLS).
pub fn build_tls_config(
    ca: Option<(&str, &[u8])>,
    identity: Option<&ClientIdentity>,
) -> Result<ClientConfig> {
    let root_store = build_root_store(ca)?;

    let config = match identity {
        Some(identity) => {
            debug!("Configuring mTLS with resolved client identity");

            let certs = parse_certificates("client certificate", &identity.certificate)?;
            let key = parse_private_key("client key", &identity.private_key)?;

            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_client_auth_cert(certs, key)
                .map_err(|e| {
                    KafkaError::TlsConfig(format!("Failed to configure client authentication: {}", e))
                })?
        }
        None => {
            debug!("Configuring TLS without client authentication");
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        }
    };

    Ok(config)
}

/// Build a RootCertStore from a PEM bundle or webpki-roots.
fn build_root_store(ca: Option<(&str, &[u8])>) -> Result<RootCertStore> {
    match ca {
        Some((source_name, pem)) => {
            let certs = parse_certificates(source_name, pem)?;
            let mut root_store = RootCertStore::empty();

            for cert in certs {
                root_store.add(cert).map_err(|e| KafkaError::CertificateLoad {
                    source_name: source_name.to_string(),
                    message: format!("Failed to add certificate to root store: {}", e),
                })?;
            }

            debug!("Loaded {} CA certificate(s) from {}", root_store.len(), source_name);
            Ok(root_store)
        }
        None => {
            debug!("Using webpki-roots for TLS verification (no custom CA specified)");
            Ok(RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            })
        }
    }
}

/// Parse every certificate in a PEM buffer.
fn parse_certificates(source_name: &str, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = pem;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| KafkaError::CertificateLoad {
            source_name: source_name.to_string(),
            message: format!("Failed to parse PEM certificates: {}", e),
        })?;

    if certs.is_empty() {
        return Err(KafkaError::CertificateLoad {
            source_name: source_name.to_string(),
            message: "No certificates found".to_string(),
        }
        .into());
    }

    Ok(certs)
}

/// Parse the first private key in a PEM buffer.
///
/// Supports PKCS#1 (RSA), PKCS#8, and SEC1 (EC) key formats.
fn parse_private_key(source_name: &str, pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = pem;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| KafkaError::PrivateKeyLoad {
            source_name: source_name.to_string(),
            message: format!("Failed to parse PEM private key: {}", e),
        })?
        .ok_or_else(|| {
            KafkaError::PrivateKeyLoad {
                source_name: source_name.to_string(),
                message: "No private key found".to_string(),
            }
            .into()
        })
}
