//! TLS material validation and server configuration.
//!
//! Compiled against rustls when the `tls` feature is on. Without it,
//! [`ServerTls`] is uninhabited and configuring TLS fails at start.

use thiserror::Error;

use crate::security::TlsMaterial;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("TLS support is not compiled in (enable the `tls` feature)")]
    Unsupported,

    #[error("no certificate found in PEM material")]
    MissingCertificate,

    #[error("no private key found in PEM material")]
    MissingPrivateKey,

    #[error("invalid PEM material: {0}")]
    Pem(#[source] std::io::Error),

    #[error("failed to build TLS configuration: {0}")]
    Config(#[source] std::io::Error),
}

/// Build-time capability, independent of the current configuration.
pub fn tls_supported() -> bool {
    cfg!(feature = "tls")
}

#[cfg(feature = "tls")]
pub type ServerTls = axum_server::tls_rustls::RustlsConfig;

#[cfg(not(feature = "tls"))]
#[derive(Debug, Clone)]
pub enum ServerTls {}

/// Check that the material holds at least one certificate and a private key.
#[cfg(feature = "tls")]
pub fn validate_pem(material: &TlsMaterial) -> Result<(), TlsError> {
    let certs = rustls_pemfile::certs(&mut material.cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::Pem)?;
    if certs.is_empty() {
        return Err(TlsError::MissingCertificate);
    }

    match rustls_pemfile::private_key(&mut material.key_pem.as_bytes()).map_err(TlsError::Pem)? {
        Some(_) => Ok(()),
        None => Err(TlsError::MissingPrivateKey),
    }
}

#[cfg(not(feature = "tls"))]
pub fn validate_pem(_material: &TlsMaterial) -> Result<(), TlsError> {
    Err(TlsError::Unsupported)
}

/// Turn validated PEM material into the acceptor configuration.
#[cfg(feature = "tls")]
pub async fn load_server_tls(material: &TlsMaterial) -> Result<ServerTls, TlsError> {
    validate_pem(material)?;
    ServerTls::from_pem(
        material.cert_pem.clone().into_bytes(),
        material.key_pem.clone().into_bytes(),
    )
    .await
    .map_err(TlsError::Config)
}

#[cfg(not(feature = "tls"))]
pub async fn load_server_tls(_material: &TlsMaterial) -> Result<ServerTls, TlsError> {
    Err(TlsError::Unsupported)
}

#[cfg(all(test, feature = "tls"))]
mod tests {
    use super::*;

    #[test]
    fn reports_capability() {
        assert!(tls_supported());
    }

    #[test]
    fn rejects_material_without_certificate() {
        let material = TlsMaterial::new("not a pem", "not a pem either");
        assert!(matches!(
            validate_pem(&material),
            Err(TlsError::MissingCertificate)
        ));
    }

    #[tokio::test]
    async fn loads_self_signed_material() {
        let material = TlsMaterial::new(
            include_str!("../../tests/fixtures/tls/cert.pem"),
            include_str!("../../tests/fixtures/tls/key.pem"),
        );
        assert!(validate_pem(&material).is_ok());
        assert!(load_server_tls(&material).await.is_ok());
    }

    #[test]
    fn rejects_material_without_key() {
        // Structurally valid PEM block; contents are not checked here.
        let cert = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";
        let material = TlsMaterial::new(cert, "");
        assert!(matches!(
            validate_pem(&material),
            Err(TlsError::MissingPrivateKey)
        ));
    }
}
