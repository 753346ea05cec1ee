//! TLS support for the HTTPS listener.
//!
//! Loads a PEM certificate chain and private key and produces a
//! `TlsAcceptor` for the manual accept loop in [`crate::server::serve_tls`].

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// Errors that can occur when loading TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read TLS certificate file: {0}")]
    CertRead(std::io::Error),
    #[error("failed to read TLS key file: {0}")]
    KeyRead(std::io::Error),
    #[error("no certificates found in PEM file")]
    NoCerts,
    #[error("no private key found in PEM file")]
    NoKey,
    #[error("failed to build TLS config: {0}")]
    Config(#[from] tokio_rustls::rustls::Error),
}

/// Build a `TlsAcceptor` from PEM-encoded certificate and key files.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let cert_data = std::fs::read(cert_path).map_err(TlsError::CertRead)?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut &cert_data[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::CertRead)?;
    if certs.is_empty() {
        return Err(TlsError::NoCerts);
    }

    // Accepts PKCS8, RSA, and EC key formats.
    let key_data = std::fs::read(key_path).map_err(TlsError::KeyRead)?;
    let key = rustls_pemfile::private_key(&mut &key_data[..])
        .map_err(TlsError::KeyRead)?
        .ok_or(TlsError::NoKey)?;

    // Idempotent if a process-wide provider is already installed.
    let _ = tokio_rustls::rustls::crypto::aws_lc_rs::default_provider().install_default();

    let config = tokio_rustls::rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_cert_is_read_error() {
        let result = load_tls_config(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        );
        assert!(matches!(result, Err(TlsError::CertRead(_))));
    }

    #[test]
    fn empty_cert_file_has_no_certs() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();
        assert!(matches!(load_tls_config(&cert, &key), Err(TlsError::NoCerts)));
    }

    #[test]
    fn self_signed_cert_loads() {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, generated.cert.pem()).unwrap();
        std::fs::write(&key, generated.key_pair.serialize_pem()).unwrap();

        let result = load_tls_config(&cert, &key);
        assert!(result.is_ok(), "self-signed cert should load: {:?}", result.err());
    }

    #[test]
    fn cert_without_key_is_no_key() {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        std::fs::write(&cert, generated.cert.pem()).unwrap();
        std::fs::write(&key, "not a key").unwrap();
        assert!(matches!(load_tls_config(&cert, &key), Err(TlsError::NoKey)));
    }
}
