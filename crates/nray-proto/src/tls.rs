//! TLS configuration: server cert/key loading, optional client-cert
//! enforcement, client-side CA pinning, optional client certs, and an
//! "accept any cert" escape hatch for testing (`--tls-insecure`).

use nray_core::{Error, Result};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::path::Path;
use std::sync::Arc;

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Config(format!("opening cert file {path:?}: {e}")))?;
    let mut reader = std::io::BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("parsing cert file {path:?}: {e}")))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Config(format!("opening key file {path:?}: {e}")))?;
    let mut reader = std::io::BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Config(format!("parsing key file {path:?}: {e}")))?
        .ok_or_else(|| Error::Config(format!("no private key found in {path:?}")))
}

/// Build a server-side `rustls::ServerConfig` from a cert/key pair,
/// optionally requiring and verifying client certificates against a CA.
pub fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
    client_ca_path: Option<&Path>,
    require_client_cert: bool,
) -> Result<rustls::ServerConfig> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let builder = rustls::ServerConfig::builder();
    let config = if let Some(ca_path) = client_ca_path {
        let mut roots = rustls::RootCertStore::empty();
        for cert in load_certs(ca_path)? {
            roots
                .add(cert)
                .map_err(|e| Error::Config(format!("invalid client CA cert: {e}")))?;
        }
        let verifier = if require_client_cert {
            rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|e| Error::Config(format!("building client verifier: {e}")))?
        } else {
            rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
                .allow_unauthenticated()
                .build()
                .map_err(|e| Error::Config(format!("building client verifier: {e}")))?
        };
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
    } else {
        builder
            .with_no_client_auth()
            .with_single_cert(certs, key)
    }
    .map_err(|e| Error::Config(format!("building server TLS config: {e}")))?;

    Ok(config)
}

/// Build a client-side `rustls::ClientConfig`. `insecure_skip_verify`
/// is a testing-only escape hatch that disables all certificate
/// validation; it must never be the default.
pub fn load_client_config(
    ca_path: Option<&Path>,
    client_cert_path: Option<&Path>,
    client_key_path: Option<&Path>,
    insecure_skip_verify: bool,
) -> Result<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder();

    if insecure_skip_verify {
        let builder = builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertVerifier));
        return finish_client_config(builder, client_cert_path, client_key_path);
    }

    let mut roots = rustls::RootCertStore::empty();
    if let Some(ca_path) = ca_path {
        for cert in load_certs(ca_path)? {
            roots
                .add(cert)
                .map_err(|e| Error::Config(format!("invalid CA cert: {e}")))?;
        }
    } else {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    finish_client_config(
        builder.with_root_certificates(roots),
        client_cert_path,
        client_key_path,
    )
}

fn finish_client_config(
    builder: rustls::ConfigBuilder<rustls::ClientConfig, rustls::client::WantsClientCert>,
    client_cert_path: Option<&Path>,
    client_key_path: Option<&Path>,
) -> Result<rustls::ClientConfig> {
    match (client_cert_path, client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| Error::Config(format!("building client auth cert: {e}")))
        }
        _ => Ok(builder.with_no_client_auth()),
    }
}

/// Accepts every server certificate without validation. Wired up only
/// behind `--tls-insecure`, for talking to dev/test servers with
/// self-signed certs.
#[derive(Debug)]
struct AcceptAnyCertVerifier;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
