//! TLS configuration with pinned self-signed peer certificates.
//!
//! Trust model: no certificate authorities. Each side presents its own
//! self-signed certificate and accepts exactly the certificates listed
//! in its key file's `trusted_peer_certs` — the presented leaf must
//! match a pinned certificate byte-for-byte. Hostname verification is
//! disabled; the pin is the identity.
//!
//! The protocol is fixed at TLS 1.2 (minimum = maximum) with the
//! ECDHE-ECDSA suites CHACHA20-POLY1305, AES256-GCM-SHA384, and
//! AES128-GCM-SHA256.

use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::server::{ClientCertVerified, ClientCertVerifier};
use rustls::{Certificate, ClientConfig, DistinguishedName, PrivateKey, ServerConfig};

use crate::keystore::KeyStore;

static TLS12_SUITES: &[rustls::SupportedCipherSuite] = &[
    rustls::cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
    rustls::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
    rustls::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
];

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("invalid PEM in key file: {0}")]
    Pem(#[source] io::Error),
    #[error("key file certificate PEM contains no certificate")]
    NoCert,
    #[error("key file key PEM contains no private key")]
    NoKey,
    #[error("tls configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

fn certs_from_pem(pem: &str) -> Result<Vec<Certificate>, TlsError> {
    let mut reader = io::Cursor::new(pem.as_bytes());
    let certs = rustls_pemfile::certs(&mut reader).map_err(TlsError::Pem)?;
    Ok(certs.into_iter().map(Certificate).collect())
}

fn key_from_pem(pem: &str) -> Result<PrivateKey, TlsError> {
    let mut reader = io::Cursor::new(pem.as_bytes());
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut reader).map_err(TlsError::Pem)?;
    keys.pop().map(PrivateKey).ok_or(TlsError::NoKey)
}

fn own_cert_chain(store: &KeyStore) -> Result<Vec<Certificate>, TlsError> {
    let certs = certs_from_pem(&store.cert)?;
    if certs.is_empty() {
        return Err(TlsError::NoCert);
    }
    Ok(certs)
}

fn pinned_certs(store: &KeyStore) -> Result<Vec<Certificate>, TlsError> {
    let mut pinned = Vec::new();
    for pem in &store.trusted_peer_certs {
        pinned.extend(certs_from_pem(pem)?);
    }
    Ok(pinned)
}

/// Accepts a peer iff its presented leaf certificate is in the pinned
/// set. Used on both sides of the handshake.
struct PinnedPeerVerifier {
    pinned: Vec<Certificate>,
    // No CA hints are sent; peers pick their only certificate anyway.
    subjects: Vec<DistinguishedName>,
}

impl PinnedPeerVerifier {
    fn new(pinned: Vec<Certificate>) -> Self {
        Self {
            pinned,
            subjects: Vec::new(),
        }
    }

    fn check(&self, end_entity: &Certificate) -> Result<(), rustls::Error> {
        if self.pinned.iter().any(|pinned| pinned == end_entity) {
            Ok(())
        } else {
            Err(rustls::Error::General(
                "peer certificate is not a pinned trusted peer".to_string(),
            ))
        }
    }
}

impl ServerCertVerifier for PinnedPeerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.check(end_entity)?;
        Ok(ServerCertVerified::assertion())
    }
}

impl ClientCertVerifier for PinnedPeerVerifier {
    fn client_auth_root_subjects(&self) -> &[DistinguishedName] {
        &self.subjects
    }

    fn verify_client_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        _now: SystemTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        self.check(end_entity)?;
        Ok(ClientCertVerified::assertion())
    }
}

/// Listener-side configuration: present our certificate, require and
/// pin the client's.
pub fn server_config(store: &KeyStore) -> Result<ServerConfig, TlsError> {
    let verifier = Arc::new(PinnedPeerVerifier::new(pinned_certs(store)?));
    let config = ServerConfig::builder()
        .with_cipher_suites(TLS12_SUITES)
        .with_kx_groups(&rustls::ALL_KX_GROUPS)
        .with_protocol_versions(&[&rustls::version::TLS12])?
        .with_client_cert_verifier(verifier)
        .with_single_cert(own_cert_chain(store)?, key_from_pem(&store.key)?)?;
    Ok(config)
}

/// Connector-side configuration: present our certificate, pin the
/// server's, ignore hostnames.
pub fn client_config(store: &KeyStore) -> Result<ClientConfig, TlsError> {
    let verifier = Arc::new(PinnedPeerVerifier::new(pinned_certs(store)?));
    let config = ClientConfig::builder()
        .with_cipher_suites(TLS12_SUITES)
        .with_kx_groups(&rustls::ALL_KX_GROUPS)
        .with_protocol_versions(&[&rustls::version::TLS12])?
        .with_custom_certificate_verifier(verifier)
        .with_client_auth_cert(own_cert_chain(store)?, key_from_pem(&store.key)?)?;
    Ok(config)
}
