//! TLS trust store — a single JSON artifact holding this side's
//! certificate, private key, and the list of pinned peer certificates.
//!
//! The artifact is `{"cert": <PEM>, "key": <PEM>,
//! "trusted_peer_certs": [<PEM>, ...]}`. Files are written with
//! owner-only permissions via a tmp+rename so a crash never leaves a
//! half-written key file behind.

use std::fs;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Certificate validity: roughly one hundred years.
const VALIDITY_DAYS: i64 = 365 * 100;

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("failed to read key file {0}: {1}")]
    Read(PathBuf, #[source] io::Error),
    #[error("failed to parse key file {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("failed to write key file {0}: {1}")]
    Write(PathBuf, #[source] io::Error),
    #[error("failed to serialize key file: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::RcgenError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyStore {
    pub cert: String,
    pub key: String,
    pub trusted_peer_certs: Vec<String>,
}

impl KeyStore {
    pub fn load(path: &Path) -> Result<Self, KeyStoreError> {
        let text =
            fs::read_to_string(path).map_err(|e| KeyStoreError::Read(path.to_path_buf(), e))?;
        serde_json::from_str(&text).map_err(|e| KeyStoreError::Parse(path.to_path_buf(), e))
    }

    fn save(&self, path: &Path) -> Result<(), KeyStoreError> {
        let bytes = serde_json::to_vec(self).map_err(KeyStoreError::Serialize)?;
        let tmp = path.with_extension("tmp");
        let write = |p: &Path| -> io::Result<()> {
            use io::Write;
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(p)?;
            file.write_all(&bytes)
        };
        write(&tmp).map_err(|e| KeyStoreError::Write(tmp.clone(), e))?;
        fs::rename(&tmp, path).map_err(|e| KeyStoreError::Write(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Generate a fresh secp384r1 key and self-signed certificate
    /// (CN = random UUID) and write the artifact with an empty pinned
    /// set.
    pub fn create(path: &Path) -> Result<Self, KeyStoreError> {
        let cn = uuid::Uuid::new_v4().to_string();
        let mut params = rcgen::CertificateParams::default();
        params.alg = &rcgen::PKCS_ECDSA_P384_SHA384;
        let mut dn = rcgen::DistinguishedName::new();
        dn.push(rcgen::DnType::CommonName, cn.as_str());
        params.distinguished_name = dn;
        params.not_before = time::OffsetDateTime::now_utc();
        params.not_after = params.not_before + time::Duration::days(VALIDITY_DAYS);

        let cert = rcgen::Certificate::from_params(params)?;
        let store = Self {
            cert: cert.serialize_pem()?,
            key: cert.serialize_private_key_pem(),
            trusted_peer_certs: Vec::new(),
        };
        store.save(path)?;
        tracing::info!(path = %path.display(), cn, "key file created");
        Ok(store)
    }

    /// Append PEM certificates to the pinned set and rewrite the file.
    pub fn add_trusted_peers(path: &Path, peers: &[String]) -> Result<(), KeyStoreError> {
        let mut store = Self::load(path)?;
        store.trusted_peer_certs.extend_from_slice(peers);
        store.save(path)
    }

    /// Create two artifacts that pin exactly each other.
    pub fn create_server_client_pair(
        server_path: &Path,
        client_path: &Path,
    ) -> Result<(), KeyStoreError> {
        let server = Self::create(server_path)?;
        let client = Self::create(client_path)?;
        Self::add_trusted_peers(server_path, &[client.cert])?;
        Self::add_trusted_peers(client_path, &[server.cert])?;
        Ok(())
    }
}
