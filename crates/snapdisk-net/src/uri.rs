//! Endpoint URIs — parsing and listener/connector construction.
//!
//! Recognized schemes:
//!
//! - `stdout://` — the process's own stdin/stdout
//! - `ip://[addr][:port]` — plain TCP (default 127.0.0.1:55860)
//! - `unix://<path>` — UNIX domain socket
//! - `tls://[addr][:port]/<keyfile>` — mutually-authenticated TLS over
//!   TCP (default 127.0.0.1:48748)
//! - `ssh://[user@]host[:port]/<remote-path>` — client-only; spawns an
//!   ssh subprocess running the remote serve command

use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::endpoint::{Endpoint, EndpointError};
use crate::keystore::{KeyStore, KeyStoreError};
use crate::tls::{self, TlsError};

pub const DEFAULT_TCP_PORT: u16 = 55860;
pub const DEFAULT_TLS_PORT: u16 = 48748;
pub const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_ADDRESS: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UriError {
    #[error("endpoint URI has no scheme: {0:?}")]
    MissingScheme(String),
    #[error("unsupported endpoint scheme: {0:?}")]
    UnknownScheme(String),
    #[error("invalid port in endpoint URI: {0:?}")]
    BadPort(String),
    #[error("unix endpoint URI is missing the socket path")]
    MissingSocketPath,
    #[error("tls endpoint URI is missing the key file path")]
    MissingKeyfile,
    #[error("ssh URI is missing the remote image path")]
    MissingRemotePath,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("endpoint i/o error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error("invalid tls server name: {0:?}")]
    BadServerName(String),
    #[error("ssh endpoints are client-only; the remote image opens them")]
    SshNotDirect,
}

/// A parsed endpoint definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAddr {
    Stdio,
    Tcp {
        address: String,
        port: u16,
    },
    Unix {
        path: PathBuf,
    },
    Tls {
        address: String,
        port: u16,
        keyfile: PathBuf,
    },
    Ssh {
        destination: String,
        port: u16,
        remote_path: String,
    },
}

fn split_address_port(netloc: &str, default_port: u16) -> Result<(String, u16), UriError> {
    let (address, port) = match netloc.split_once(':') {
        Some((address, port)) => (
            address,
            port.parse()
                .map_err(|_| UriError::BadPort(port.to_string()))?,
        ),
        None => (netloc, default_port),
    };
    let address = if address.is_empty() {
        DEFAULT_ADDRESS
    } else {
        address
    };
    Ok((address.to_string(), port))
}

impl FromStr for EndpointAddr {
    type Err = UriError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = text
            .split_once("://")
            .ok_or_else(|| UriError::MissingScheme(text.to_string()))?;
        match scheme {
            "stdout" => Ok(EndpointAddr::Stdio),
            "ip" => {
                let (address, port) = split_address_port(rest, DEFAULT_TCP_PORT)?;
                Ok(EndpointAddr::Tcp { address, port })
            }
            "unix" => {
                if rest.is_empty() {
                    return Err(UriError::MissingSocketPath);
                }
                Ok(EndpointAddr::Unix { path: rest.into() })
            }
            "tls" => {
                let (netloc, path) = rest.split_once('/').ok_or(UriError::MissingKeyfile)?;
                if path.is_empty() {
                    return Err(UriError::MissingKeyfile);
                }
                let (address, port) = split_address_port(netloc, DEFAULT_TLS_PORT)?;
                Ok(EndpointAddr::Tls {
                    address,
                    port,
                    keyfile: path.into(),
                })
            }
            "ssh" => {
                let (netloc, path) = rest.split_once('/').ok_or(UriError::MissingRemotePath)?;
                if path.is_empty() {
                    return Err(UriError::MissingRemotePath);
                }
                // [user@]host[:port] — the user part stays inside the
                // destination handed to ssh
                let (destination, port) = match netloc.rsplit_once(':') {
                    Some((destination, port)) => (
                        destination.to_string(),
                        port.parse()
                            .map_err(|_| UriError::BadPort(port.to_string()))?,
                    ),
                    None => (netloc.to_string(), DEFAULT_SSH_PORT),
                };
                Ok(EndpointAddr::Ssh {
                    destination,
                    port,
                    remote_path: path.to_string(),
                })
            }
            other => Err(UriError::UnknownScheme(other.to_string())),
        }
    }
}

impl EndpointAddr {
    /// Listen and return the first successfully established endpoint.
    ///
    /// TCP and UNIX listeners accept a single connection. The TLS
    /// listener keeps accepting until a peer passes certificate
    /// verification; failed handshakes are logged and do not tear the
    /// listener down.
    pub async fn listen(&self) -> Result<Endpoint, ConnectError> {
        match self {
            EndpointAddr::Stdio => Ok(Endpoint::stdio()),
            EndpointAddr::Tcp { address, port } => {
                let listener = TcpListener::bind((address.as_str(), *port)).await?;
                tracing::info!(address, port, "listening");
                let (stream, peer) = listener.accept().await?;
                tracing::info!(%peer, "client connected");
                Ok(Endpoint::Tcp(stream))
            }
            EndpointAddr::Unix { path } => {
                match fs::remove_file(path) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
                let listener = UnixListener::bind(path)?;
                tracing::info!(path = %path.display(), "listening");
                let (stream, _) = listener.accept().await?;
                tracing::info!("client connected");
                Ok(Endpoint::Unix(stream))
            }
            EndpointAddr::Tls {
                address,
                port,
                keyfile,
            } => {
                let store = KeyStore::load(keyfile)?;
                let acceptor = TlsAcceptor::from(Arc::new(tls::server_config(&store)?));
                let listener = TcpListener::bind((address.as_str(), *port)).await?;
                tracing::info!(address, port, "listening (tls)");
                loop {
                    let (stream, peer) = listener.accept().await?;
                    match acceptor.accept(stream).await {
                        Ok(stream) => {
                            tracing::info!(%peer, "tls client connected");
                            return Ok(Endpoint::Tls(Box::new(stream.into())));
                        }
                        Err(e) => {
                            tracing::warn!(%peer, error = %e, "connection of client rejected");
                        }
                    }
                }
            }
            EndpointAddr::Ssh { .. } => Err(ConnectError::SshNotDirect),
        }
    }

    /// Connect and return the established endpoint.
    pub async fn connect(&self) -> Result<Endpoint, ConnectError> {
        match self {
            EndpointAddr::Stdio => Ok(Endpoint::stdio()),
            EndpointAddr::Tcp { address, port } => {
                let stream = TcpStream::connect((address.as_str(), *port)).await?;
                tracing::debug!(address, port, "connected");
                Ok(Endpoint::Tcp(stream))
            }
            EndpointAddr::Unix { path } => {
                let stream = UnixStream::connect(path).await?;
                tracing::debug!(path = %path.display(), "connected");
                Ok(Endpoint::Unix(stream))
            }
            EndpointAddr::Tls {
                address,
                port,
                keyfile,
            } => {
                let store = KeyStore::load(keyfile)?;
                let connector = TlsConnector::from(Arc::new(tls::client_config(&store)?));
                let server_name = rustls::ServerName::try_from(address.as_str())
                    .map_err(|_| ConnectError::BadServerName(address.clone()))?;
                let stream = TcpStream::connect((address.as_str(), *port)).await?;
                let stream = connector.connect(server_name, stream).await?;
                tracing::debug!(address, port, "connected (tls)");
                Ok(Endpoint::Tls(Box::new(stream.into())))
            }
            EndpointAddr::Ssh { .. } => Err(ConnectError::SshNotDirect),
        }
    }
}
