//! Endpoints — reliable ordered byte streams with exact-length reads.
//!
//! An endpoint either transmits every byte or fails; `recv` either
//! returns exactly the requested number of bytes or fails, with EOF
//! mid-read surfacing as `EndpointError::Terminated`. The stream is
//! owned by whichever side opened it and closes on drop (subprocess
//! children are killed).

use std::io;
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("received zero bytes; connection severed")]
    Terminated,
    #[error("endpoint i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to spawn subprocess {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("subprocess has no stdio pipes")]
    NoPipes,
}

pub enum Endpoint {
    Stdio {
        stdin: tokio::io::Stdin,
        stdout: tokio::io::Stdout,
    },
    Tcp(TcpStream),
    Unix(UnixStream),
    Subprocess {
        // Held so the child is killed when the endpoint drops.
        _child: Child,
        stdin: ChildStdin,
        stdout: ChildStdout,
    },
    Tls(Box<tokio_rustls::TlsStream<TcpStream>>),
}

impl Endpoint {
    /// The calling process's own stdin/stdout as the channel.
    pub fn stdio() -> Self {
        Endpoint::Stdio {
            stdin: tokio::io::stdin(),
            stdout: tokio::io::stdout(),
        }
    }

    /// Spawn `argv` with piped stdio; the child's stdin/stdout become
    /// the channel.
    pub fn subprocess(argv: &[String]) -> Result<Self, EndpointError> {
        let rendered = argv.join(" ");
        let (program, args) = argv.split_first().ok_or(EndpointError::NoPipes)?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EndpointError::Spawn {
                command: rendered,
                source,
            })?;
        let stdin = child.stdin.take().ok_or(EndpointError::NoPipes)?;
        let stdout = child.stdout.take().ok_or(EndpointError::NoPipes)?;
        Ok(Endpoint::Subprocess {
            _child: child,
            stdin,
            stdout,
        })
    }

    /// Transmit every byte of `data`.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), EndpointError> {
        match self {
            Endpoint::Stdio { stdout, .. } => {
                stdout.write_all(data).await?;
                stdout.flush().await?;
            }
            Endpoint::Tcp(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Endpoint::Unix(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Endpoint::Subprocess { stdin, .. } => {
                stdin.write_all(data).await?;
                stdin.flush().await?;
            }
            Endpoint::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    /// Receive exactly `length` bytes, failing with `Terminated` if the
    /// stream ends first.
    pub async fn recv(&mut self, length: usize) -> Result<Bytes, EndpointError> {
        let mut buf = vec![0u8; length];
        let result = match self {
            Endpoint::Stdio { stdin, .. } => stdin.read_exact(&mut buf).await,
            Endpoint::Tcp(stream) => stream.read_exact(&mut buf).await,
            Endpoint::Unix(stream) => stream.read_exact(&mut buf).await,
            Endpoint::Subprocess { stdout, .. } => stdout.read_exact(&mut buf).await,
            Endpoint::Tls(stream) => stream.read_exact(&mut buf).await,
        };
        match result {
            Ok(_) => Ok(Bytes::from(buf)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(EndpointError::Terminated),
            Err(e) => Err(e.into()),
        }
    }
}
