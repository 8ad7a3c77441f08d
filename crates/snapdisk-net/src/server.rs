//! Image server — exposes a local disk image over one endpoint.
//!
//! One command per loop iteration, answered in order. Per-command
//! failures (unknown command, oversized request, bad offset) are
//! reported as `{"status":"error"}` replies and the loop keeps
//! serving; only `quit` and endpoint termination end it.

use bytes::Bytes;
use serde_json::{json, Value};

use snapdisk_core::proto::Command;
use snapdisk_core::ChunkData;
use snapdisk_store::image::{DiskImage, ImageError};
use snapdisk_store::LocalImage;

use crate::endpoint::{Endpoint, EndpointError};
use crate::marshal::{self, ProtoError};

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error("server chunk size limited at {limit} bytes, but {requested} bytes requested")]
    ChunkTooLarge { limit: u64, requested: u64 },
    #[error("invalid request: {0}")]
    Malformed(String),
    #[error("{0}")]
    Image(#[from] ImageError),
}

struct CachedRead {
    offset: u64,
    length: u64,
    data: ChunkData,
}

pub struct ImageServer {
    image: LocalImage,
    endpoint: Endpoint,
    max_chunk_size: u64,
    // One-entry cache so get_chunk_data after get_chunk_hash for the
    // same offset does not re-read the disk.
    cache: Option<CachedRead>,
}

impl ImageServer {
    pub fn new(image: LocalImage, endpoint: Endpoint, max_chunk_size: u64) -> Self {
        Self {
            image,
            endpoint,
            max_chunk_size,
            cache: None,
        }
    }

    /// Serve until the client quits or the endpoint terminates.
    pub async fn run(&mut self) -> Result<(), ProtoError> {
        loop {
            let frame = match marshal::recv_frame(&mut self.endpoint).await {
                Ok(frame) => frame,
                Err(ProtoError::Endpoint(EndpointError::Terminated)) => {
                    tracing::info!("client disconnected");
                    return Ok(());
                }
                Err(ProtoError::Endpoint(e)) => return Err(e.into()),
                Err(ProtoError::Wire(e)) => {
                    tracing::warn!(error = %e, "marshalling error");
                    self.send_error(&e.to_string()).await?;
                    continue;
                }
            };

            let command: Command = match serde_json::from_value(frame.msg) {
                Ok(command) => command,
                Err(e) => {
                    let e = CommandError::Malformed(e.to_string());
                    tracing::warn!(error = %e, "rejecting request");
                    self.send_error(&e.to_string()).await?;
                    continue;
                }
            };
            tracing::debug!(?command, "command received");

            if let Command::Quit = command {
                let reply = json!({ "status": "ok", "text": "connection closed" });
                marshal::send_frame(&mut self.endpoint, &reply, &[]).await?;
                tracing::info!("client quit");
                return Ok(());
            }

            match self.process(command) {
                Ok((mut msg, payload)) => {
                    msg["status"] = json!("ok");
                    marshal::send_frame(&mut self.endpoint, &msg, &payload).await?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "command failed");
                    self.send_error(&e.to_string()).await?;
                }
            }
        }
    }

    async fn send_error(&mut self, text: &str) -> Result<(), ProtoError> {
        let reply = json!({ "status": "error", "text": text });
        marshal::send_frame(&mut self.endpoint, &reply, &[]).await
    }

    fn process(&mut self, command: Command) -> Result<(Value, Bytes), CommandError> {
        match command {
            Command::GetImageMetadata => Ok((
                json!({
                    "device_name": self.image.device_name(),
                    "disk_size": self.image.disk_size(),
                    "chunk_size": self.image.chunk_size(),
                }),
                Bytes::new(),
            )),
            Command::GetChunkHash { offset, length } => {
                let data = self.read_cached(offset, self.resolve_length(length))?;
                Ok((
                    json!({
                        "offset": offset,
                        "hash": data.id().to_hex(),
                        "size": data.len(),
                    }),
                    Bytes::new(),
                ))
            }
            Command::GetChunkData { offset, length } => {
                let data = self.read_cached(offset, self.resolve_length(length))?;
                Ok((
                    json!({
                        "offset": offset,
                        "hash": data.id().to_hex(),
                    }),
                    data.bytes().clone(),
                ))
            }
            // Handled before process() is called.
            Command::Quit => Err(CommandError::Malformed("quit".to_string())),
        }
    }

    /// A missing `length` defaults to the served image's chunk size.
    fn resolve_length(&self, length: Option<u64>) -> u64 {
        length.unwrap_or_else(|| self.image.chunk_size())
    }

    fn read_cached(&mut self, offset: u64, length: u64) -> Result<ChunkData, CommandError> {
        if length > self.max_chunk_size {
            return Err(CommandError::ChunkTooLarge {
                limit: self.max_chunk_size,
                requested: length,
            });
        }
        if let Some(cached) = &self.cache {
            if cached.offset == offset && cached.length == length {
                return Ok(cached.data.clone());
            }
        }
        let data = self.image.read_range(offset, length)?;
        self.cache = Some(CachedRead {
            offset,
            length,
            data: data.clone(),
        });
        Ok(data)
    }
}
