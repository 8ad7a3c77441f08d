//! Remote disk image — the client side of the image protocol.
//!
//! Construction connects (or spawns ssh), fetches the image metadata,
//! and verifies the server's chunk size matches the caller's. Chunks
//! come back as lazy `Remote` handles from `get_chunk_hash`; the
//! payload crosses the wire only when `fetch` issues `get_chunk_data`,
//! and must hash to the declared identity.

use async_trait::async_trait;
use serde_json::Value;

use snapdisk_core::proto::{ChunkDataReply, ChunkHashReply, Command, ImageMetadata};
use snapdisk_core::{Chunk, ChunkData};
use snapdisk_store::image::{DiskImage, ImageError};

use crate::endpoint::Endpoint;
use crate::marshal::{self, Frame};
use crate::uri::EndpointAddr;

pub struct RemoteImage {
    endpoint: Endpoint,
    device_name: String,
    disk_size: u64,
    chunk_size: u64,
}

fn transport<E: std::error::Error + Send + Sync + 'static>(e: E) -> ImageError {
    ImageError::Transport(Box::new(e))
}

fn encode_command(command: &Command) -> Result<Value, ImageError> {
    serde_json::to_value(command).map_err(transport)
}

impl RemoteImage {
    /// Connect to a serving peer and validate its metadata.
    ///
    /// For `ssh://` the peer is an ssh subprocess running
    /// `<remote_snapdisk> serve --chunk-size <n> <remote-path>`; for
    /// every other scheme the endpoint definition supplies the
    /// connection.
    pub async fn connect(
        addr: &EndpointAddr,
        chunk_size: u64,
        remote_snapdisk: &str,
    ) -> Result<Self, ImageError> {
        if chunk_size == 0 {
            return Err(ImageError::ZeroChunkSize);
        }
        let mut endpoint = match addr {
            EndpointAddr::Ssh {
                destination,
                port,
                remote_path,
            } => {
                let remote_command =
                    format!("{remote_snapdisk} serve --chunk-size {chunk_size} {remote_path}");
                let argv = vec![
                    "ssh".to_string(),
                    "-p".to_string(),
                    port.to_string(),
                    destination.clone(),
                    remote_command,
                ];
                tracing::info!(command = %argv.join(" "), "spawning remote serve");
                Endpoint::subprocess(&argv).map_err(transport)?
            }
            other => other.connect().await.map_err(transport)?,
        };

        let request = encode_command(&Command::GetImageMetadata)?;
        let frame = marshal::send_recv(&mut endpoint, &request, &[])
            .await
            .map_err(transport)?;
        let meta: ImageMetadata = serde_json::from_value(frame.msg).map_err(transport)?;
        if meta.chunk_size != chunk_size {
            return Err(ImageError::ChunkSizeMismatch {
                server: meta.chunk_size,
                requested: chunk_size,
            });
        }
        tracing::info!(
            device_name = %meta.device_name,
            disk_size = meta.disk_size,
            "remote image connected"
        );
        Ok(Self {
            endpoint,
            device_name: meta.device_name,
            disk_size: meta.disk_size,
            chunk_size,
        })
    }

    async fn request(&mut self, command: Command) -> Result<Frame, ImageError> {
        let msg = encode_command(&command)?;
        marshal::send_recv(&mut self.endpoint, &msg, &[])
            .await
            .map_err(transport)
    }
}

#[async_trait]
impl DiskImage for RemoteImage {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn disk_size(&self) -> u64 {
        self.disk_size
    }

    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    async fn chunk_at(&mut self, offset: u64) -> Result<Chunk, ImageError> {
        if offset % self.chunk_size != 0 {
            return Err(ImageError::UnalignedOffset {
                offset,
                chunk_size: self.chunk_size,
            });
        }
        if offset >= self.disk_size {
            return Err(ImageError::OffsetOutOfRange {
                offset,
                disk_size: self.disk_size,
            });
        }
        let frame = self
            .request(Command::GetChunkHash {
                offset,
                length: None,
            })
            .await?;
        let reply: ChunkHashReply = serde_json::from_value(frame.msg).map_err(transport)?;
        Ok(Chunk::Remote {
            id: reply.hash,
            size: reply.size,
            offset,
        })
    }

    async fn fetch(&mut self, chunk: &Chunk) -> Result<ChunkData, ImageError> {
        let (id, size, offset) = match chunk {
            Chunk::Local(data) => return Ok(data.clone()),
            Chunk::Remote { id, size, offset } => (*id, *size, *offset),
        };
        let frame = self
            .request(Command::GetChunkData {
                offset,
                length: None,
            })
            .await?;
        let _reply: ChunkDataReply = serde_json::from_value(frame.msg).map_err(transport)?;
        if frame.payload.len() as u64 != size {
            return Err(ImageError::SizeMismatch {
                offset,
                expected: size,
                actual: frame.payload.len() as u64,
            });
        }
        let data = ChunkData::new(frame.payload);
        if data.id() != id {
            return Err(ImageError::HashMismatch {
                offset,
                expected: id,
                actual: data.id(),
            });
        }
        Ok(data)
    }

    /// Tell the server to quit; it must answer `"status":"ok"`.
    async fn close(&mut self) -> Result<(), ImageError> {
        self.request(Command::Quit).await?;
        tracing::debug!("remote image closed");
        Ok(())
    }
}
