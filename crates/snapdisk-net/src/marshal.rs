//! Frame marshalling over an endpoint.
//!
//! A frame goes out as three emissions — header, control message,
//! payload — and comes in as three exact-length reads. `send_recv` is
//! the client-side RPC: one frame out, one frame in, `"status"` must
//! be `"ok"`.

use bytes::Bytes;
use serde_json::Value;

use snapdisk_core::wire::{self, FrameHeader, WireError, FRAME_HEADER_LEN};

use crate::endpoint::{Endpoint, EndpointError};

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A received frame: the JSON control message plus its opaque payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub msg: Value,
    pub payload: Bytes,
}

pub async fn send_frame(
    endpoint: &mut Endpoint,
    msg: &Value,
    payload: &[u8],
) -> Result<(), ProtoError> {
    let msg_bytes = wire::encode_message(msg)?;
    let header = FrameHeader {
        msg_len: msg_bytes.len() as u32,
        payload_len: payload.len() as u64,
    };
    endpoint.send(&header.encode()).await?;
    endpoint.send(&msg_bytes).await?;
    endpoint.send(payload).await?;
    Ok(())
}

pub async fn recv_frame(endpoint: &mut Endpoint) -> Result<Frame, ProtoError> {
    let header_bytes = endpoint.recv(FRAME_HEADER_LEN).await?;
    let mut header_buf = [0u8; FRAME_HEADER_LEN];
    header_buf.copy_from_slice(&header_bytes);
    let header = FrameHeader::parse(&header_buf)?;

    let msg_bytes = endpoint.recv(header.msg_len as usize).await?;
    let payload_len =
        usize::try_from(header.payload_len).map_err(|_| WireError::LengthOverflow)?;
    let payload = endpoint.recv(payload_len).await?;

    let msg = wire::decode_message(&msg_bytes)?;
    Ok(Frame { msg, payload })
}

/// Send one request frame and receive its response, enforcing the
/// `"status":"ok"` contract.
pub async fn send_recv(
    endpoint: &mut Endpoint,
    msg: &Value,
    payload: &[u8],
) -> Result<Frame, ProtoError> {
    send_frame(endpoint, msg, payload).await?;
    let frame = recv_frame(endpoint).await?;
    wire::check_status(&frame.msg)?;
    Ok(frame)
}
