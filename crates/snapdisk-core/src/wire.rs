//! Frame format — the on-wire unit of the remote image protocol.
//!
//! Every frame is a fixed 16-byte header followed by a compact JSON
//! control message and an opaque payload:
//!
//! ```text
//! offset 0  : u32 LE  magic        (FRAME_MAGIC)
//! offset 4  : u32 LE  msg_len
//! offset 8  : u64 LE  payload_len
//! offset 16 : msg_len bytes        JSON control message
//!             payload_len bytes    opaque payload
//! ```
//!
//! This module is I/O-free; actually moving frames over an endpoint
//! lives in snapdisk-net.

use serde_json::Value;

/// Frame magic, little-endian on the wire.
pub const FRAME_MAGIC: u32 = 0xF9B0_49C7;

/// Fixed header size in bytes.
pub const FRAME_HEADER_LEN: usize = 16;

/// Errors in frame encoding, decoding, or the response status contract.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid frame magic 0x{found:08x} (expected 0x{expected:08x})")]
    BadMagic { found: u32, expected: u32 },
    #[error("frame length does not fit in memory")]
    LengthOverflow,
    #[error("frame message is not a JSON object")]
    NotAnObject,
    #[error("response message contains no 'status' key")]
    MissingStatus,
    #[error("response message contains error status {status:?} ({text})")]
    ErrorStatus { status: String, text: String },
    #[error("malformed frame message: {0}")]
    Json(#[from] serde_json::Error),
}

/// The fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub msg_len: u32,
    pub payload_len: u64,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        buf[0..4].copy_from_slice(&FRAME_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.msg_len.to_le_bytes());
        buf[8..16].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    pub fn parse(buf: &[u8; FRAME_HEADER_LEN]) -> Result<Self, WireError> {
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != FRAME_MAGIC {
            return Err(WireError::BadMagic {
                found: magic,
                expected: FRAME_MAGIC,
            });
        }
        Ok(Self {
            msg_len: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            payload_len: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        })
    }
}

/// Encode a control message as compact JSON bytes.
pub fn encode_message(msg: &Value) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(msg)?)
}

/// Decode control message bytes, requiring a JSON object.
pub fn decode_message(bytes: &[u8]) -> Result<Value, WireError> {
    let msg: Value = serde_json::from_slice(bytes)?;
    if !msg.is_object() {
        return Err(WireError::NotAnObject);
    }
    Ok(msg)
}

/// Enforce the response contract: the message must be an object with a
/// `"status"` key equal to `"ok"`. Anything else is an error, carrying
/// the server-supplied `text` when present.
pub fn check_status(msg: &Value) -> Result<(), WireError> {
    let obj = msg.as_object().ok_or(WireError::NotAnObject)?;
    let status = obj.get("status").ok_or(WireError::MissingStatus)?;
    let status = status.as_str().unwrap_or_default();
    if status != "ok" {
        return Err(WireError::ErrorStatus {
            status: status.to_string(),
            text: obj
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    Ok(())
}
