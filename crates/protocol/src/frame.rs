//! Frame layout: `[length: u32 little-endian][JSON bytes]`.

use std::fmt;

use serde::Serialize;

/// Size of the little-endian length header.
pub const HEADER_LEN: usize = 4;

/// Largest payload either side accepts (64 MiB).
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Why a message could not be framed.
#[derive(Debug)]
pub enum EncodeError {
	Json(serde_json::Error),
	/// Payload of this many bytes is over [`MAX_FRAME_LEN`].
	TooLarge(usize),
}

impl fmt::Display for EncodeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EncodeError::Json(e) => write!(f, "{e}"),
			EncodeError::TooLarge(len) => {
				write!(f, "Frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit")
			}
		}
	}
}

impl std::error::Error for EncodeError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			EncodeError::Json(e) => Some(e),
			EncodeError::TooLarge(_) => None,
		}
	}
}

impl From<serde_json::Error> for EncodeError {
	fn from(e: serde_json::Error) -> Self {
		EncodeError::Json(e)
	}
}

/// Encodes `message` into a complete frame.
///
/// Refuses payloads the receiving side would reject, so the header never
/// has to truncate.
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>, EncodeError> {
	let payload = serde_json::to_vec(message)?;
	if payload.len() > MAX_FRAME_LEN {
		return Err(EncodeError::TooLarge(payload.len()));
	}
	let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
	frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
	frame.extend_from_slice(&payload);
	Ok(frame)
}

/// Decodes a frame header into the payload length.
pub fn payload_len(header: [u8; HEADER_LEN]) -> usize {
	u32::from_le_bytes(header) as usize
}
