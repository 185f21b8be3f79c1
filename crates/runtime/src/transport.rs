//! Length-prefixed JSON framing over any byte stream.
//!
//! Each message is `[u32 little-endian length][JSON payload]`. The reader and
//! writer halves are independent so a connection can pump them from separate
//! tasks, and the peer-side server can drive them in lockstep.

use peerlink_protocol::frame::{self, HEADER_LEN, MAX_FRAME_LEN};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Read half of a framed stream.
pub struct FrameReader<R> {
	inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
	pub fn new(inner: R) -> Self {
		Self { inner }
	}

	/// Reads the next message.
	///
	/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
	/// A stream that ends inside a frame is a transport error.
	pub async fn read_frame(&mut self) -> Result<Option<Value>> {
		let mut header = [0u8; HEADER_LEN];
		let mut filled = 0;
		while filled < HEADER_LEN {
			let n = self
				.inner
				.read(&mut header[filled..])
				.await
				.map_err(|e| Error::TransportError(format!("Failed to read length prefix: {e}")))?;
			if n == 0 {
				if filled == 0 {
					return Ok(None);
				}
				return Err(Error::TransportError(
					"Failed to read length prefix: stream ended mid-header".to_string(),
				));
			}
			filled += n;
		}

		let length = frame::payload_len(header);
		if length > MAX_FRAME_LEN {
			return Err(Error::ProtocolError(format!(
				"Frame of {length} bytes exceeds the {MAX_FRAME_LEN} byte limit"
			)));
		}

		let mut payload = vec![0u8; length];
		self.inner
			.read_exact(&mut payload)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read message body: {e}")))?;

		serde_json::from_slice(&payload)
			.map(Some)
			.map_err(|e| Error::ProtocolError(format!("Malformed message: {e}")))
	}
}

/// Write half of a framed stream.
pub struct FrameWriter<W> {
	inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}

	/// Writes one message and flushes it.
	///
	/// A message over [`MAX_FRAME_LEN`] fails with [`Error::ProtocolError`]
	/// before anything reaches the stream.
	pub async fn write_frame(&mut self, message: &Value) -> Result<()> {
		let bytes = frame::encode(message)?;
		self.write_encoded(&bytes).await
	}

	/// Writes a frame produced by [`frame::encode`] and flushes it.
	pub async fn write_encoded(&mut self, bytes: &[u8]) -> Result<()> {
		self.inner
			.write_all(bytes)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to write message: {e}")))?;
		self.inner
			.flush()
			.await
			.map_err(|e| Error::TransportError(format!("Failed to flush message: {e}")))
	}

	/// Shuts down the write direction, signalling end of stream to the other side.
	pub async fn shutdown(&mut self) -> Result<()> {
		self.inner.shutdown().await.map_err(Error::from)
	}
}
