//! Request/response connection to a peer.
//!
//! A [`Connection`] owns two background tasks for one byte stream: a reader
//! that correlates responses with pending requests by id, and a writer that
//! drains an outbound queue. When the stream ends or fails, every pending
//! request is failed and the connection is marked closed, so a caller
//! blocked in [`Connection::send_message`] always wakes. A malformed or
//! oversized inbound frame fails them with [`Error::ProtocolError`]; any other
//! read or write failure with [`Error::TransportError`].
//!
//! # Message Flow
//!
//! 1. Caller invokes `send_message()` with GUID, method, and params
//! 2. The request is framed; one over the size limit fails right here
//! 3. Connection parks a oneshot sender under the request id and queues the
//!    frame for the writer task
//! 4. The reader task receives the response and completes the oneshot
//! 5. Caller receives the result, or a remote/transport error

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use peerlink_protocol::{ErrorPayload, Message, ROOT_GUID, Request, frame, methods};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::{FrameReader, FrameWriter};

/// Pending request callbacks keyed by request ID.
type CallbackMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// RAII guard removing the callback when a request future is dropped before
/// its response arrives (for example a ping cut short by its timeout).
struct CancelGuard {
	id: u32,
	callbacks: CallbackMap,
	completed: bool,
}

impl CancelGuard {
	fn new(id: u32, callbacks: CallbackMap) -> Self {
		Self {
			id,
			callbacks,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.callbacks.lock().remove(&self.id).is_some() {
			debug!(target = "peerlink", id = self.id, "removed orphaned callback");
		}
	}
}

/// Future returned by [`Connection::send_message`] with automatic cancellation cleanup.
struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: CancelGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.complete();
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// State shared between the connection handle and its pump tasks.
struct Shared {
	callbacks: CallbackMap,
	closed: AtomicBool,
}

impl Shared {
	/// Marks the link dead and fails every pending request.
	///
	/// `closed` is set before the callbacks are drained so a request inserted
	/// after the drain observes it and bails out instead of waiting forever.
	fn fail_pending(&self, make_error: impl Fn() -> Error) {
		self.closed.store(true, Ordering::SeqCst);
		let pending: Vec<_> = self.callbacks.lock().drain().collect();
		for (id, callback) in pending {
			debug!(target = "peerlink", id, "failing pending request");
			let _ = callback.send(Err(make_error()));
		}
	}
}

/// RPC connection to a peer.
///
/// Cheap to share behind an `Arc`; [`crate::RemoteObject`] handles keep one.
pub struct Connection {
	/// Sequential request ID counter
	last_id: AtomicU32,
	shared: Arc<Shared>,
	/// Encoded frames for the writer task
	outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
	/// Starts the reader and writer pumps over a split byte stream.
	///
	/// Must be called from within a tokio runtime.
	pub fn open<R, W>(reader: R, writer: W) -> Self
	where
		R: AsyncRead + Unpin + Send + 'static,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let shared = Arc::new(Shared {
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			closed: AtomicBool::new(false),
		});
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		let reader_handle = tokio::spawn(read_loop(FrameReader::new(reader), Arc::clone(&shared)));
		let writer_handle = tokio::spawn(write_loop(
			FrameWriter::new(writer),
			outbound_rx,
			Arc::clone(&shared),
		));

		Self {
			last_id: AtomicU32::new(0),
			shared,
			outbound_tx,
			tasks: Mutex::new(vec![reader_handle, writer_handle]),
		}
	}

	/// Sends a request and awaits the peer's answer.
	pub async fn send_message(&self, guid: &str, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let request = Request {
			id,
			guid: Arc::from(guid),
			method: method.to_string(),
			params,
		};
		// The peer would drop the link over an oversized frame; fail it here instead.
		let bytes = frame::encode(&request)?;
		debug!(target = "peerlink", id, guid, method, len = bytes.len(), "sending request");

		let (tx, rx) = oneshot::channel();
		self.shared.callbacks.lock().insert(id, tx);
		let guard = CancelGuard::new(id, Arc::clone(&self.shared.callbacks));

		// The reader may have died between the first check and the insert.
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		if self.outbound_tx.send(bytes).is_err() {
			warn!(target = "peerlink", id, "outbound channel closed");
			return Err(Error::ChannelClosed);
		}

		ResponseFuture { rx, guard }.await
	}

	/// Liveness probe against the peer root, bounded by `timeout`.
	pub async fn ping(&self, timeout: Duration) -> Result<()> {
		match tokio::time::timeout(
			timeout,
			self.send_message(ROOT_GUID, methods::PING, serde_json::json!({})),
		)
		.await
		{
			Ok(result) => result.map(|_| ()),
			Err(_) => Err(Error::Timeout(format!(
				"ping not answered within {}ms",
				timeout.as_millis()
			))),
		}
	}

	/// Returns true once the stream has ended, failed, or [`Connection::close`] ran.
	pub fn is_closed(&self) -> bool {
		self.shared.closed.load(Ordering::SeqCst)
	}

	/// Closes the connection. Calling it again is a no-op.
	///
	/// Pending requests fail with [`Error::ChannelClosed`]; dropping the pump
	/// tasks drops both stream halves, which closes the socket.
	pub fn close(&self) {
		let already_closed = self.shared.closed.swap(true, Ordering::SeqCst);
		self.abort_tasks();
		if already_closed {
			return;
		}
		debug!(target = "peerlink", "closing connection");
		self.shared.fail_pending(|| Error::ChannelClosed);
	}

	fn abort_tasks(&self) {
		for handle in self.tasks.lock().drain(..) {
			handle.abort();
		}
	}

	#[cfg(test)]
	fn pending_requests(&self) -> usize {
		self.shared.callbacks.lock().len()
	}
}

impl Drop for Connection {
	fn drop(&mut self) {
		self.abort_tasks();
	}
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: FrameReader<R>, shared: Arc<Shared>) {
	loop {
		match reader.read_frame().await {
			Ok(Some(value)) => match serde_json::from_value::<Message>(value) {
				Ok(message) => dispatch(&shared.callbacks, message),
				Err(e) => warn!(target = "peerlink", error = %e, "failed to parse message"),
			},
			Ok(None) => {
				debug!(target = "peerlink", "peer closed the connection");
				shared.fail_pending(|| {
					Error::TransportError("Peer closed the connection".to_string())
				});
				return;
			}
			Err(Error::ProtocolError(reason)) => {
				warn!(target = "peerlink", %reason, "peer sent an unreadable frame");
				shared.fail_pending(|| Error::ProtocolError(reason.clone()));
				return;
			}
			Err(e) => {
				warn!(target = "peerlink", error = %e, "transport read failed");
				let reason = e.to_string();
				shared.fail_pending(|| Error::TransportError(reason.clone()));
				return;
			}
		}
	}
}

async fn write_loop<W: AsyncWrite + Unpin>(
	mut writer: FrameWriter<W>,
	mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
	shared: Arc<Shared>,
) {
	while let Some(bytes) = outbound_rx.recv().await {
		if let Err(e) = writer.write_encoded(&bytes).await {
			warn!(target = "peerlink", error = %e, "transport write failed");
			let reason = e.to_string();
			shared.fail_pending(|| Error::TransportError(reason.clone()));
			return;
		}
	}
	let _ = writer.shutdown().await;
}

fn dispatch(callbacks: &CallbackMap, message: Message) {
	match message {
		Message::Response(response) => {
			let Some(callback) = callbacks.lock().remove(&response.id) else {
				// Late answer to a request whose caller gave up (ping timeout).
				debug!(target = "peerlink", id = response.id, "response without pending request");
				return;
			};

			let result = match response.error {
				Some(wrapper) => Err(parse_protocol_error(wrapper.error)),
				None => Ok(response.result.unwrap_or(Value::Null)),
			};
			let _ = callback.send(result);
		}
		Message::Unknown(value) => {
			debug!(target = "peerlink", %value, "unknown message type (ignored)");
		}
	}
}

/// Converts a peer [`ErrorPayload`] into [`Error::UnknownTarget`] or [`Error::Remote`].
pub(crate) fn parse_protocol_error(error: ErrorPayload) -> Error {
	if error.is_unknown_target() {
		return Error::UnknownTarget(error.message);
	}
	Error::Remote {
		name: error.name.unwrap_or_else(|| "Error".to_string()),
		message: error.message,
		stack: error.stack,
	}
}
