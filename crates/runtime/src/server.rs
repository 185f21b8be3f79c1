//! Peer-side endpoint.
//!
//! [`PeerServer`] answers the root accessors and `call` requests from a
//! [`Registry`]. It serves exactly one client: [`PeerServer::serve_once`]
//! accepts a single connection, handles it until the client goes away, and
//! returns, so the hosting process can exit.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use peerlink_protocol::frame::{self, EncodeError};
use peerlink_protocol::{
	ComponentParams, ErrorPayload, Invocation, NameParams, ObjectRef, ROOT_GUID, Request, Response,
	methods,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::registry::{Fault, HandlerResult, Registry};
use crate::transport::{FrameReader, FrameWriter};

/// How a served session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
	/// The client closed the connection.
	Disconnected,
	/// A handler asked to drop the connection mid-call.
	Aborted,
}

/// One-shot RPC server over a [`Registry`].
#[derive(Debug, Clone)]
pub struct PeerServer {
	registry: Arc<Registry>,
}

impl PeerServer {
	pub fn new(registry: Registry) -> Self {
		Self {
			registry: Arc::new(registry),
		}
	}

	/// Binds the loopback interface on `port`.
	pub async fn bind(port: u16) -> Result<TcpListener> {
		let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
		info!(target = "peerlink.peer", addr = %listener.local_addr()?, "peer listening");
		Ok(listener)
	}

	/// Accepts one client and serves it to the end.
	pub async fn serve_once(&self, listener: TcpListener) -> Result<SessionEnd> {
		let (stream, addr) = listener.accept().await?;
		// One-shot: nobody else gets in.
		drop(listener);
		stream.set_nodelay(true)?;
		info!(target = "peerlink.peer", %addr, "client connected");
		let (reader, writer) = stream.into_split();
		let end = self.serve_stream(reader, writer).await?;
		info!(target = "peerlink.peer", ?end, "client session ended");
		Ok(end)
	}

	/// Serves requests from one stream in arrival order.
	pub async fn serve_stream<R, W>(&self, reader: R, writer: W) -> Result<SessionEnd>
	where
		R: AsyncRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		let mut reader = FrameReader::new(reader);
		let mut writer = FrameWriter::new(writer);
		let mut session = ServedSession {
			registry: &self.registry,
			resolved: HashMap::new(),
		};

		while let Some(value) = reader.read_frame().await? {
			let request: Request = match serde_json::from_value(value) {
				Ok(request) => request,
				Err(e) => {
					warn!(target = "peerlink.peer", error = %e, "dropping malformed request");
					continue;
				}
			};
			debug!(
				target = "peerlink.peer",
				id = request.id,
				guid = %request.guid,
				method = %request.method,
				"request"
			);

			let response = match session.handle(&request) {
				Ok(result) => Response::ok(request.id, result),
				Err(Fault::Raise(payload)) => Response::err(request.id, payload),
				Err(Fault::Abort) => {
					warn!(target = "peerlink.peer", id = request.id, "aborting session");
					return Ok(SessionEnd::Aborted);
				}
			};
			let bytes = match frame::encode(&response) {
				Err(EncodeError::TooLarge(len)) => {
					warn!(target = "peerlink.peer", id = request.id, len, "result too large to send");
					let payload = ErrorPayload::new(
						"OverflowError",
						format!("Result of {len} bytes exceeds the {} byte frame limit", frame::MAX_FRAME_LEN),
					);
					frame::encode(&Response::err(request.id, payload))?
				}
				encoded => encoded?,
			};
			writer.write_encoded(&bytes).await?;
		}
		Ok(SessionEnd::Disconnected)
	}
}

/// Per-connection state: the references handed out so far.
struct ServedSession<'a> {
	registry: &'a Registry,
	resolved: HashMap<String, ObjectRef>,
}

impl ServedSession<'_> {
	fn handle(&mut self, request: &Request) -> HandlerResult {
		if request.guid.as_ref() == ROOT_GUID {
			return self.handle_root(request);
		}

		let Some(reference) = self.resolved.get(request.guid.as_ref()) else {
			return Err(Fault::Raise(ErrorPayload::unknown_target(format!(
				"object '{}' was not resolved on this connection",
				request.guid
			))));
		};
		if request.method != methods::CALL {
			return Err(unsupported(&request.method, &request.guid));
		}
		let invocation: Invocation = params(&request.params)?;
		self.registry.invoke(reference, &invocation)
	}

	fn handle_root(&mut self, request: &Request) -> HandlerResult {
		let reference = match request.method.as_str() {
			methods::PING => return Ok(Value::from("pong")),
			methods::GET_MODULE => {
				let NameParams { name } = params(&request.params)?;
				self.registry
					.resolve_module(&name)
					.ok_or_else(|| unknown(format!("module '{name}'")))?
			}
			methods::GET_COMPONENT => {
				let ComponentParams { name, is_cluster } = params(&request.params)?;
				let label = if is_cluster { "cluster" } else { "component" };
				self.registry
					.resolve_component(&name, is_cluster)
					.ok_or_else(|| unknown(format!("{label} '{name}'")))?
			}
			methods::GET_USER_OBJECT => {
				let NameParams { name } = params(&request.params)?;
				self.registry
					.resolve_user_object(&name)
					.ok_or_else(|| unknown(format!("user object '{name}'")))?
			}
			other => return Err(unsupported(other, "root")),
		};

		let value = serde_json::to_value(&reference)
			.map_err(|e| Fault::raise("SerializationError", e.to_string()))?;
		self.resolved.insert(reference.guid.clone(), reference);
		Ok(value)
	}
}

fn params<T: DeserializeOwned>(value: &Value) -> std::result::Result<T, Fault> {
	serde_json::from_value(value.clone()).map_err(|e| Fault::raise("TypeError", format!("invalid params: {e}")))
}

fn unknown(target: String) -> Fault {
	Fault::Raise(ErrorPayload::unknown_target(target))
}

fn unsupported(method: &str, target: &str) -> Fault {
	Fault::raise("MethodNotFound", format!("'{method}' is not supported on {target}"))
}
