//! In-process peer reachable without sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::connection::Connection;
use crate::connector::Connector;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::server::PeerServer;

const LOOPBACK_BUFFER: usize = 1024 * 1024;

/// Connector that serves every connection from an in-process [`PeerServer`]
/// over a `tokio::io::duplex` pipe.
///
/// The endpoint is ignored. Each `connect` starts a fresh served session, the
/// same way a relaunched peer would start with empty per-connection state.
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
	server: PeerServer,
	sessions: Arc<AtomicU32>,
}

impl LoopbackConnector {
	pub fn new(server: PeerServer) -> Self {
		Self {
			server,
			sessions: Arc::new(AtomicU32::new(0)),
		}
	}

	/// Number of sessions opened so far.
	pub fn sessions(&self) -> u32 {
		self.sessions.load(Ordering::SeqCst)
	}
}

impl Connector for LoopbackConnector {
	fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Connection>> {
		Box::pin(async move {
			let (client, peer) = tokio::io::duplex(LOOPBACK_BUFFER);
			let (peer_read, peer_write) = tokio::io::split(peer);
			let server = self.server.clone();
			tokio::spawn(async move {
				if let Err(e) = server.serve_stream(peer_read, peer_write).await {
					debug!(target = "peerlink.peer", error = %e, "loopback session failed");
				}
			});

			let session = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
			debug!(target = "peerlink", %endpoint, session, "loopback connection open");
			let (reader, writer) = tokio::io::split(client);
			Ok(Connection::open(reader, writer))
		})
	}
}
