//! Opening an RPC session on an endpoint.

use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tracing::debug;

use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::Result;

/// Opens fresh connections to a peer endpoint.
///
/// The establisher only needs "try once"; retry policy lives in
/// [`crate::establish`]. An implementation must report "nothing listening"
/// as an [`std::io::ErrorKind::ConnectionRefused`] I/O error so the
/// establisher can tell a slow start from a real fault.
pub trait Connector: Send + Sync {
	fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Connection>>;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
	fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Connection>> {
		Box::pin(async move {
			let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
			stream.set_nodelay(true)?;
			debug!(target = "peerlink", %endpoint, "tcp connection open");
			let (reader, writer) = stream.into_split();
			Ok(Connection::open(reader, writer))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::endpoint::free_tcp_port;

	#[tokio::test]
	async fn refused_when_nothing_listens() {
		let endpoint = Endpoint::localhost(free_tcp_port().unwrap());
		let err = TcpConnector.connect(&endpoint).await.err().expect("connect should fail");
		assert!(err.is_connection_refused(), "got {err:?}");
	}
}
