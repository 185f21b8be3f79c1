//! Peer runtime: launch, transport and connection establishment.
//!
//! This crate holds everything below the session layer:
//!
//! - [`launcher`] - builds the peer command line and starts the child process
//! - [`transport`] - length-prefixed JSON frames over any byte stream
//! - [`connection`] - request/response correlation, ping and close
//! - [`establish`] - the bounded connect-then-probe loop
//! - [`remote`] - root accessors and handles to peer-side objects
//! - [`server`] / [`registry`] - the peer side of the protocol
//!
//! The caller-facing managers built on top of these live in the `peerlink` crate.

pub mod connection;
pub mod connector;
pub mod endpoint;
pub mod error;
pub mod establish;
pub mod launcher;
pub mod loopback;
pub mod registry;
pub mod remote;
pub mod server;
pub mod transport;

pub use connection::Connection;
pub use connector::{Connector, TcpConnector};
pub use endpoint::{Endpoint, LOCALHOST, free_tcp_port};
pub use error::{Error, Result};
pub use establish::{POLL_INTERVAL, PROBE_TIMEOUT, establish};
pub use launcher::{
	ChildProcess, InvocationStyle, LaunchSpec, Launcher, PeerProcess, ProcessLauncher, ProcessState,
};
pub use loopback::LoopbackConnector;
pub use registry::{Fault, Handler, HandlerResult, Registry};
pub use remote::{RemoteObject, Root};
pub use server::{PeerServer, SessionEnd};
