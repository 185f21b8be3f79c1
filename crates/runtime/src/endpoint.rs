//! Transport endpoint selection.

use std::fmt;
use std::net::{Ipv4Addr, TcpListener};

use crate::error::Result;

/// Host every peer binds and every caller dials.
pub const LOCALHOST: &str = "127.0.0.1";

/// `(host, port)` pair the child process and the establisher agree on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
	pub host: String,
	pub port: u16,
}

impl Endpoint {
	pub fn localhost(port: u16) -> Self {
		Self {
			host: LOCALHOST.to_string(),
			port,
		}
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.host, self.port)
	}
}

/// Asks the OS for a free TCP port by binding port 0 and reading it back.
///
/// The listener is dropped before returning, so the port is only very likely
/// to still be free when the peer binds it.
pub fn free_tcp_port() -> Result<u16> {
	let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
	Ok(listener.local_addr()?.port())
}
