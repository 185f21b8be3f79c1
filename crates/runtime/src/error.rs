//! Error types for the peerlink runtime.

use std::io::ErrorKind;

use peerlink_protocol::frame::EncodeError;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while launching, connecting to, or calling a peer.
#[derive(Debug, Error)]
pub enum Error {
	/// Launch parameters are missing or malformed; never retried.
	#[error("Invalid launch parameters: {0}")]
	Precondition(String),

	/// The OS could not start the peer process.
	#[error("Failed to launch peer {peer}: {source}. Check the executable path and permissions.")]
	LaunchFailed {
		peer: String,
		#[source]
		source: std::io::Error,
	},

	/// The peer process died before it ever accepted a connection.
	#[error("Peer process {peer} exited before accepting connections ({status}). Does the peer have its server entry installed?")]
	PeerExited { peer: String, status: String },

	/// The peer never became reachable within the establishment window.
	#[error("Could not connect to peer {peer} on port {port} within {timeout_secs}s")]
	EstablishTimeout { peer: String, port: u16, timeout_secs: u32 },

	/// A session opened but the peer did not answer the liveness probe.
	#[error("Peer {peer} accepted a connection but failed the liveness probe: {reason}")]
	ProbeFailed { peer: String, reason: String },

	/// Transport-level error (connection dropped, unexpected end of stream).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Connection closed while a request was pending or before it was sent.
	#[error("Connection closed unexpectedly")]
	ChannelClosed,

	/// Malformed frame or message.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Error raised by the remote target itself.
	#[error("{name}: {message}")]
	Remote {
		/// Error type name as reported by the peer
		name: String,
		/// Human-readable error message
		message: String,
		/// Peer-side stack trace (if available)
		stack: Option<String>,
	},

	/// The peer could not resolve a module, component, user object or function.
	#[error("Unknown remote target: {0}")]
	UnknownTarget(String),

	/// Timeout waiting for an operation.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl From<EncodeError> for Error {
	fn from(err: EncodeError) -> Self {
		match err {
			EncodeError::Json(e) => Error::Json(e),
			oversized @ EncodeError::TooLarge(_) => Error::ProtocolError(oversized.to_string()),
		}
	}
}

impl Error {
	/// Returns true for link failures that a reconnection can recover from.
	///
	/// Remote, resolution and protocol errors are never transport errors.
	pub fn is_transport(&self) -> bool {
		match self {
			Error::TransportError(_) | Error::ChannelClosed => true,
			Error::Io(err) => matches!(
				err.kind(),
				ErrorKind::ConnectionReset
					| ErrorKind::ConnectionAborted
					| ErrorKind::BrokenPipe
					| ErrorKind::UnexpectedEof
					| ErrorKind::NotConnected
			),
			_ => false,
		}
	}

	/// Returns true when nothing is listening on the endpoint yet.
	pub fn is_connection_refused(&self) -> bool {
		matches!(self, Error::Io(err) if err.kind() == ErrorKind::ConnectionRefused)
	}

	/// Returns true if the error was raised by the remote target.
	pub fn is_remote(&self) -> bool {
		matches!(self, Error::Remote { .. })
	}

	/// Returns the error name if this is a Remote error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			_ => None,
		}
	}

	/// Returns the stack trace if this is a Remote error with a stack.
	pub fn stack_trace(&self) -> Option<&str> {
		match self {
			Error::Remote { stack, .. } => stack.as_deref(),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dropped_links_are_transport_errors() {
		assert!(Error::ChannelClosed.is_transport());
		assert!(Error::TransportError("eof".into()).is_transport());
		assert!(Error::Io(std::io::Error::new(ErrorKind::ConnectionReset, "reset")).is_transport());
		assert!(Error::Io(std::io::Error::new(ErrorKind::UnexpectedEof, "eof")).is_transport());
	}

	#[test]
	fn remote_and_resolution_errors_are_not_transport_errors() {
		let remote = Error::Remote {
			name: "ValueError".into(),
			message: "bad input".into(),
			stack: None,
		};
		assert!(!remote.is_transport());
		assert!(remote.is_remote());
		assert!(!Error::UnknownTarget("numpy".into()).is_transport());
		assert!(!Error::Io(std::io::Error::new(ErrorKind::PermissionDenied, "denied")).is_transport());
	}

	#[test]
	fn refused_is_detected_only_for_io_errors() {
		assert!(Error::Io(std::io::Error::new(ErrorKind::ConnectionRefused, "refused")).is_connection_refused());
		assert!(!Error::ChannelClosed.is_connection_refused());
	}
}
