//! Session-level errors.

use thiserror::Error;

use crate::slot::SlotState;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the managers.
///
/// Launch, establishment, transport and remote errors come through unchanged
/// as [`Error::Runtime`]; the rest are session-level decisions.
#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Runtime(#[from] peerlink_runtime::Error),

	/// The link dropped again after the last permitted rebuild. Terminal.
	#[error(
		"Lost connection to peer {peer} during {operation}, and the reconnection attempts limit ({max_retry}) was reached"
	)]
	RetryCeilingExhausted {
		peer: String,
		operation: String,
		max_retry: u32,
	},

	/// The output selector did not match the remote result.
	#[error("Remote result has no output {selector}")]
	MissingOutput { selector: String },

	/// The call names a root accessor the peer of this direction does not expose.
	#[error("{target} is not reachable through the {direction} peer")]
	UnsupportedTarget {
		target: String,
		direction: &'static str,
	},

	/// A session-state token stayed transitional for too long and was reset.
	#[error("Session state still transitional after {polls} polls; state was reset")]
	InconsistentState { polls: u32 },

	#[error("Invalid session state transition from {from} to {to}")]
	InvalidTransition { from: SlotState, to: SlotState },

	/// The session was closed or failed and cannot be used any more.
	#[error("Session with peer {peer} is closed; cannot run {operation}")]
	Closed { peer: String, operation: String },

	/// The slot holds no open resource.
	#[error("Session slot is {state}, not open")]
	SlotNotOpen { state: SlotState },

	#[error("Invalid configuration: {0}")]
	Config(String),
}

impl Error {
	/// Returns true for link failures the supervisor may recover from.
	pub fn is_transport(&self) -> bool {
		matches!(self, Error::Runtime(err) if err.is_transport())
	}

	/// Returns true if the error was raised by the remote target.
	pub fn is_remote(&self) -> bool {
		matches!(self, Error::Runtime(err) if err.is_remote())
	}

	/// Returns true if the peer could not resolve a requested name.
	pub fn is_unknown_target(&self) -> bool {
		matches!(self, Error::Runtime(peerlink_runtime::Error::UnknownTarget(_)))
	}
}
