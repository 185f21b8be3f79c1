//! Bounded session rebuilds after transport failures.

use std::fmt;
use std::time::Duration;

use tracing::{error, info};

use crate::error::{Error, Result};
use crate::session::Session;

/// Pause between tearing a session down and relaunching it, so the peer
/// environment can release the port and any exclusive document locks.
pub const COOL_DOWN: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
	/// No rebuild in progress.
	Idle,
	/// A rebuild happened and the interrupted call has not succeeded yet.
	Retrying,
	/// The retry ceiling was reached. Terminal.
	Exhausted,
}

impl fmt::Display for SupervisorState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			SupervisorState::Idle => "idle",
			SupervisorState::Retrying => "retrying",
			SupervisorState::Exhausted => "exhausted",
		})
	}
}

/// Counts rebuilds against a ceiling.
///
/// The counter is never reset: a manager that used up its budget stays
/// exhausted and has to be replaced.
#[derive(Debug)]
pub struct Supervisor {
	state: SupervisorState,
	retry: u32,
	max_retry: u32,
}

impl Supervisor {
	pub fn new(max_retry: u32) -> Self {
		Self {
			state: SupervisorState::Idle,
			retry: 0,
			max_retry,
		}
	}

	pub fn state(&self) -> SupervisorState {
		self.state
	}

	/// Rebuilds performed so far.
	pub fn retries(&self) -> u32 {
		self.retry
	}

	pub fn max_retry(&self) -> u32 {
		self.max_retry
	}

	/// Fails fast once the budget is gone.
	pub fn check(&self, session: &Session, operation: &str) -> Result<()> {
		if self.state == SupervisorState::Exhausted {
			return Err(self.exhausted(session, operation));
		}
		Ok(())
	}

	/// Tears `session` down and relaunches it, if budget remains.
	///
	/// `operation` names the interrupted call for the exhaustion message. A
	/// relaunch or establishment failure is returned as-is and leaves the
	/// session failed.
	pub async fn rebuild(&mut self, session: &mut Session, operation: &str) -> Result<()> {
		self.check(session, operation)?;

		if self.retry >= self.max_retry {
			self.state = SupervisorState::Exhausted;
			let err = self.exhausted(session, operation);
			error!(target = "peerlink", peer = %session.peer(), max_retry = self.max_retry, "reconnection attempts limit reached");
			session.fail().await;
			return Err(err);
		}

		self.state = SupervisorState::Retrying;
		self.retry += 1;
		info!(
			target = "peerlink",
			peer = %session.peer(),
			attempt = self.retry,
			max_retry = self.max_retry,
			%operation,
			"lost connection, retrying"
		);

		session.close().await;
		info!(target = "peerlink", seconds = COOL_DOWN.as_secs(), "waiting before relaunch");
		tokio::time::sleep(COOL_DOWN).await;

		if let Err(err) = session.open().await {
			error!(target = "peerlink", peer = %session.peer(), error = %err, "rebuild failed");
			session.fail().await;
			return Err(err);
		}
		Ok(())
	}

	/// The call re-issued after a rebuild went through.
	pub fn recovered(&mut self) {
		if self.state == SupervisorState::Retrying {
			self.state = SupervisorState::Idle;
		}
	}

	fn exhausted(&self, session: &Session, operation: &str) -> Error {
		Error::RetryCeilingExhausted {
			peer: session.peer(),
			operation: operation.to_string(),
			max_retry: self.max_retry,
		}
	}
}
