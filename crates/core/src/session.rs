//! The live peer process and connection pair.

use std::fmt;
use std::sync::Arc;

use peerlink_runtime::{
	Connection, Connector, Endpoint, LaunchSpec, Launcher, PeerProcess, ProcessState, Root, establish,
};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Where a [`Session`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	/// No process and no connection.
	Disconnected,
	/// A process is starting and the establisher is polling it.
	Launching,
	/// One live process and one live connection.
	Connected,
	/// Establishment or a rebuild failed; resources have been released.
	Failed,
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			SessionState::Disconnected => "disconnected",
			SessionState::Launching => "launching",
			SessionState::Connected => "connected",
			SessionState::Failed => "failed",
		})
	}
}

/// One peer process plus the RPC connection to it.
///
/// The pair is torn down and recreated in place on reconnection. At most one
/// process and one connection exist at any time; both are released by
/// [`Session::close`], by a failed [`Session::open`], and on drop.
pub struct Session {
	state: SessionState,
	spec: LaunchSpec,
	endpoint: Endpoint,
	timeout_secs: u32,
	launcher: Arc<dyn Launcher>,
	connector: Arc<dyn Connector>,
	process: Option<Box<dyn PeerProcess>>,
	connection: Option<Arc<Connection>>,
}

impl Session {
	pub fn new(
		spec: LaunchSpec,
		timeout_secs: u32,
		launcher: Arc<dyn Launcher>,
		connector: Arc<dyn Connector>,
	) -> Self {
		let endpoint = Endpoint::localhost(spec.port);
		Self {
			state: SessionState::Disconnected,
			spec,
			endpoint,
			timeout_secs,
			launcher,
			connector,
			process: None,
			connection: None,
		}
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	/// Name of the peer executable, for logs and errors.
	pub fn peer(&self) -> String {
		self.spec.peer_name()
	}

	pub fn port(&self) -> u16 {
		self.spec.port
	}

	pub fn spec(&self) -> &LaunchSpec {
		&self.spec
	}

	/// OS id of the current peer process.
	pub fn process_id(&self) -> Option<u32> {
		self.process.as_ref().and_then(|p| p.id())
	}

	/// Launches the peer and waits until a probed connection is up.
	///
	/// On failure everything started here is released and the session is
	/// left `Failed`.
	pub async fn open(&mut self) -> Result<()> {
		match self.state {
			SessionState::Connected => return Ok(()),
			SessionState::Launching => {
				return Err(Error::Runtime(peerlink_runtime::Error::Precondition(
					"session is already launching".into(),
				)));
			}
			SessionState::Disconnected | SessionState::Failed => {}
		}

		self.state = SessionState::Launching;
		let mut process = match self.launcher.launch(&self.spec) {
			Ok(process) => process,
			Err(err) => {
				self.state = SessionState::Failed;
				return Err(err.into());
			}
		};

		let peer = self.peer();
		match establish(
			self.connector.as_ref(),
			&self.endpoint,
			self.timeout_secs,
			process.as_mut(),
			&peer,
		)
		.await
		{
			Ok(connection) => {
				self.process = Some(process);
				self.connection = Some(Arc::new(connection));
				self.state = SessionState::Connected;
				Ok(())
			}
			Err(err) => {
				if let Err(kill_err) = process.terminate().await {
					warn!(target = "peerlink", %peer, error = %kill_err, "failed to terminate peer");
				}
				self.state = SessionState::Failed;
				Err(err.into())
			}
		}
	}

	/// Root accessors of the current connection.
	///
	/// Re-fetch after every rebuild; a `Root` from a previous connection fails
	/// with a transport error.
	pub fn root(&self) -> Result<Root> {
		self.root_for("root access")
	}

	/// Like [`Self::root`], naming `operation` when the session is closed.
	pub(crate) fn root_for(&self, operation: &str) -> Result<Root> {
		match (&self.state, &self.connection) {
			(SessionState::Connected, Some(connection)) => Ok(Root::new(Arc::clone(connection))),
			_ => Err(Error::Closed {
				peer: self.peer(),
				operation: operation.to_string(),
			}),
		}
	}

	/// Releases the connection and the process. Safe to call repeatedly and
	/// after the peer already exited; never fails.
	pub async fn close(&mut self) {
		if let Some(connection) = self.connection.take() {
			if !connection.is_closed() {
				info!(target = "peerlink", peer = %self.peer(), "closing connection");
			}
			connection.close();
		}

		if let Some(mut process) = self.process.take() {
			match process.poll() {
				Ok(ProcessState::Running) => {
					info!(target = "peerlink", peer = %self.peer(), "closing peer");
					if let Err(err) = process.terminate().await {
						warn!(target = "peerlink", peer = %self.peer(), error = %err, "failed to terminate peer");
					}
				}
				Ok(ProcessState::Exited { .. }) => {
					debug!(target = "peerlink", peer = %self.peer(), "peer already exited");
				}
				Err(err) => {
					warn!(target = "peerlink", peer = %self.peer(), error = %err, "failed to poll peer");
					process.start_kill();
				}
			}
		}

		if self.state != SessionState::Failed {
			self.state = SessionState::Disconnected;
		}
	}

	/// Logs the error that aborted the caller's scope, then closes.
	pub async fn close_after_error(&mut self, err: &Error) {
		error!(target = "peerlink", peer = %self.peer(), error = %err, "closing session after error");
		self.close().await;
	}

	/// Closes and marks the session unusable.
	pub(crate) async fn fail(&mut self) {
		self.close().await;
		self.state = SessionState::Failed;
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		if let Some(connection) = self.connection.take() {
			connection.close();
		}
		if let Some(mut process) = self.process.take() {
			process.start_kill();
		}
	}
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("state", &self.state)
			.field("peer", &self.peer())
			.field("port", &self.spec.port)
			.field("timeout_secs", &self.timeout_secs)
			.finish_non_exhaustive()
	}
}
