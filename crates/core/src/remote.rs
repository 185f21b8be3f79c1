//! Direction managers: the caller-facing entry points.
//!
//! [`InterpreterRemote`] controls a remote general-purpose interpreter and
//! reaches it through the module accessor. [`HostRemote`] controls a remote
//! host application and reaches it through the component and user-object
//! accessors. Both are thin shells over one [`Remote`], which runs the call
//! wrapper loop: resolve, invoke, and on a transport failure let the
//! [`Supervisor`] rebuild the session before re-issuing the same call.
//!
//! # Usage constraint
//!
//! One manager, one caller at a time. Every call takes `&mut self`; share a
//! manager between tasks only behind your own mutex.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use peerlink_runtime::{
	Connector, InvocationStyle, Launcher, ProcessLauncher, RemoteObject, Root, TcpConnector,
	free_tcp_port,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::call::{Call, Target};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::session::{Session, SessionState};
use crate::supervisor::{Supervisor, SupervisorState};

/// Which side initiated the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	/// Controlling a remote interpreter; module accessor only.
	Interpreter,
	/// Controlling a remote host application; component and user-object accessors.
	Host,
}

impl Direction {
	pub fn default_style(self) -> InvocationStyle {
		match self {
			Direction::Interpreter => InvocationStyle::Direct,
			Direction::Host => InvocationStyle::RunScript,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Direction::Interpreter => "interpreter",
			Direction::Host => "host application",
		}
	}

	fn allows(self, target: &Target) -> bool {
		match self {
			Direction::Interpreter => matches!(target, Target::Module { .. }),
			Direction::Host => !matches!(target, Target::Module { .. }),
		}
	}
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Session plus supervisor for one direction.
#[derive(Debug)]
pub struct Remote {
	direction: Direction,
	session: Session,
	supervisor: Supervisor,
}

impl Remote {
	/// Validates `config`, picks the port, launches the peer and connects.
	pub async fn connect_with(
		direction: Direction,
		config: &RemoteConfig,
		launcher: Arc<dyn Launcher>,
		connector: Arc<dyn Connector>,
	) -> Result<Self> {
		config.validate()?;
		let port = match config.port {
			Some(port) => port,
			None => free_tcp_port()?,
		};
		let spec = config.launch_spec(port, direction.default_style());
		debug!(target = "peerlink", %direction, peer = %spec.peer_name(), port, "creating session");

		let mut session = Session::new(spec, config.timeout_secs, launcher, connector);
		session.open().await?;

		Ok(Self {
			direction,
			session,
			supervisor: Supervisor::new(config.max_retry),
		})
	}

	pub fn direction(&self) -> Direction {
		self.direction
	}

	pub fn session(&self) -> &Session {
		&self.session
	}

	pub fn supervisor_state(&self) -> SupervisorState {
		self.supervisor.state()
	}

	/// Rebuilds performed so far.
	pub fn retries(&self) -> u32 {
		self.supervisor.retries()
	}

	/// Root accessors of the current connection. Not cached across rebuilds.
	pub fn root(&self) -> Result<Root> {
		self.supervisor.check(&self.session, "root access")?;
		self.session.root_for("root access")
	}

	/// Runs `call`, transparently rebuilding the session on transport drops.
	///
	/// Remote, resolution and selector errors propagate unchanged and never
	/// trigger a rebuild.
	pub async fn call(&mut self, call: &Call) -> Result<Value> {
		if !self.direction.allows(&call.target) {
			return Err(Error::UnsupportedTarget {
				target: call.to_string(),
				direction: self.direction.as_str(),
			});
		}

		let operation = call.to_string();
		loop {
			self.supervisor.check(&self.session, &operation)?;
			let root = self.session.root_for(&operation)?;
			match call.invoke(&root).await {
				Ok(result) => {
					self.supervisor.recovered();
					return call.project(result);
				}
				Err(err) if err.is_transport() => {
					warn!(
						target = "peerlink",
						peer = %self.session.peer(),
						%operation,
						error = %err,
						"transport failure during call"
					);
					self.supervisor.rebuild(&mut self.session, &operation).await?;
				}
				Err(err) => return Err(err.into()),
			}
		}
	}

	pub async fn close(&mut self) {
		self.session.close().await;
	}

	pub async fn close_after_error(&mut self, err: &Error) {
		self.session.close_after_error(err).await;
	}
}

macro_rules! direction_manager {
	($name:ident, $direction:expr) => {
		impl $name {
			/// Launches the peer as a child process and connects over TCP.
			pub async fn connect(config: &RemoteConfig) -> Result<Self> {
				Self::connect_with(config, Arc::new(ProcessLauncher), Arc::new(TcpConnector)).await
			}

			/// Like [`Self::connect`] with injected launch and connect strategies.
			pub async fn connect_with(
				config: &RemoteConfig,
				launcher: Arc<dyn Launcher>,
				connector: Arc<dyn Connector>,
			) -> Result<Self> {
				Remote::connect_with($direction, config, launcher, connector)
					.await
					.map(|inner| Self { inner })
			}

			/// Runs a prepared call with rebuild-on-drop semantics.
			pub async fn call(&mut self, call: &Call) -> Result<Value> {
				self.inner.call(call).await
			}

			pub fn root(&self) -> Result<Root> {
				self.inner.root()
			}

			pub fn session_state(&self) -> SessionState {
				self.inner.session().state()
			}

			pub fn supervisor_state(&self) -> SupervisorState {
				self.inner.supervisor_state()
			}

			/// Rebuilds performed so far.
			pub fn retries(&self) -> u32 {
				self.inner.retries()
			}

			/// Transport port the peer was told to listen on.
			pub fn port(&self) -> u16 {
				self.inner.session().port()
			}

			pub fn process_id(&self) -> Option<u32> {
				self.inner.session().process_id()
			}

			/// Closes the connection and terminates the peer. Idempotent.
			pub async fn close(&mut self) {
				self.inner.close().await;
			}

			/// Logs `err` as the reason the caller's scope ended, then closes.
			pub async fn close_after_error(&mut self, err: &Error) {
				self.inner.close_after_error(err).await;
			}

			/// Runs `body` and closes the manager on every exit path.
			///
			/// An error from `body` is logged through
			/// [`Self::close_after_error`] and returned.
			pub async fn scope<T, F>(mut self, body: F) -> Result<T>
			where
				F: for<'a> FnOnce(&'a mut Self) -> BoxFuture<'a, Result<T>>,
			{
				let result = body(&mut self).await;
				match &result {
					Ok(_) => self.close().await,
					Err(err) => self.close_after_error(err).await,
				}
				result
			}
		}
	};
}

/// Manager for a remote interpreter peer.
#[derive(Debug)]
pub struct InterpreterRemote {
	inner: Remote,
}

direction_manager!(InterpreterRemote, Direction::Interpreter);

impl InterpreterRemote {
	/// Calls `module.function(*args, **kwargs)` on the peer.
	pub async fn run_function(
		&mut self,
		module: &str,
		function: &str,
		args: Vec<Value>,
		kwargs: Map<String, Value>,
	) -> Result<Value> {
		self.call(&Call::function(module, function).args(args).kwargs(kwargs))
			.await
	}

	/// Resolves a module on the current connection.
	pub async fn get_module(&self, name: &str) -> Result<RemoteObject> {
		Ok(self.root()?.get_module(name).await?)
	}
}

/// Manager for a remote host application peer.
#[derive(Debug)]
pub struct HostRemote {
	inner: Remote,
}

direction_manager!(HostRemote, Direction::Host);

impl HostRemote {
	/// Calls a component, or its cluster variant, with the given inputs.
	pub async fn run_component(
		&mut self,
		name: &str,
		is_cluster: bool,
		args: Vec<Value>,
		kwargs: Map<String, Value>,
	) -> Result<Value> {
		let call = if is_cluster { Call::cluster(name) } else { Call::component(name) };
		self.call(&call.args(args).kwargs(kwargs)).await
	}

	/// Calls a user object with the given inputs.
	pub async fn run_user_object(
		&mut self,
		name: &str,
		args: Vec<Value>,
		kwargs: Map<String, Value>,
	) -> Result<Value> {
		self.call(&Call::user_object(name).args(args).kwargs(kwargs))
			.await
	}

	/// Resolves a component on the current connection.
	pub async fn get_component(&self, name: &str, is_cluster: bool) -> Result<RemoteObject> {
		Ok(self.root()?.get_component(name, is_cluster).await?)
	}

	/// Resolves a user object on the current connection.
	pub async fn get_user_object(&self, name: &str) -> Result<RemoteObject> {
		Ok(self.root()?.get_user_object(name).await?)
	}
}

#[cfg(test)]
mod tests;
