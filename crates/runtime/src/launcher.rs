//! Peer process launch.
//!
//! Builds the command line for a peer bound to a port and log level, starts
//! it without waiting, and hands back a [`PeerProcess`] the caller can poll
//! and terminate. The child's stdin and stdout are piped so it never blocks
//! on console interaction; stdout is drained into `debug` events.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use futures_util::future::BoxFuture;
use peerlink_protocol::LogLevel;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// How the server entry is handed to the peer executable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStyle {
	/// `<exe> <entry> <port> <level>`, for interpreter peers.
	#[default]
	Direct,
	/// The host application's script runner:
	/// `<exe> -nosplash -notemplate -runscript=... [document]`.
	RunScript,
}

/// Everything needed to start one peer.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
	pub executable: PathBuf,
	pub server_entry: PathBuf,
	pub port: u16,
	pub log_level: LogLevel,
	pub working_dir: Option<PathBuf>,
	/// Variables added to (or overriding) the inherited environment.
	pub env: BTreeMap<String, String>,
	pub style: InvocationStyle,
	/// Document the host application opens on start (`RunScript` only).
	pub document: Option<PathBuf>,
}

impl LaunchSpec {
	pub fn new(executable: impl Into<PathBuf>, server_entry: impl Into<PathBuf>, port: u16) -> Self {
		Self {
			executable: executable.into(),
			server_entry: server_entry.into(),
			port,
			log_level: LogLevel::default(),
			working_dir: None,
			env: BTreeMap::new(),
			style: InvocationStyle::default(),
			document: None,
		}
	}

	/// Name used for the peer in logs and error messages.
	pub fn peer_name(&self) -> String {
		self.executable.display().to_string()
	}

	/// Rejects parameters that could not produce a correctly invoked peer.
	pub fn validate(&self) -> Result<()> {
		if self.executable.as_os_str().is_empty() {
			return Err(Error::Precondition("peer executable path is empty".into()));
		}
		if self.server_entry.as_os_str().is_empty() {
			return Err(Error::Precondition(format!(
				"server entry for peer {} is empty",
				self.peer_name()
			)));
		}
		if self.port == 0 {
			return Err(Error::Precondition(format!(
				"transport port for peer {} is not set",
				self.peer_name()
			)));
		}
		Ok(())
	}

	/// Arguments following the executable.
	///
	/// With `windows` set, the `RunScript` style yields a single pre-quoted
	/// string that must be passed verbatim, since the host's switch parser
	/// does not understand standard argument escaping.
	pub fn invocation_args(&self, windows: bool) -> Vec<String> {
		let entry = self.server_entry.display();
		let level = self.log_level.token();
		match self.style {
			InvocationStyle::Direct => vec![entry.to_string(), self.port.to_string(), level],
			InvocationStyle::RunScript if windows => {
				let mut line = format!(
					"/nosplash /notemplate /runscript=\"-_RunPythonScript \"\"{entry}\"\" {} {level} -_Exit \"",
					self.port
				);
				if let Some(document) = &self.document {
					line.push(' ');
					line.push_str(&document.display().to_string());
				}
				vec![line]
			}
			InvocationStyle::RunScript => {
				let mut args = vec![
					"-nosplash".to_string(),
					"-notemplate".to_string(),
					format!("-runscript=-_RunPythonScript \"{entry}\" {} {level} -_Exit", self.port),
				];
				if let Some(document) = &self.document {
					args.push(document.display().to_string());
				}
				args
			}
		}
	}

	fn command(&self) -> Command {
		let mut cmd = Command::new(&self.executable);
		let args = self.invocation_args(cfg!(windows));

		#[cfg(windows)]
		{
			if self.style == InvocationStyle::RunScript {
				for raw in &args {
					cmd.raw_arg(raw);
				}
			} else {
				cmd.args(&args);
			}
		}

		#[cfg(not(windows))]
		{
			cmd.args(&args);
		}

		if let Some(dir) = &self.working_dir {
			cmd.current_dir(dir);
		}
		cmd.envs(&self.env)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true);
		cmd
	}
}

/// Liveness of a launched peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
	Running,
	/// Exit code is `None` when the process was ended by a signal.
	Exited { code: Option<i32> },
}

impl fmt::Display for ProcessState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProcessState::Running => f.write_str("running"),
			ProcessState::Exited { code: Some(code) } => write!(f, "exit code {code}"),
			ProcessState::Exited { code: None } => f.write_str("terminated by signal"),
		}
	}
}

/// Lifetime handle of a launched peer.
pub trait PeerProcess: Send {
	/// OS process id, if still known.
	fn id(&self) -> Option<u32>;

	/// Non-blocking liveness check.
	fn poll(&mut self) -> Result<ProcessState>;

	/// Stops the process and reaps it. A no-op once it has exited.
	fn terminate(&mut self) -> BoxFuture<'_, Result<()>>;

	/// Sends the kill signal without waiting; usable from `Drop`.
	fn start_kill(&mut self);
}

/// Starts peer processes.
pub trait Launcher: Send + Sync {
	fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn PeerProcess>>;
}

/// Launches real OS child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
	fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn PeerProcess>> {
		spec.validate()?;
		let peer = spec.peer_name();
		debug!(
			target = "peerlink",
			peer = %peer,
			entry = %spec.server_entry.display(),
			port = spec.port,
			log_level = %spec.log_level,
			working_dir = ?spec.working_dir,
			"launching peer"
		);

		let mut child = spec.command().spawn().map_err(|source| Error::LaunchFailed {
			peer: peer.clone(),
			source,
		})?;

		if let Some(stdout) = child.stdout.take() {
			let peer = peer.clone();
			tokio::spawn(async move {
				let mut lines = BufReader::new(stdout).lines();
				while let Ok(Some(line)) = lines.next_line().await {
					debug!(target = "peerlink.peer", peer = %peer, "{line}");
				}
			});
		}

		info!(target = "peerlink", peer = %peer, pid = ?child.id(), "peer launched");
		Ok(Box::new(ChildProcess { child, peer }))
	}
}

/// A peer started by [`ProcessLauncher`].
///
/// The child keeps its stdin pipe open for as long as this handle lives.
#[derive(Debug)]
pub struct ChildProcess {
	child: Child,
	peer: String,
}

impl PeerProcess for ChildProcess {
	fn id(&self) -> Option<u32> {
		self.child.id()
	}

	fn poll(&mut self) -> Result<ProcessState> {
		Ok(match self.child.try_wait()? {
			Some(status) => ProcessState::Exited { code: status.code() },
			None => ProcessState::Running,
		})
	}

	fn terminate(&mut self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			if let ProcessState::Exited { .. } = self.poll()? {
				return Ok(());
			}
			info!(target = "peerlink", peer = %self.peer, "terminating peer");
			self.child.kill().await?;
			Ok(())
		})
	}

	fn start_kill(&mut self) {
		if let Ok(None) = self.child.try_wait() {
			let _ = self.child.start_kill();
		}
	}
}
