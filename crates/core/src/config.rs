//! Manager configuration.
//!
//! Values come from code (`with_*` setters), a JSON file, and `PEERLINK_*`
//! environment variables, applied in that order by the glue that builds a
//! manager.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use peerlink_protocol::LogLevel;
use peerlink_runtime::{InvocationStyle, LaunchSpec};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default establishment window, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u32 = 60;

/// Default number of rebuilds before a session is declared dead.
pub const DEFAULT_MAX_RETRY: u32 = 3;

pub const ENV_TIMEOUT: &str = "PEERLINK_TIMEOUT";
pub const ENV_MAX_RETRY: &str = "PEERLINK_MAX_RETRY";
pub const ENV_PORT: &str = "PEERLINK_PORT";
pub const ENV_LOG_LEVEL: &str = "PEERLINK_LOG_LEVEL";

/// How to launch and supervise one peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
	/// Peer executable (interpreter or host application).
	pub executable: PathBuf,
	/// Server entry script/module the peer runs.
	pub server_entry: PathBuf,
	/// Fixed port; `None` picks a free one at construction.
	pub port: Option<u16>,
	/// Establishment window in whole seconds.
	pub timeout_secs: u32,
	/// Rebuilds allowed before the session is declared dead.
	pub max_retry: u32,
	pub log_level: LogLevel,
	pub working_dir: Option<PathBuf>,
	/// Added to the inherited environment of the peer.
	pub env: BTreeMap<String, String>,
	/// Document the host application opens on start.
	pub document: Option<PathBuf>,
	/// Overrides the direction's default invocation style.
	pub style: Option<InvocationStyle>,
}

impl Default for RemoteConfig {
	fn default() -> Self {
		Self {
			executable: PathBuf::new(),
			server_entry: PathBuf::new(),
			port: None,
			timeout_secs: DEFAULT_TIMEOUT_SECS,
			max_retry: DEFAULT_MAX_RETRY,
			log_level: LogLevel::WARNING,
			working_dir: None,
			env: BTreeMap::new(),
			document: None,
			style: None,
		}
	}
}

impl RemoteConfig {
	pub fn new(executable: impl Into<PathBuf>, server_entry: impl Into<PathBuf>) -> Self {
		Self {
			executable: executable.into(),
			server_entry: server_entry.into(),
			..Self::default()
		}
	}

	pub fn with_port(mut self, port: u16) -> Self {
		self.port = Some(port);
		self
	}

	pub fn with_timeout_secs(mut self, timeout_secs: u32) -> Self {
		self.timeout_secs = timeout_secs;
		self
	}

	pub fn with_max_retry(mut self, max_retry: u32) -> Self {
		self.max_retry = max_retry;
		self
	}

	pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
		self.log_level = log_level;
		self
	}

	pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.working_dir = Some(dir.into());
		self
	}

	pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.env.insert(key.into(), value.into());
		self
	}

	pub fn with_document(mut self, document: impl Into<PathBuf>) -> Self {
		self.document = Some(document.into());
		self
	}

	pub fn with_style(mut self, style: InvocationStyle) -> Self {
		self.style = Some(style);
		self
	}

	/// Loads a configuration from a JSON file; missing fields take defaults.
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path)
			.map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
		serde_json::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
	}

	/// Applies `PEERLINK_*` overrides from the process environment.
	pub fn apply_env(self) -> Result<Self> {
		self.apply_env_from(|key| std::env::var(key).ok())
	}

	/// Applies `PEERLINK_*` overrides read through `lookup`.
	pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		if let Some(value) = lookup(ENV_TIMEOUT) {
			self.timeout_secs = parse_env(ENV_TIMEOUT, &value)?;
		}
		if let Some(value) = lookup(ENV_MAX_RETRY) {
			self.max_retry = parse_env(ENV_MAX_RETRY, &value)?;
		}
		if let Some(value) = lookup(ENV_PORT) {
			self.port = Some(parse_env(ENV_PORT, &value)?);
		}
		if let Some(value) = lookup(ENV_LOG_LEVEL) {
			self.log_level = LogLevel::parse(&value);
		}
		Ok(self)
	}

	/// Rejects configurations that could not produce a correctly invoked peer.
	pub fn validate(&self) -> Result<()> {
		let precondition = |message: String| Error::Runtime(peerlink_runtime::Error::Precondition(message));
		if self.executable.as_os_str().is_empty() {
			return Err(precondition("peer executable path is empty".into()));
		}
		if self.server_entry.as_os_str().is_empty() {
			return Err(precondition(format!(
				"server entry for peer {} is empty",
				self.executable.display()
			)));
		}
		if self.port == Some(0) {
			return Err(precondition("port 0 is not a usable fixed port; leave it unset for a dynamic one".into()));
		}
		if self.timeout_secs == 0 {
			return Err(precondition("timeout must be at least one second".into()));
		}
		Ok(())
	}

	/// Launch parameters for a peer bound to `port`.
	pub fn launch_spec(&self, port: u16, default_style: InvocationStyle) -> LaunchSpec {
		LaunchSpec {
			executable: self.executable.clone(),
			server_entry: self.server_entry.clone(),
			port,
			log_level: self.log_level,
			working_dir: self.working_dir.clone(),
			env: self.env.clone(),
			style: self.style.unwrap_or(default_style),
			document: self.document.clone(),
		}
	}
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
	T::Err: std::fmt::Display,
{
	value
		.trim()
		.parse()
		.map_err(|e| Error::Config(format!("{key}={value:?}: {e}")))
}
