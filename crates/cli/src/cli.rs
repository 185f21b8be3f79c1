
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Root CLI for peerlink.
#[derive(Parser, Debug)]
#[command(name = "peerlink")]
#[command(about = "Launch a peer process and call into it over a supervised RPC session")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Serve the demo targets to a single client (peer side).
	///
	/// Follows the peer invocation convention: `<port> <log_level>`.
	Serve(ServeArgs),
	/// Launch a peer, run one call against it and print the JSON result.
	Call(CallArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
	/// Port to listen on; missing or unparsable values use the legacy port.
	#[arg(value_name = "PORT")]
	pub port: Option<String>,

	/// Log level name or number (default WARNING).
	#[arg(value_name = "LOG_LEVEL")]
	pub log_level: Option<String>,

	/// Use the host component service legacy port instead of the interpreter one.
	#[arg(long)]
	pub host: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CallArgs {
	/// `module.function` for an interpreter peer, component or user object name for a host peer.
	#[arg(value_name = "TARGET")]
	pub target: String,

	/// Positional arguments; each is parsed as JSON, falling back to a string.
	#[arg(value_name = "ARG")]
	pub args: Vec<String>,

	/// Keyword argument, repeatable.
	#[arg(long = "kwarg", value_name = "KEY=JSON")]
	pub kwargs: Vec<String>,

	/// Peer executable.
	#[arg(long, value_name = "PATH")]
	pub exe: Option<PathBuf>,

	/// Server entry the peer runs.
	#[arg(long, value_name = "PATH")]
	pub entry: Option<PathBuf>,

	/// JSON configuration file; flags override its values.
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	#[arg(long, value_enum, default_value = "interpreter")]
	pub direction: DirectionArg,

	/// What TARGET names on a host peer.
	#[arg(long, value_enum, default_value = "component")]
	pub kind: HostKind,

	/// Return only this field (or array index) of the result.
	#[arg(long, value_name = "OUTPUT")]
	pub select: Option<String>,

	/// Fixed transport port (default: pick a free one).
	#[arg(long)]
	pub port: Option<u16>,

	/// Establishment timeout in seconds.
	#[arg(long, value_name = "SECS")]
	pub timeout: Option<u32>,

	/// Session rebuilds allowed after transport failures.
	#[arg(long, value_name = "N")]
	pub max_retry: Option<u32>,

	/// Log level passed to the peer.
	#[arg(long, value_name = "LEVEL")]
	pub log_level: Option<String>,

	/// Peer command line style.
	#[arg(long, value_enum)]
	pub style: Option<StyleArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionArg {
	Interpreter,
	Host,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
	Component,
	Cluster,
	UserObject,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleArg {
	Direct,
	RunScript,
}
