use anyhow::{Context, Result};
use peerlink::{Call, HostRemote, InterpreterRemote, InvocationStyle, LogLevel, RemoteConfig};
use serde_json::Value;
use tracing::debug;

use crate::cli::{CallArgs, DirectionArg, HostKind, StyleArg};

pub async fn run(args: CallArgs) -> Result<()> {
	let config = build_config(&args)?;
	let call = build_call(&args)?;
	debug!(target = "peerlink", %call, peer = %config.executable.display(), "running call");

	let value = match args.direction {
		DirectionArg::Interpreter => {
			let remote = InterpreterRemote::connect(&config).await?;
			remote
				.scope(move |remote| Box::pin(async move { remote.call(&call).await }))
				.await?
		}
		DirectionArg::Host => {
			let remote = HostRemote::connect(&config).await?;
			remote
				.scope(move |remote| Box::pin(async move { remote.call(&call).await }))
				.await?
		}
	};

	println!("{}", serde_json::to_string_pretty(&value)?);
	Ok(())
}

/// Config file, then `PEERLINK_*` variables, then flags.
fn build_config(args: &CallArgs) -> Result<RemoteConfig> {
	let mut config = match &args.config {
		Some(path) => RemoteConfig::from_json_file(path)?,
		None => RemoteConfig::default(),
	}
	.apply_env()?;

	if let Some(exe) = &args.exe {
		config.executable = exe.clone();
	}
	if let Some(entry) = &args.entry {
		config.server_entry = entry.clone();
	}
	if let Some(port) = args.port {
		config.port = Some(port);
	}
	if let Some(timeout) = args.timeout {
		config.timeout_secs = timeout;
	}
	if let Some(max_retry) = args.max_retry {
		config.max_retry = max_retry;
	}
	if let Some(level) = &args.log_level {
		config.log_level = LogLevel::parse(level);
	}
	if let Some(style) = args.style {
		config.style = Some(match style {
			StyleArg::Direct => InvocationStyle::Direct,
			StyleArg::RunScript => InvocationStyle::RunScript,
		});
	}
	Ok(config)
}

fn build_call(args: &CallArgs) -> Result<Call> {
	let mut call = match args.direction {
		DirectionArg::Interpreter => {
			let (module, function) = args
				.target
				.rsplit_once('.')
				.with_context(|| format!("Expected module.function, got '{}'", args.target))?;
			Call::function(module, function)
		}
		DirectionArg::Host => match args.kind {
			HostKind::Component => Call::component(&args.target),
			HostKind::Cluster => Call::cluster(&args.target),
			HostKind::UserObject => Call::user_object(&args.target),
		},
	};

	call = call.args(args.args.iter().map(|raw| parse_value(raw)));
	for pair in &args.kwargs {
		let (key, raw) = pair
			.split_once('=')
			.with_context(|| format!("Expected KEY=JSON, got '{pair}'"))?;
		call = call.kwarg(key, parse_value(raw));
	}

	if let Some(select) = &args.select {
		call = match select.parse::<usize>() {
			Ok(index) => call.select(index),
			Err(_) => call.select(select.as_str()),
		};
	}
	Ok(call)
}

/// JSON if it parses, the raw text as a string otherwise.
fn parse_value(raw: &str) -> Value {
	serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
	use clap::Parser;
	use peerlink::{OutputSelector, Target};
	use serde_json::json;

	use super::*;
	use crate::cli::{Cli, Commands};

	fn call_args(argv: &[&str]) -> CallArgs {
		let argv = ["peerlink", "call"].iter().chain(argv);
		match Cli::try_parse_from(argv).unwrap().command {
			Commands::Call(args) => args,
			_ => panic!("Expected Call command"),
		}
	}

	#[test]
	fn interpreter_target_splits_on_last_dot() {
		let call = build_call(&call_args(&["os.path.join", "a", "\"b\"", "3"])).unwrap();
		assert_eq!(
			call.target,
			Target::Module {
				module: "os.path".into(),
				function: "join".into()
			}
		);
		assert_eq!(call.args, vec![json!("a"), json!("b"), json!(3)]);
	}

	#[test]
	fn interpreter_target_needs_a_module() {
		let err = build_call(&call_args(&["print"])).unwrap_err();
		assert!(err.to_string().contains("module.function"));
	}

	#[test]
	fn host_kinds_and_selectors() {
		let call = build_call(&call_args(&[
			"--direction",
			"host",
			"--kind",
			"cluster",
			"--select",
			"1",
			"--kwarg",
			"distance=2.5",
			"Offset",
		]))
		.unwrap();
		assert_eq!(
			call.target,
			Target::Component {
				name: "Offset".into(),
				is_cluster: true
			}
		);
		assert_eq!(call.output, Some(OutputSelector::Index(1)));
		assert_eq!(call.kwargs["distance"], json!(2.5));

		let call = build_call(&call_args(&["--direction", "host", "--select", "curve", "Offset"])).unwrap();
		assert_eq!(call.output, Some(OutputSelector::Field("curve".into())));
	}

	#[test]
	fn malformed_kwarg_is_rejected() {
		assert!(build_call(&call_args(&["--kwarg", "distance", "math.add"])).is_err());
	}

	#[test]
	fn flags_override_config_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("peer.json");
		std::fs::write(
			&path,
			r#"{"executable": "/usr/bin/python3", "server_entry": "service.py", "max_retry": 5, "timeout_secs": 30}"#,
		)
		.unwrap();
		let path = path.to_string_lossy().into_owned();

		let config = build_config(&call_args(&[
			"--config",
			&path,
			"--max-retry",
			"1",
			"--log-level",
			"debug",
			"--style",
			"run-script",
			"math.add",
		]))
		.unwrap();

		assert_eq!(config.executable.to_string_lossy(), "/usr/bin/python3");
		assert_eq!(config.max_retry, 1);
		assert_eq!(config.log_level, LogLevel::DEBUG);
		assert_eq!(config.style, Some(InvocationStyle::RunScript));
	}
}
