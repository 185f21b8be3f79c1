use peerlink_protocol::LogLevel;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Filter for the caller side, chosen by `-v` count.
pub fn verbosity_filter(verbosity: u8) -> &'static str {
	// 0 = errors only (peer stdout chatter stays hidden)
	// 1 (-v) = session lifecycle: launch, retry, close
	// 2+ (-vv) = everything, including establish polling and peer output
	match verbosity {
		0 => "error",
		1 => "info,peerlink.peer=warn",
		_ => "debug",
	}
}

/// Filter for the peer side, chosen by the log-level token it was started with.
pub fn level_filter(level: LogLevel) -> &'static str {
	match level.value() {
		40.. => "error",
		30..=39 => "warn",
		20..=29 => "info",
		_ => "debug",
	}
}

pub fn init_logging(default_filter: &str) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn peer_levels_map_onto_tracing_filters() {
		assert_eq!(level_filter(LogLevel::CRITICAL), "error");
		assert_eq!(level_filter(LogLevel::ERROR), "error");
		assert_eq!(level_filter(LogLevel::WARNING), "warn");
		assert_eq!(level_filter(LogLevel::INFO), "info");
		assert_eq!(level_filter(LogLevel::from_value(25)), "info");
		assert_eq!(level_filter(LogLevel::DEBUG), "debug");
		assert_eq!(level_filter(LogLevel::NOTSET), "debug");
	}
}
