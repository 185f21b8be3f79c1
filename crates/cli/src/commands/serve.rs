use anyhow::{Context, Result};
use peerlink_protocol::{LEGACY_HOST_PORT, LEGACY_INTERPRETER_PORT};
use peerlink_runtime::{PeerServer, SessionEnd};
use tracing::{info, warn};

use crate::cli::ServeArgs;
use crate::demo;

pub async fn run(args: ServeArgs) -> Result<()> {
	let legacy = if args.host {
		LEGACY_HOST_PORT
	} else {
		LEGACY_INTERPRETER_PORT
	};
	let port = resolve_port(args.port.as_deref(), legacy);

	let server = PeerServer::new(demo::registry());
	let listener = PeerServer::bind(port)
		.await
		.with_context(|| format!("Failed to listen on port {port}"))?;

	match server.serve_once(listener).await? {
		SessionEnd::Disconnected => info!(target = "peerlink.peer", port, "client disconnected, exiting"),
		SessionEnd::Aborted => warn!(target = "peerlink.peer", port, "session aborted, exiting"),
	}
	Ok(())
}

/// Port from the first positional argument; missing, unparsable and zero
/// fall back to `legacy`.
fn resolve_port(raw: Option<&str>, legacy: u16) -> u16 {
	raw.and_then(|raw| raw.trim().parse::<u16>().ok())
		.filter(|port| *port != 0)
		.unwrap_or(legacy)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn port_argument_falls_back_to_legacy() {
		assert_eq!(resolve_port(Some("40123"), LEGACY_INTERPRETER_PORT), 40123);
		assert_eq!(resolve_port(None, LEGACY_INTERPRETER_PORT), 18872);
		assert_eq!(resolve_port(Some("http"), LEGACY_INTERPRETER_PORT), 18872);
		assert_eq!(resolve_port(Some("0"), LEGACY_HOST_PORT), 18871);
		assert_eq!(resolve_port(Some("70000"), LEGACY_HOST_PORT), 18871);
	}
}
