//! Bounded-time connection establishment.
//!
//! The loop makes at most `timeout_secs` attempts, one per second. An attempt
//! either opens a connection (when none exists yet) or liveness-probes the
//! one opened by the previous attempt. The outcome distinguishes three
//! faults:
//!
//! - the peer process died before listening: [`Error::PeerExited`], reported
//!   as soon as a refused connect finds the process gone
//! - the peer never listened in time: [`Error::EstablishTimeout`]
//! - the peer listened but did not answer the probe: [`Error::ProbeFailed`]
//!
//! Any connect error other than "refused" propagates unchanged.

use std::time::Duration;

use tracing::{debug, info};

use crate::connection::Connection;
use crate::connector::Connector;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::launcher::{PeerProcess, ProcessState};

/// Pause between refused connection attempts.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Sub-timeout of the liveness probe on a freshly opened connection.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Polls `endpoint` until a probed connection is available.
///
/// `peer` names the peer executable in errors. The connection opened on the
/// final attempt cannot be probed any more and is closed, so the outcome of
/// that case is a timeout.
pub async fn establish(
	connector: &dyn Connector,
	endpoint: &Endpoint,
	timeout_secs: u32,
	process: &mut dyn PeerProcess,
	peer: &str,
) -> Result<Connection> {
	let mut connection: Option<Connection> = None;
	info!(target = "peerlink", %peer, %endpoint, timeout_secs, "connecting");

	for attempt in 0..timeout_secs {
		let remaining = timeout_secs - attempt;

		if let Some(open) = connection.take() {
			debug!(target = "peerlink", remaining, "found connection, probing");
			return match open.ping(PROBE_TIMEOUT).await {
				Ok(()) => {
					info!(target = "peerlink", %peer, "connected");
					Ok(open)
				}
				Err(err) => {
					open.close();
					Err(Error::ProbeFailed {
						peer: peer.to_string(),
						reason: err.to_string(),
					})
				}
			};
		}

		debug!(target = "peerlink", remaining, "connecting");
		match connector.connect(endpoint).await {
			Ok(open) => connection = Some(open),
			Err(err) if err.is_connection_refused() => {
				let state = process.poll()?;
				if let ProcessState::Exited { .. } = state {
					return Err(Error::PeerExited {
						peer: peer.to_string(),
						status: state.to_string(),
					});
				}
				if remaining == 1 {
					break;
				}
				tokio::time::sleep(POLL_INTERVAL).await;
			}
			Err(err) => return Err(err),
		}
	}

	if let Some(open) = connection {
		open.close();
	}
	Err(Error::EstablishTimeout {
		peer: peer.to_string(),
		port: endpoint.port,
		timeout_secs,
	})
}
