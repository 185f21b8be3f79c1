mod call;
mod serve;

use anyhow::Result;
use peerlink_protocol::LogLevel;

use crate::cli::{Cli, Commands};
use crate::logging;

pub async fn dispatch(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Serve(args) => {
			let level = args.log_level.as_deref().map(LogLevel::parse).unwrap_or_default();
			let filter = match cli.verbose {
				0 => logging::level_filter(level),
				n => logging::verbosity_filter(n),
			};
			logging::init_logging(filter);
			serve::run(args).await
		}
		Commands::Call(args) => {
			logging::init_logging(logging::verbosity_filter(cli.verbose));
			call::run(args).await
		}
	}
}
